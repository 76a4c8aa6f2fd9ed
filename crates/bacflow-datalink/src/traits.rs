use crate::DataLinkAddress;
use std::future::Future;
use thiserror::Error;

/// Errors that can occur at the data-link layer.
#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large")]
    FrameTooLarge,
    #[error("invalid frame")]
    InvalidFrame,
    #[error("unsupported BVLC function 0x{0:02x}")]
    UnsupportedBvlcFunction(u8),
    #[error("data link closed")]
    Closed,
}

impl DataLinkError {
    /// Whether the error concerns a single datagram rather than the link.
    ///
    /// Receive loops drop such frames and keep reading.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::FrameTooLarge | Self::InvalidFrame | Self::UnsupportedBvlcFunction(_)
        )
    }
}

/// Sending and receiving raw NPDUs over a BACnet data link.
///
/// The returned futures are `Send` so that a session can drive a link from
/// spawned tasks. Implementations may still be written with `async fn`.
pub trait DataLink: Send + Sync {
    /// Sends `payload` to the given data-link `address`.
    fn send(
        &self,
        address: DataLinkAddress,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), DataLinkError>> + Send;

    /// Sends `payload` to every station on the local network.
    fn send_broadcast(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), DataLinkError>> + Send;

    /// Receives a frame into `buf`, returning `(bytes_read, source_address)`.
    fn recv(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, DataLinkAddress), DataLinkError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::DataLinkError;

    #[test]
    fn frame_errors_are_distinguished_from_link_errors() {
        assert!(DataLinkError::InvalidFrame.is_frame_error());
        assert!(DataLinkError::UnsupportedBvlcFunction(0x99).is_frame_error());
        assert!(!DataLinkError::Closed.is_frame_error());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(!DataLinkError::from(io).is_frame_error());
    }
}
