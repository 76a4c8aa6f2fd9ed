use crate::bip::bvlc::{encode_bvll, BvlcFunction, BvllFrame};
use crate::{DataLink, DataLinkAddress, DataLinkError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;

const MAX_BIP_FRAME_LEN: usize = 1600;

/// Where a [`BacnetIpTransport`] binds and where its broadcasts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub interface: IpAddr,
    pub port: u16,
    pub broadcast_address: IpAddr,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DataLinkAddress::BACNET_IP_DEFAULT_PORT,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }
}

impl TransportConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }

    /// Broadcasts target the configured address at the configured port.
    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_address, self.port)
    }
}

/// BACnet/IP over a single UDP socket.
#[derive(Debug, Clone)]
pub struct BacnetIpTransport {
    socket: Arc<UdpSocket>,
    broadcast: SocketAddr,
}

impl BacnetIpTransport {
    pub async fn bind(config: TransportConfig) -> Result<Self, DataLinkError> {
        let socket = UdpSocket::bind(config.bind_addr()).await?;
        socket.set_broadcast(true)?;
        log::info!(
            "bound BACnet/IP socket on {} (broadcast {})",
            socket.local_addr()?,
            config.broadcast_target()
        );
        Ok(Self {
            socket: Arc::new(socket),
            broadcast: config.broadcast_target(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DataLinkError> {
        self.socket.local_addr().map_err(DataLinkError::Io)
    }

    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast
    }

    async fn send_wrapped(
        &self,
        function: BvlcFunction,
        target: SocketAddr,
        payload: &[u8],
    ) -> Result<(), DataLinkError> {
        let frame = encode_bvll(function, payload, MAX_BIP_FRAME_LEN)
            .map_err(|_| DataLinkError::FrameTooLarge)?;
        self.socket.send_to(&frame, target).await?;
        Ok(())
    }
}

impl DataLink for BacnetIpTransport {
    async fn send(&self, address: DataLinkAddress, payload: &[u8]) -> Result<(), DataLinkError> {
        let target = address.as_socket_addr();
        let function = match target.ip() {
            IpAddr::V4(ip) if ip.is_broadcast() => BvlcFunction::OriginalBroadcastNpdu,
            _ if target == self.broadcast => BvlcFunction::OriginalBroadcastNpdu,
            _ => BvlcFunction::OriginalUnicastNpdu,
        };
        self.send_wrapped(function, target, payload).await
    }

    async fn send_broadcast(&self, payload: &[u8]) -> Result<(), DataLinkError> {
        self.send_wrapped(BvlcFunction::OriginalBroadcastNpdu, self.broadcast, payload)
            .await
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
        let mut datagram = [0u8; MAX_BIP_FRAME_LEN];
        let (n, src) = self.socket.recv_from(&mut datagram).await?;
        let frame = BvllFrame::decode(&datagram[..n]).map_err(|_| DataLinkError::InvalidFrame)?;

        let source = match frame.function {
            BvlcFunction::OriginalUnicastNpdu
            | BvlcFunction::OriginalBroadcastNpdu
            | BvlcFunction::DistributeBroadcastToNetwork => src,
            BvlcFunction::ForwardedNpdu => frame.origin.ok_or(DataLinkError::InvalidFrame)?,
            other => return Err(DataLinkError::UnsupportedBvlcFunction(other.to_u8())),
        };
        if frame.npdu.len() > buf.len() {
            return Err(DataLinkError::FrameTooLarge);
        }
        buf[..frame.npdu.len()].copy_from_slice(frame.npdu);
        Ok((frame.npdu.len(), DataLinkAddress::Ip(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::{BacnetIpTransport, TransportConfig};
    use crate::bip::bvlc::{BvlcFunction, BvlcHeader, BVLC_TYPE_BIP};
    use crate::{DataLink, DataLinkAddress, DataLinkError};
    use bacflow_core::encoding::{reader::Reader, writer::Writer};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tokio::net::UdpSocket;

    fn loopback(port: u16) -> TransportConfig {
        TransportConfig {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            broadcast_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    async fn peer() -> UdpSocket {
        UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unicast_is_wrapped_in_original_unicast() {
        let transport = BacnetIpTransport::bind(loopback(0)).await.unwrap();
        let peer = peer().await;

        transport
            .send(DataLinkAddress::Ip(peer.local_addr().unwrap()), &[1, 2, 3])
            .await
            .unwrap();

        let mut recv = [0u8; 64];
        let (n, _) = peer.recv_from(&mut recv).await.unwrap();
        assert_eq!(&recv[..n], &[BVLC_TYPE_BIP, 0x0A, 0x00, 0x07, 1, 2, 3]);
    }

    #[tokio::test]
    async fn broadcast_targets_configured_address_and_port() {
        let peer = peer().await;
        let port = peer.local_addr().unwrap().port();
        let mut config = loopback(0);
        config.port = port;
        // Bind the transport itself to an ephemeral port; only the broadcast
        // target needs the configured port.
        let transport = BacnetIpTransport {
            broadcast: config.broadcast_target(),
            ..BacnetIpTransport::bind(loopback(0)).await.unwrap()
        };

        transport.send_broadcast(&[0x01, 0x00]).await.unwrap();

        let mut recv = [0u8; 64];
        let (n, _) = peer.recv_from(&mut recv).await.unwrap();
        let mut r = Reader::new(&recv[..n]);
        let hdr = BvlcHeader::decode(&mut r).unwrap();
        assert_eq!(hdr.function, BvlcFunction::OriginalBroadcastNpdu);
        assert_eq!(hdr.length, 6);
    }

    #[tokio::test]
    async fn recv_forwarded_npdu_returns_forwarded_origin() {
        let transport = BacnetIpTransport::bind(loopback(0)).await.unwrap();
        let target = transport.local_addr().unwrap();
        let sender = peer().await;

        let mut w = Writer::new();
        BvlcHeader {
            function: BvlcFunction::ForwardedNpdu,
            length: 4 + 6 + 3,
        }
        .encode(&mut w)
        .unwrap();
        w.write_all(&[10, 1, 2, 3]).unwrap();
        w.write_be_u16(47808).unwrap();
        w.write_all(&[1, 2, 3]).unwrap();

        sender.send_to(w.as_written(), target).await.unwrap();

        let mut out = [0u8; 16];
        let (n, src) = transport.recv(&mut out).await.unwrap();
        assert_eq!(&out[..n], &[1, 2, 3]);
        assert_eq!(
            src,
            DataLinkAddress::Ip(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)),
                47808
            ))
        );
    }

    #[tokio::test]
    async fn recv_unicast_reports_udp_source() {
        let transport = BacnetIpTransport::bind(loopback(0)).await.unwrap();
        let sender = peer().await;

        sender
            .send_to(
                &[BVLC_TYPE_BIP, 0x0A, 0x00, 0x06, 0x01, 0x00],
                transport.local_addr().unwrap(),
            )
            .await
            .unwrap();

        let mut out = [0u8; 16];
        let (n, src) = transport.recv(&mut out).await.unwrap();
        assert_eq!(&out[..n], &[0x01, 0x00]);
        assert_eq!(src, DataLinkAddress::Ip(sender.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn bbmd_traffic_is_unsupported() {
        let transport = BacnetIpTransport::bind(loopback(0)).await.unwrap();
        let sender = peer().await;

        let frame = [BVLC_TYPE_BIP, 0x05, 0x00, 0x06, 0x00, 0x3C];
        sender
            .send_to(&frame, transport.local_addr().unwrap())
            .await
            .unwrap();

        let mut out = [0u8; 16];
        let err = transport.recv(&mut out).await.unwrap_err();
        assert!(matches!(err, DataLinkError::UnsupportedBvlcFunction(0x05)));
    }

    #[tokio::test]
    async fn foreign_datagram_is_invalid() {
        let transport = BacnetIpTransport::bind(loopback(0)).await.unwrap();
        let sender = peer().await;

        sender
            .send_to(b"hello", transport.local_addr().unwrap())
            .await
            .unwrap();

        let mut out = [0u8; 16];
        let err = transport.recv(&mut out).await.unwrap_err();
        assert!(matches!(err, DataLinkError::InvalidFrame));
    }
}
