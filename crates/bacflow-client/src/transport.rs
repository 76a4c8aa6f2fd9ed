//! Frame dispatch between a [`DataLink`] and the session driver.

use bacflow_core::codec::{decode_npdu_frame, peek_response_invoke_id, DecodedFrame};
use bacflow_core::npdu::Npdu;
use bacflow_core::MalformedFrame;
use bacflow_datalink::{DataLink, DataLinkAddress, DataLinkError};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const RECV_BUFFER_LEN: usize = 1600;
const RECV_ERROR_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_ERROR_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A decoded inbound NPDU and the station it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub source: DataLinkAddress,
    pub npdu: Npdu,
    pub frame: DecodedFrame,
}

/// What the receive loop hands to its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(InboundFrame),
    /// A response whose header named `invoke_id` but whose payload did not
    /// decode. Also counted as dropped.
    MalformedResponse {
        source: DataLinkAddress,
        invoke_id: u8,
        error: MalformedFrame,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransportStats {
    pub sent_frames: u64,
    pub received_frames: u64,
    /// Datagrams that were malformed, foreign or otherwise unusable.
    pub dropped_frames: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Owns the data link for a session and runs its single receive loop.
#[derive(Debug)]
pub struct Transport<D: DataLink> {
    datalink: Arc<D>,
    counters: Arc<Counters>,
    receiver: Option<JoinHandle<()>>,
}

impl<D: DataLink + 'static> Transport<D> {
    pub fn new(datalink: D) -> Self {
        Self {
            datalink: Arc::new(datalink),
            counters: Arc::new(Counters::default()),
            receiver: None,
        }
    }

    pub async fn send(
        &self,
        destination: DataLinkAddress,
        frame: &[u8],
    ) -> Result<(), DataLinkError> {
        self.datalink.send(destination, frame).await?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn send_broadcast(&self, frame: &[u8]) -> Result<(), DataLinkError> {
        self.datalink.send_broadcast(frame).await?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Starts the receive loop, handing every decodable frame to `handler`.
    ///
    /// Malformed datagrams are dropped and counted. A malformed response is
    /// still reported as [`Inbound::MalformedResponse`] so its transaction
    /// can fail at once. The loop ends when the handler breaks, the data link
    /// closes or [`Transport::shutdown`] is called. Registering a new handler
    /// replaces the previous loop.
    pub fn on_frame<F>(&mut self, handler: F)
    where
        F: FnMut(Inbound) -> ControlFlow<()> + Send + 'static,
    {
        self.shutdown();
        let task = receive_loop(self.datalink.clone(), self.counters.clone(), handler);
        self.receiver = Some(tokio::spawn(task));
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            sent_frames: self.counters.sent.load(Ordering::Relaxed),
            received_frames: self.counters.received.load(Ordering::Relaxed),
            dropped_frames: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops the receive loop.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.receiver.take() {
            task.abort();
        }
    }
}

impl<D: DataLink> Drop for Transport<D> {
    fn drop(&mut self) {
        if let Some(task) = self.receiver.take() {
            task.abort();
        }
    }
}

async fn receive_loop<D, F>(datalink: Arc<D>, counters: Arc<Counters>, mut handler: F)
where
    D: DataLink,
    F: FnMut(Inbound) -> ControlFlow<()>,
{
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut backoff = RECV_ERROR_BACKOFF_MIN;
    loop {
        let (n, source) = match datalink.recv(&mut buf).await {
            Ok(v) => {
                backoff = RECV_ERROR_BACKOFF_MIN;
                v
            }
            Err(DataLinkError::Closed) => {
                log::debug!("data link closed; receive loop stopping");
                break;
            }
            Err(e) if e.is_frame_error() => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("dropping datagram: {e}");
                continue;
            }
            Err(e) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("receive failed, retrying in {backoff:?}: {e}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECV_ERROR_BACKOFF_MAX);
                continue;
            }
        };

        let pdu = match decode_npdu_frame(&buf[..n]) {
            Ok(pdu) => pdu,
            Err(error) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                let Some(invoke_id) = peek_response_invoke_id(&buf[..n]) else {
                    log::debug!("dropping frame from {source}: {error}");
                    continue;
                };
                log::debug!(
                    "undecodable response for invoke id {invoke_id} from {source}: {error}"
                );
                let inbound = Inbound::MalformedResponse {
                    source,
                    invoke_id,
                    error,
                };
                if handler(inbound).is_break() {
                    break;
                }
                continue;
            }
        };
        counters.received.fetch_add(1, Ordering::Relaxed);
        if let DecodedFrame::Unrecognized { raw } = &pdu.frame {
            log::trace!("unrecognized {}-byte PDU from {source}", raw.len());
        }

        let inbound = Inbound::Frame(InboundFrame {
            source,
            npdu: pdu.npdu,
            frame: pdu.frame,
        });
        if handler(inbound).is_break() {
            break;
        }
    }
}
