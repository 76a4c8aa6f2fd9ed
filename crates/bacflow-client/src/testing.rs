//! In-memory data link for unit tests.

use bacflow_datalink::{DataLink, DataLinkAddress, DataLinkError};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// Builds the replies a peer would send for one outgoing frame.
/// `None` as destination means broadcast.
pub(crate) type Responder =
    Box<dyn Fn(Option<DataLinkAddress>, &[u8]) -> Vec<(Vec<u8>, DataLinkAddress)> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sent {
    pub destination: Option<DataLinkAddress>,
    pub payload: Vec<u8>,
}

pub(crate) struct MockState {
    sent: Mutex<Vec<Sent>>,
    inbound_tx: mpsc::UnboundedSender<(Vec<u8>, DataLinkAddress)>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<(Vec<u8>, DataLinkAddress)>>,
    responder: Mutex<Option<Responder>>,
}

impl MockState {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn inject(&self, payload: Vec<u8>, source: DataLinkAddress) {
        let _ = self.inbound_tx.send((payload, source));
    }

    pub fn set_responder(&self, responder: Responder) {
        *self.responder.lock().unwrap() = Some(responder);
    }

    fn record(&self, destination: Option<DataLinkAddress>, payload: &[u8]) {
        self.sent.lock().unwrap().push(Sent {
            destination,
            payload: payload.to_vec(),
        });
        let replies = match self.responder.lock().unwrap().as_ref() {
            Some(responder) => responder(destination, payload),
            None => Vec::new(),
        };
        for (reply, source) in replies {
            self.inject(reply, source);
        }
    }
}

#[derive(Clone)]
pub(crate) struct MockDataLink {
    state: Arc<MockState>,
}

impl MockDataLink {
    pub fn new() -> (Self, Arc<MockState>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(MockState {
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            responder: Mutex::new(None),
        });
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl DataLink for MockDataLink {
    async fn send(&self, address: DataLinkAddress, payload: &[u8]) -> Result<(), DataLinkError> {
        self.state.record(Some(address), payload);
        Ok(())
    }

    async fn send_broadcast(&self, payload: &[u8]) -> Result<(), DataLinkError> {
        self.state.record(None, payload);
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
        let mut inbound = self.state.inbound_rx.lock().await;
        let Some((payload, source)) = inbound.recv().await else {
            return Err(DataLinkError::Closed);
        };
        if payload.len() > buf.len() {
            return Err(DataLinkError::FrameTooLarge);
        }
        buf[..payload.len()].copy_from_slice(&payload);
        Ok((payload.len(), source))
    }
}
