//! The session: one driver task that owns the transaction table, the device
//! registry and the transport, and a cloneable handle that talks to it.

use crate::error::Rejection;
use crate::registry::{DiscoveryFilter, DiscoveryHandler, SubscriptionEnd};
use crate::transaction::{Outcome, ServiceResponse, TransactionTable};
use crate::transport::{Inbound, InboundFrame, Transport, TransportStats};
use crate::{ClientError, Device, DeviceAddress, DeviceRegistry, SessionConfig};
use bacflow_core::apdu::AbortPdu;
use bacflow_core::codec::{
    encode_confirmed_request, encode_frame, encode_unconfirmed_request, DecodedFrame,
    ServiceAck, ServiceRequest, UnconfirmedRequest,
};
use bacflow_core::npdu::{Npdu, NpduAddress};
use bacflow_core::MalformedFrame;
use bacflow_core::services::{
    ReadAccessResult, ReadAccessSpec, ReadPropertyAck, ReadPropertyMultipleAck,
    ReadPropertyMultipleRequest, ReadPropertyRequest, ReadResult, WhoIsRequest, WriteAccessSpec,
    WritePropertyMultipleRequest, WritePropertyRequest, DEFAULT_PRIORITY,
};
use bacflow_core::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
use bacflow_datalink::{BacnetIpTransport, DataLink, DataLinkAddress};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

const DEVICE_EVENT_CAPACITY: usize = 256;
const ABORT_SEGMENTATION_NOT_SUPPORTED: u8 = 4;

/// Parameters for one Who-Is round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverRequest {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
    /// Unicast the Who-Is to this station instead of broadcasting it.
    pub address: Option<DataLinkAddress>,
    /// How long I-Am answers are collected.
    pub window: Duration,
}

impl DiscoverRequest {
    /// Global discovery collecting for `window`.
    pub const fn new(window: Duration) -> Self {
        Self {
            low_limit: None,
            high_limit: None,
            address: None,
            window,
        }
    }

    pub const fn with_range(mut self, low: u32, high: u32) -> Self {
        self.low_limit = Some(low);
        self.high_limit = Some(high);
        self
    }

    pub const fn with_address(mut self, address: DataLinkAddress) -> Self {
        self.address = Some(address);
        self
    }

    fn filter(&self) -> DiscoveryFilter {
        DiscoveryFilter {
            low_limit: self.low_limit,
            high_limit: self.high_limit,
            address: self.address,
        }
    }
}

/// Devices from a running discovery, as they answer.
#[derive(Debug)]
pub struct DiscoveryStream {
    rx: mpsc::UnboundedReceiver<Device>,
}

impl DiscoveryStream {
    /// Next matching device, or `None` once the window has elapsed or the
    /// session closed.
    pub async fn next(&mut self) -> Option<Device> {
        self.rx.recv().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SessionStats {
    pub transport: TransportStats,
    pub pending_transactions: usize,
    pub known_devices: usize,
    pub active_discoveries: usize,
}

enum Command {
    Confirmed {
        destination: DeviceAddress,
        request: ServiceRequest,
        reply: oneshot::Sender<Outcome>,
    },
    Discover {
        request: DiscoverRequest,
        handler: Box<dyn DiscoveryHandler>,
        started: oneshot::Sender<Result<(), ClientError>>,
    },
    Lookup {
        device_id: u32,
        reply: oneshot::Sender<Option<Device>>,
    },
    KnownDevices {
        reply: oneshot::Sender<Vec<Device>>,
    },
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

impl Command {
    /// Answers a command that arrived after the driver shut down.
    fn refuse(self) {
        match self {
            Self::Confirmed { reply, .. } => {
                let _ = reply.send(Err(ClientError::NotConnected));
            }
            Self::Discover { started, .. } => {
                let _ = started.send(Err(ClientError::NotConnected));
            }
            Self::Close { reply } => {
                let _ = reply.send(());
            }
            Self::Lookup { .. } | Self::KnownDevices { .. } | Self::Stats { .. } => {}
        }
    }
}

struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
    events: broadcast::Sender<Device>,
    config: SessionConfig,
}

/// Handle to a BACnet session.
///
/// Clones share the same driver. Dropping the last handle shuts the driver
/// down exactly like [`Session::close`].
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Binds a BACnet/IP socket as described by `config` and starts the
    /// driver. Must be called from within a tokio runtime.
    pub async fn bind(config: SessionConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let datalink = BacnetIpTransport::bind(config.transport()).await?;
        Self::with_datalink(datalink, config)
    }

    /// Starts a session over an already bound data link.
    pub fn with_datalink<D>(datalink: D, config: SessionConfig) -> Result<Self, ClientError>
    where
        D: DataLink + 'static,
    {
        config.validate()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(DEVICE_EVENT_CAPACITY);

        let mut transport = Transport::new(datalink);
        transport.on_frame(move |inbound| {
            if frames_tx.send(inbound).is_err() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        let driver = Driver {
            config: config.clone(),
            transport,
            table: TransactionTable::new(),
            registry: DeviceRegistry::new(),
            events: events.clone(),
        };
        tokio::spawn(driver.run(commands_rx, frames_rx));

        Ok(Self {
            shared: Arc::new(Shared {
                commands: commands_tx,
                closed: AtomicBool::new(false),
                events,
                config,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Sends a Who-Is and collects the matching I-Am answers for
    /// `request.window`. Each device appears once, with the address it was
    /// last heard from.
    pub async fn discover(&self, request: DiscoverRequest) -> Result<Vec<Device>, ClientError> {
        let (done, rx) = oneshot::channel();
        let collector = Collector {
            devices: BTreeMap::new(),
            done: Some(done),
        };
        self.start_discovery(request, Box::new(collector)).await?;
        rx.await.unwrap_or(Err(ClientError::Closing))
    }

    /// Like [`Session::discover`], but yields devices as they answer.
    pub async fn discover_stream(
        &self,
        request: DiscoverRequest,
    ) -> Result<DiscoveryStream, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.start_discovery(request, Box::new(tx)).await?;
        Ok(DiscoveryStream { rx })
    }

    /// Every I-Am the session hears, discovery running or not.
    pub fn device_events(&self) -> broadcast::Receiver<Device> {
        self.shared.events.subscribe()
    }

    pub async fn lookup_device(&self, device_id: u32) -> Result<Option<Device>, ClientError> {
        self.query(|reply| Command::Lookup { device_id, reply }).await
    }

    pub async fn known_devices(&self) -> Result<Vec<Device>, ClientError> {
        self.query(|reply| Command::KnownDevices { reply }).await
    }

    pub async fn stats(&self) -> Result<SessionStats, ClientError> {
        self.query(|reply| Command::Stats { reply }).await
    }

    pub async fn read_property(
        &self,
        address: impl Into<DeviceAddress>,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<PropertyValue, ClientError> {
        let request = ServiceRequest::ReadProperty(ReadPropertyRequest {
            object_id,
            property_id,
            array_index,
        });
        match self.confirmed(address.into(), request).await? {
            ServiceResponse::ReadProperty(ack) => Ok(ack.value),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Writes `values` to one property. `priority` defaults to 16.
    pub async fn write_property(
        &self,
        address: impl Into<DeviceAddress>,
        object_id: ObjectId,
        property_id: PropertyId,
        priority: Option<u8>,
        values: Vec<PropertyValue>,
    ) -> Result<(), ClientError> {
        let priority = check_priority(priority)?;
        let request = ServiceRequest::WriteProperty(WritePropertyRequest {
            object_id,
            property_id,
            array_index: None,
            values,
            priority: Some(priority),
        });
        self.expect_simple_ack(address.into(), request).await
    }

    pub async fn read_property_multiple(
        &self,
        address: impl Into<DeviceAddress>,
        specs: Vec<ReadAccessSpec>,
    ) -> Result<Vec<ReadAccessResult>, ClientError> {
        let request = ServiceRequest::ReadPropertyMultiple(ReadPropertyMultipleRequest { specs });
        match self.confirmed(address.into(), request).await? {
            ServiceResponse::ReadPropertyMultiple(ack) => Ok(ack.results),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Writes several properties at once. Entries without a priority go out
    /// without one and the device applies its own default.
    pub async fn write_property_multiple(
        &self,
        address: impl Into<DeviceAddress>,
        specs: Vec<WriteAccessSpec>,
    ) -> Result<(), ClientError> {
        for prop in specs.iter().flat_map(|spec| &spec.properties) {
            if let Some(priority) = prop.priority {
                check_priority(Some(priority))?;
            }
        }
        let request =
            ServiceRequest::WritePropertyMultiple(WritePropertyMultipleRequest { specs });
        self.expect_simple_ack(address.into(), request).await
    }

    /// Cancels every pending request with [`ClientError::Closing`], ends every
    /// discovery and releases the socket. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            log::debug!("session already closed");
        }
        let (reply, rx) = oneshot::channel();
        if self.shared.commands.send(Command::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            Err(ClientError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn submit(&self, command: Command) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.shared
            .commands
            .send(command)
            .map_err(|_| ClientError::NotConnected)
    }

    async fn query<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.submit(command(reply))?;
        rx.await.map_err(|_| ClientError::NotConnected)
    }

    async fn confirmed(
        &self,
        destination: DeviceAddress,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Confirmed {
            destination,
            request,
            reply,
        })?;
        rx.await.unwrap_or(Err(ClientError::Closing))
    }

    async fn expect_simple_ack(
        &self,
        destination: DeviceAddress,
        request: ServiceRequest,
    ) -> Result<(), ClientError> {
        match self.confirmed(destination, request).await? {
            ServiceResponse::SimpleAck => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    async fn start_discovery(
        &self,
        request: DiscoverRequest,
        handler: Box<dyn DiscoveryHandler>,
    ) -> Result<(), ClientError> {
        let (started, rx) = oneshot::channel();
        self.submit(Command::Discover {
            request,
            handler,
            started,
        })?;
        rx.await.unwrap_or(Err(ClientError::NotConnected))
    }
}

fn check_priority(priority: Option<u8>) -> Result<u8, ClientError> {
    match priority.unwrap_or(DEFAULT_PRIORITY) {
        p @ 1..=16 => Ok(p),
        p => Err(ClientError::InvalidPriority(p)),
    }
}

/// Gathers discovery matches and hands them over when the window closes.
struct Collector {
    devices: BTreeMap<u32, Device>,
    done: Option<oneshot::Sender<Result<Vec<Device>, ClientError>>>,
}

impl DiscoveryHandler for Collector {
    fn on_device(&mut self, device: &Device) {
        self.devices.insert(device.device_id, device.clone());
    }

    fn on_end(mut self: Box<Self>, end: SubscriptionEnd) {
        let result = match end {
            SubscriptionEnd::Elapsed | SubscriptionEnd::Unsubscribed => {
                Ok(std::mem::take(&mut self.devices).into_values().collect())
            }
            SubscriptionEnd::Cancelled => Err(ClientError::Closing),
        };
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }
}

struct Driver<D: DataLink + 'static> {
    config: SessionConfig,
    transport: Transport<D>,
    table: TransactionTable,
    registry: DeviceRegistry,
    events: broadcast::Sender<Device>,
}

impl<D: DataLink + 'static> Driver<D> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut frames: mpsc::UnboundedReceiver<Inbound>,
    ) {
        loop {
            let wake = earliest(self.table.next_deadline(), self.registry.next_expiry());
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown();
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Some(inbound) = frames.recv() => match inbound {
                    Inbound::Frame(frame) => self.handle_frame(frame).await,
                    Inbound::MalformedResponse { source, invoke_id, error } => {
                        self.fail_malformed(source, invoke_id, error)
                    }
                },
                _ = sleep_until(wake) => self.handle_timers().await,
            }
        }

        commands.close();
        while let Some(command) = commands.recv().await {
            command.refuse();
        }
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Confirmed {
                destination,
                request,
                reply,
            } => self.start_transaction(destination, request, reply).await,
            Command::Discover {
                request,
                handler,
                started,
            } => {
                let result = self.start_discovery(request, handler).await;
                let _ = started.send(result);
            }
            Command::Lookup { device_id, reply } => {
                let _ = reply.send(self.registry.lookup(device_id).cloned());
            }
            Command::KnownDevices { reply } => {
                let _ = reply.send(self.registry.devices().cloned().collect());
            }
            Command::Stats { reply } => {
                let _ = reply.send(SessionStats {
                    transport: self.transport.stats(),
                    pending_transactions: self.table.len(),
                    known_devices: self.registry.len(),
                    active_discoveries: self.registry.subscription_count(),
                });
            }
            Command::Close { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn start_transaction(
        &mut self,
        destination: DeviceAddress,
        request: ServiceRequest,
        reply: oneshot::Sender<Outcome>,
    ) {
        let service = request.service();
        let deadline = Instant::now() + self.config.apdu_timeout;
        let invoke_id = match self.table.allocate(
            service,
            destination,
            deadline,
            self.config.retries,
            reply,
        ) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("cannot send {service:?} to {destination}: {e}");
                return;
            }
        };

        let npdu = Npdu::confirmed(destination.route);
        let frame = match encode_confirmed_request(&npdu, invoke_id, &request) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = self.table.resolve(invoke_id, Err(e.into()));
                return;
            }
        };
        if let Err(e) = self.transport.send(destination.datalink, &frame).await {
            let _ = self.table.resolve(invoke_id, Err(e.into()));
            return;
        }
        log::trace!("sent {service:?} invoke id {invoke_id} to {destination}");
        let _ = self.table.attach_frame(invoke_id, frame);
    }

    async fn start_discovery(
        &mut self,
        request: DiscoverRequest,
        handler: Box<dyn DiscoveryHandler>,
    ) -> Result<(), ClientError> {
        let who_is = WhoIsRequest::ranged(request.low_limit, request.high_limit);
        let frame =
            encode_unconfirmed_request(&Npdu::local(), &UnconfirmedRequest::WhoIs(who_is))?;

        let until = Instant::now() + request.window;
        let handle = self.registry.subscribe(request.filter(), until, handler);
        let sent = match request.address {
            Some(address) => self.transport.send(address, &frame).await,
            None => self.transport.send_broadcast(&frame).await,
        };
        if let Err(e) = sent {
            self.registry.unsubscribe(handle);
            return Err(e.into());
        }
        log::debug!(
            "who-is {:?}..{:?} sent, collecting for {:?}",
            request.low_limit,
            request.high_limit,
            request.window
        );
        Ok(())
    }

    async fn handle_frame(&mut self, inbound: InboundFrame) {
        let InboundFrame {
            source,
            npdu,
            frame,
        } = inbound;
        match frame {
            DecodedFrame::IAm(i_am) => {
                let address = DeviceAddress {
                    datalink: source,
                    route: npdu.source,
                };
                let device = Device::from_i_am(&i_am, address);
                if self.registry.upsert(device.clone(), Instant::now()) {
                    log::info!("discovered device {} at {}", device.device_id, device.address);
                }
                let _ = self.events.send(device);
            }
            DecodedFrame::SegmentedAck { invoke_id, service } => {
                if self.table.service_of(invoke_id).is_none() {
                    log::debug!("dropping segmented {service:?} ack for invoke id {invoke_id}");
                    return;
                }
                log::warn!(
                    "{source} sent a segmented {service:?} ack; aborting invoke id {invoke_id}"
                );
                self.abort_segmented(source, npdu.source, invoke_id).await;
                let _ = self
                    .table
                    .resolve(invoke_id, Err(ClientError::SegmentationNotSupported));
            }
            frame => match frame.response_invoke_id() {
                Some(invoke_id) => self.complete_transaction(invoke_id, frame),
                None => log::trace!("ignoring frame from {source}: {frame:?}"),
            },
        }
    }

    fn fail_malformed(&mut self, source: DataLinkAddress, invoke_id: u8, error: MalformedFrame) {
        if self.table.service_of(invoke_id).is_none() {
            log::debug!("dropping undecodable response for unknown invoke id {invoke_id}");
            return;
        }
        log::warn!("undecodable response for invoke id {invoke_id} from {source}: {error}");
        let _ = self
            .table
            .resolve(invoke_id, Err(ClientError::MalformedFrame(error)));
    }

    /// Tells the peer to stop sending segments for `invoke_id`.
    async fn abort_segmented(
        &mut self,
        source: DataLinkAddress,
        route: Option<NpduAddress>,
        invoke_id: u8,
    ) {
        let abort = AbortPdu {
            server: false,
            invoke_id,
            reason: ABORT_SEGMENTATION_NOT_SUPPORTED,
        };
        let sent = match encode_frame(&Npdu::routed(route), |w| abort.encode(w)) {
            Ok(frame) => self.transport.send(source, &frame).await,
            Err(e) => {
                log::warn!("cannot encode abort for invoke id {invoke_id}: {e}");
                return;
            }
        };
        if let Err(e) = sent {
            log::warn!("cannot send abort for invoke id {invoke_id} to {source}: {e}");
        }
    }

    fn complete_transaction(&mut self, invoke_id: u8, frame: DecodedFrame) {
        let Some(expected) = self.table.service_of(invoke_id) else {
            log::debug!("dropping late or duplicate response for invoke id {invoke_id}");
            return;
        };
        let outcome = match frame {
            DecodedFrame::ComplexAck { service, ack, .. } if service == expected => match ack {
                ServiceAck::ReadProperty(ack) => {
                    self.refresh_from_read(&ack);
                    Ok(ServiceResponse::ReadProperty(ack))
                }
                ServiceAck::ReadPropertyMultiple(ack) => {
                    self.refresh_from_read_multiple(&ack);
                    Ok(ServiceResponse::ReadPropertyMultiple(ack))
                }
                ServiceAck::Raw(_) => Err(ClientError::UnexpectedResponse),
            },
            DecodedFrame::SimpleAck { service, .. } if service == expected => {
                Ok(ServiceResponse::SimpleAck)
            }
            DecodedFrame::Error { class, code, .. } => {
                Err(ClientError::RemoteRejected(Rejection::Error { class, code }))
            }
            DecodedFrame::Reject { reason, .. } => {
                Err(ClientError::RemoteRejected(Rejection::Reject { reason }))
            }
            DecodedFrame::Abort { reason, server, .. } => {
                Err(ClientError::RemoteAborted { reason, server })
            }
            other => {
                log::debug!("invoke id {invoke_id} expected {expected:?}, got {other:?}");
                Err(ClientError::UnexpectedResponse)
            }
        };
        let _ = self.table.resolve(invoke_id, outcome);
    }

    fn refresh_from_read(&mut self, ack: &ReadPropertyAck) {
        if ack.object_id.object_type() == ObjectType::Device && ack.array_index.is_none() {
            self.registry
                .update_capability(ack.object_id.instance(), ack.property_id, &ack.value);
        }
    }

    fn refresh_from_read_multiple(&mut self, ack: &ReadPropertyMultipleAck) {
        for access in &ack.results {
            if access.object_id.object_type() != ObjectType::Device {
                continue;
            }
            for item in &access.results {
                if let (ReadResult::Value(value), None) = (&item.result, item.array_index) {
                    self.registry.update_capability(
                        access.object_id.instance(),
                        item.property_id,
                        value,
                    );
                }
            }
        }
    }

    async fn handle_timers(&mut self) {
        let now = Instant::now();
        for mut txn in self.table.expire_due(now) {
            if txn.retries_remaining == 0 {
                log::warn!(
                    "{:?} invoke id {} to {} timed out",
                    txn.service,
                    txn.invoke_id,
                    txn.destination
                );
                txn.complete(Err(ClientError::Timeout));
                continue;
            }
            txn.retries_remaining -= 1;
            txn.deadline += self.config.apdu_timeout;
            log::debug!(
                "retrying invoke id {} to {} ({} retries left)",
                txn.invoke_id,
                txn.destination,
                txn.retries_remaining
            );
            if let Err(e) = self.transport.send(txn.destination.datalink, &txn.frame).await {
                txn.complete(Err(e.into()));
                continue;
            }
            if let Err(e) = self.table.reschedule(txn) {
                log::warn!("could not reschedule retry: {e}");
            }
        }
        self.registry.expire_subscriptions(now);
    }

    fn shutdown(&mut self) {
        let pending = self.table.cancel_all(|| ClientError::Closing);
        let discoveries = self.registry.cancel_all();
        self.transport.shutdown();
        log::info!(
            "session closed; cancelled {pending} pending requests and {discoveries} discoveries"
        );
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::{DiscoverRequest, Session};
    use crate::testing::{MockDataLink, MockState};
    use crate::{ClientError, DeviceAddress, Rejection, SessionConfig, SimulatedDevice};
    use bacflow_core::apdu::{AbortPdu, ErrorPdu, RejectPdu, SimpleAck};
    use bacflow_core::codec::{
        decode_npdu_frame, encode_frame, encode_unconfirmed_request, DecodedFrame,
        ServiceRequest, UnconfirmedRequest,
    };
    use bacflow_core::encoding::writer::Writer;
    use bacflow_core::npdu::{Npdu, NpduAddress};
    use bacflow_core::types::{
        ErrorClass, ErrorCode, ObjectId, ObjectType, PropertyId, PropertyValue,
    };
    use bacflow_core::EncodeError;
    use bacflow_datalink::DataLinkAddress;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn session() -> (Session, Arc<MockState>) {
        let (link, mock) = MockDataLink::new();
        let config = SessionConfig::default()
            .with_apdu_timeout(TIMEOUT)
            .with_retries(2);
        (Session::with_datalink(link, config).unwrap(), mock)
    }

    fn station(last_octet: u8) -> DataLinkAddress {
        DataLinkAddress::Ip(SocketAddr::from(([10, 0, 0, last_octet], 47808)))
    }

    fn av1() -> ObjectId {
        ObjectId::new(ObjectType::AnalogValue, 1)
    }

    fn invoke_id_of(payload: &[u8]) -> u8 {
        match decode_npdu_frame(payload).unwrap().frame {
            DecodedFrame::ConfirmedRequest { invoke_id, .. } => invoke_id,
            other => panic!("not a confirmed request: {other:?}"),
        }
    }

    fn reply(body: impl FnOnce(&mut Writer) -> Result<(), EncodeError>) -> Vec<u8> {
        encode_frame(&Npdu::local(), body).unwrap()
    }

    fn i_am(instance: u32) -> Vec<u8> {
        let request = UnconfirmedRequest::IAm(SimulatedDevice::new(instance).i_am());
        encode_unconfirmed_request(&Npdu::local(), &request).unwrap()
    }

    /// Answers every confirmed request with whatever `build` makes of its
    /// invoke ID.
    fn answer_with(mock: &MockState, build: fn(u8) -> Vec<u8>) {
        mock.set_responder(Box::new(move |destination, payload| {
            let source = destination.unwrap_or(station(99));
            vec![(build(invoke_id_of(payload)), source)]
        }));
    }

    fn serve(mock: &MockState, sims: Vec<SimulatedDevice>) {
        let sims = Mutex::new(sims);
        mock.set_responder(Box::new(move |_, payload| {
            sims.lock()
                .unwrap()
                .iter_mut()
                .filter_map(|sim| {
                    let source = station(sim.instance() as u8);
                    sim.respond(payload).map(|reply| (reply, source))
                })
                .collect()
        }));
    }

    async fn wait_for_sent(mock: &MockState, count: usize) {
        while mock.sent().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out_after_every_retry() {
        let (session, mock) = session();
        let start = Instant::now();
        let err = session
            .read_property(station(5), av1(), PropertyId::PresentValue, None)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ClientError::Timeout), "{err:?}");
        assert!(elapsed >= TIMEOUT * 3, "{elapsed:?}");
        assert!(elapsed < TIMEOUT * 3 + Duration::from_millis(10), "{elapsed:?}");

        let sent = mock.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|s| s == &sent[0]));
        assert_eq!(sent[0].destination, Some(station(5)));
        assert_eq!(session.stats().await.unwrap().pending_transactions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_ack_fails_without_retrying() {
        let (session, mock) = session();
        answer_with(&mock, |invoke_id| {
            // Complex-ACK whose value is a charset-5 string.
            vec![
                0x01, 0x00, 0x30, invoke_id, 0x0C, 0x0C, 0x00, 0x80, 0x00, 0x01, 0x19, 0x55, 0x3E,
                0x73, 0x05, 0x41, 0x42, 0x3F,
            ]
        });
        let start = Instant::now();
        let err = session
            .read_property(station(5), av1(), PropertyId::PresentValue, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::MalformedFrame(_)), "{err:?}");
        assert!(start.elapsed() < TIMEOUT, "{:?}", start.elapsed());
        assert_eq!(mock.sent().len(), 1);
        let stats = session.stats().await.unwrap();
        assert_eq!(stats.pending_transactions, 0);
        assert_eq!(stats.transport.dropped_frames, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frame_for_unknown_invoke_id_is_ignored() {
        let (session, mock) = session();
        answer_with(&mock, |invoke_id| {
            vec![0x01, 0x00, 0x50, invoke_id.wrapping_add(1), 0x0C, 0x91]
        });
        let err = session
            .read_property(station(5), av1(), PropertyId::PresentValue, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout), "{err:?}");
        assert_eq!(mock.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn segmented_ack_is_aborted_and_reported() {
        let (session, mock) = session();
        mock.set_responder(Box::new(|destination, payload| {
            match decode_npdu_frame(payload).unwrap().frame {
                DecodedFrame::ConfirmedRequest { invoke_id, .. } => {
                    let first_segment = vec![0x01, 0x00, 0x3C, invoke_id, 0x00, 0x04, 0x0C, 0x0C];
                    vec![(first_segment, destination.unwrap_or(station(99)))]
                }
                _ => Vec::new(),
            }
        }));
        let start = Instant::now();
        let err = session
            .read_property(station(5), ObjectId::device(5), PropertyId::ObjectList, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::SegmentationNotSupported), "{err:?}");
        assert!(start.elapsed() < TIMEOUT);
        wait_for_sent(&mock, 2).await;
        let sent = mock.sent();
        let invoke_id = invoke_id_of(&sent[0].payload);
        assert_eq!(sent[1].destination, Some(station(5)));
        assert_eq!(sent[1].payload, vec![0x01, 0x00, 0x70, invoke_id, 0x04]);
        assert_eq!(session.stats().await.unwrap().pending_transactions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn discover_keeps_devices_inside_the_range() {
        let (session, mock) = session();
        let sims = vec![
            SimulatedDevice::new(5),
            SimulatedDevice::new(15),
            SimulatedDevice::new(25),
        ];
        let sims = Mutex::new(sims);
        mock.set_responder(Box::new(move |_, payload| {
            let mut replies: Vec<_> = sims
                .lock()
                .unwrap()
                .iter_mut()
                .filter_map(|sim| {
                    let source = station(sim.instance() as u8);
                    sim.respond(payload).map(|reply| (reply, source))
                })
                .collect();
            // A device that answers regardless of the requested range.
            replies.push((i_am(25), station(25)));
            replies
        }));

        let devices = session
            .discover(DiscoverRequest::new(Duration::from_millis(500)).with_range(10, 20))
            .await
            .unwrap();
        let ids: Vec<u32> = devices.iter().map(|d| d.device_id).collect();
        assert_eq!(ids, vec![15]);
        assert_eq!(devices[0].address, DeviceAddress::from(station(15)));

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, None);
        // Out-of-range announcements still reach the registry.
        assert!(session.lookup_device(25).await.unwrap().is_some());
        assert!(session.lookup_device(5).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn discover_without_answers_is_empty() {
        let (session, _mock) = session();
        let devices = session
            .discover(DiscoverRequest::new(Duration::from_millis(200)))
            .await
            .unwrap();
        assert!(devices.is_empty());
        assert_eq!(session.stats().await.unwrap().active_discoveries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unicast_discovery_ignores_other_stations() {
        let (session, mock) = session();
        serve(&mock, vec![SimulatedDevice::new(15)]);
        mock.inject(i_am(7), station(7));

        let devices = session
            .discover(DiscoverRequest::new(Duration::from_millis(100)).with_address(station(15)))
            .await
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, 15);
        assert_eq!(mock.sent()[0].destination, Some(station(15)));
    }

    #[tokio::test(start_paused = true)]
    async fn discover_stream_ends_with_the_window() {
        let (session, mock) = session();
        serve(&mock, vec![SimulatedDevice::new(15)]);
        let mut stream = session
            .discover_stream(DiscoverRequest::new(Duration::from_millis(300)))
            .await
            .unwrap();
        assert_eq!(stream.next().await.map(|d| d.device_id), Some(15));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn write_property_encodes_the_expected_frame() {
        let (session, mock) = session();
        answer_with(&mock, |invoke_id| {
            reply(|w| {
                SimpleAck {
                    invoke_id,
                    service_choice: 0x0F,
                }
                .encode(w)
            })
        });

        session
            .write_property(
                IpAddr::from([10, 0, 0, 5]),
                av1(),
                PropertyId::PresentValue,
                Some(8),
                vec![PropertyValue::Real(72.5)],
            )
            .await
            .unwrap();

        let sent = mock.sent();
        assert_eq!(sent[0].destination, Some(station(5)));
        assert_eq!(
            sent[0].payload,
            vec![
                0x01, 0x04, 0x00, 0x05, 0x00, 0x0F, 0x0C, 0x00, 0x80, 0x00, 0x01, 0x19, 0x55,
                0x3E, 0x44, 0x42, 0x91, 0x00, 0x00, 0x3F, 0x49, 0x08,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn write_priority_defaults_to_16() {
        let (session, mock) = session();
        serve(&mock, vec![SimulatedDevice::new(5)]);
        session
            .write_property(
                station(5),
                ObjectId::device(5),
                PropertyId::ObjectName,
                None,
                vec![PropertyValue::from("lobby")],
            )
            .await
            .unwrap();
        match decode_npdu_frame(&mock.sent()[0].payload).unwrap().frame {
            DecodedFrame::ConfirmedRequest {
                request: ServiceRequest::WriteProperty(req),
                ..
            } => assert_eq!(req.priority, Some(16)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_priority_is_refused_locally() {
        let (session, mock) = session();
        for priority in [0, 17] {
            let err = session
                .write_property(
                    station(5),
                    av1(),
                    PropertyId::PresentValue,
                    Some(priority),
                    vec![PropertyValue::Real(1.0)],
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ClientError::InvalidPriority(p) if p == priority));
        }
        assert!(mock.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_refusals_are_mapped() {
        let (session, mock) = session();
        let read = || session.read_property(station(5), av1(), PropertyId::PresentValue, None);

        answer_with(&mock, |invoke_id| {
            reply(|w| {
                ErrorPdu {
                    invoke_id,
                    service_choice: 0x0C,
                    error_class: ErrorClass::Property,
                    error_code: ErrorCode::UnknownProperty,
                }
                .encode(w)
            })
        });
        assert!(matches!(
            read().await,
            Err(ClientError::RemoteRejected(Rejection::Error {
                class: ErrorClass::Property,
                code: ErrorCode::UnknownProperty,
            }))
        ));

        answer_with(&mock, |invoke_id| {
            reply(|w| {
                RejectPdu {
                    invoke_id,
                    reason: 9,
                }
                .encode(w)
            })
        });
        assert!(matches!(
            read().await,
            Err(ClientError::RemoteRejected(Rejection::Reject { reason: 9 }))
        ));

        answer_with(&mock, |invoke_id| {
            reply(|w| {
                AbortPdu {
                    server: true,
                    invoke_id,
                    reason: 4,
                }
                .encode(w)
            })
        });
        assert!(matches!(
            read().await,
            Err(ClientError::RemoteAborted {
                reason: 4,
                server: true,
            })
        ));
        // One frame each; refusals are final and never retried.
        assert_eq!(mock.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_for_another_service_is_unexpected() {
        let (session, mock) = session();
        answer_with(&mock, |invoke_id| {
            reply(|w| {
                SimpleAck {
                    invoke_id,
                    service_choice: 0x0F,
                }
                .encode(w)
            })
        });
        let err = session
            .read_property(station(5), av1(), PropertyId::PresentValue, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn late_and_duplicate_responses_are_dropped() {
        let (session, mock) = session();
        let stray = reply(|w| {
            SimpleAck {
                invoke_id: 42,
                service_choice: 0x0F,
            }
            .encode(w)
        });
        mock.inject(stray, station(5));

        let sim = Mutex::new(SimulatedDevice::new(5));
        mock.set_responder(Box::new(move |_, payload| {
            let reply = sim.lock().unwrap().respond(payload).unwrap();
            vec![(reply.clone(), station(5)), (reply, station(5))]
        }));
        for _ in 0..2 {
            let value = session
                .read_property(station(5), ObjectId::device(5), PropertyId::ObjectName, None)
                .await
                .unwrap();
            assert_eq!(value, PropertyValue::CharacterString("SimDevice-5".into()));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        let stats = session.stats().await.unwrap();
        assert_eq!(stats.pending_transactions, 0);
        assert_eq!(stats.transport.received_frames, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn device_object_reads_refresh_capabilities() {
        let (session, mock) = session();
        let mut events = session.device_events();
        mock.inject(i_am(15), station(15));
        let announced = events.recv().await.unwrap();
        assert_eq!(announced.vendor_id, 999);

        serve(&mock, vec![SimulatedDevice::new(15).with_vendor_id(7)]);
        let value = session
            .read_property(
                station(15),
                ObjectId::device(15),
                PropertyId::VendorIdentifier,
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, PropertyValue::Unsigned(7));
        let device = session.lookup_device(15).await.unwrap().unwrap();
        assert_eq!(device.vendor_id, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn routed_requests_carry_the_remote_network() {
        let (session, mock) = session();
        let route = NpduAddress::new(5, &[0x0A]).unwrap();
        let address = DeviceAddress::routed(station(1), route);
        let _ = session
            .read_property(address, av1(), PropertyId::PresentValue, None)
            .await;
        let npdu = decode_npdu_frame(&mock.sent()[0].payload).unwrap().npdu;
        assert_eq!(npdu.destination, Some(route));
        assert!(npdu.expecting_reply);
    }

    #[tokio::test(start_paused = true)]
    async fn the_257th_outstanding_request_is_refused() {
        let (session, mock) = session();
        let mut pending = Vec::new();
        for _ in 0..256 {
            let session = session.clone();
            pending.push(tokio::spawn(async move {
                session
                    .read_property(station(5), av1(), PropertyId::PresentValue, None)
                    .await
            }));
        }
        wait_for_sent(&mock, 256).await;

        let err = session
            .read_property(station(5), av1(), PropertyId::PresentValue, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TableExhausted));
        assert_eq!(mock.sent().len(), 256);
        session.close().await;
        for task in pending {
            assert!(matches!(task.await.unwrap(), Err(ClientError::Closing)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_fails_in_flight_requests_with_closing() {
        let (session, mock) = session();
        let pending = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .read_property(station(5), av1(), PropertyId::PresentValue, None)
                    .await
            }
        });
        let discovery = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .discover(DiscoverRequest::new(Duration::from_secs(60)))
                    .await
            }
        });
        wait_for_sent(&mock, 2).await;

        session.close().await;
        assert!(matches!(pending.await.unwrap(), Err(ClientError::Closing)));
        assert!(matches!(discovery.await.unwrap(), Err(ClientError::Closing)));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_refuses_everything_without_io() {
        let (session, mock) = session();
        session.close().await;
        session.close().await;
        assert!(session.is_closed());

        let read = session
            .read_property(station(5), av1(), PropertyId::PresentValue, None)
            .await;
        assert!(matches!(read, Err(ClientError::NotConnected)));
        let write = session
            .write_property(station(5), av1(), PropertyId::PresentValue, None, vec![])
            .await;
        assert!(matches!(write, Err(ClientError::NotConnected)));
        let found = session
            .discover(DiscoverRequest::new(Duration::from_millis(10)))
            .await;
        assert!(matches!(found, Err(ClientError::NotConnected)));
        assert!(matches!(
            session.known_devices().await,
            Err(ClientError::NotConnected)
        ));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_last_handle_stops_the_driver() {
        let (session, _mock) = session();
        let mut events = session.device_events();
        drop(session);
        assert!(matches!(
            events.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));
    }
}
