pub mod config;
pub mod device;
pub mod error;
pub mod registry;
pub mod session;
pub mod simulator;
pub mod transaction;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bacflow_datalink::{BacnetIpTransport, DataLink, DataLinkAddress};
pub use config::SessionConfig;
pub use device::{Device, DeviceAddress};
pub use error::{ClientError, Rejection, TableError};
pub use registry::{DeviceRegistry, DiscoveryFilter, DiscoveryHandler, SubscriptionEnd};
pub use session::{DiscoverRequest, DiscoveryStream, Session, SessionStats};
pub use simulator::SimulatedDevice;
pub use transaction::{ServiceResponse, TransactionTable};
pub use transport::{Inbound, InboundFrame, Transport, TransportStats};
