pub mod address;
pub mod bip;
pub mod traits;

pub use address::DataLinkAddress;
pub use bip::transport::{BacnetIpTransport, TransportConfig};
pub use traits::{DataLink, DataLinkError};
