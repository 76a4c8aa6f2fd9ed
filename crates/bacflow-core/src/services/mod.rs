//! Service payloads. Each request type encodes and decodes only the bytes
//! that follow its APDU header; [`crate::codec`] adds the headers.

pub mod i_am;
pub mod read_property;
pub mod read_property_multiple;
pub mod value_codec;
pub mod who_is;
pub mod write_property;
pub mod write_property_multiple;

pub use i_am::{IAmRequest, SERVICE_I_AM};
pub use read_property::{ReadPropertyAck, ReadPropertyRequest, SERVICE_READ_PROPERTY};
pub use read_property_multiple::{
    PropertyReference, PropertyResult, ReadAccessResult, ReadAccessSpec,
    ReadPropertyMultipleAck, ReadPropertyMultipleRequest, ReadResult,
    SERVICE_READ_PROPERTY_MULTIPLE,
};
pub use who_is::{WhoIsRequest, SERVICE_WHO_IS};
pub use write_property::{WritePropertyRequest, DEFAULT_PRIORITY, SERVICE_WRITE_PROPERTY};
pub use write_property_multiple::{
    PropertyWrite, WriteAccessSpec, WritePropertyMultipleRequest,
    SERVICE_WRITE_PROPERTY_MULTIPLE,
};
