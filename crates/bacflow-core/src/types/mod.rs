#[macro_use]
mod macros;

pub mod enums;
pub mod object_id;
pub mod object_type;
pub mod property_id;
pub mod value;

pub use enums::{ErrorClass, ErrorCode, MaxApdu, Segmentation};
pub use object_id::{ObjectId, MAX_INSTANCE};
pub use object_type::ObjectType;
pub use property_id::PropertyId;
pub use value::{BitString, Date, PropertyValue, Time};
