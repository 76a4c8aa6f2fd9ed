use core::fmt;

use crate::types::ObjectType;

/// Largest instance number an object identifier can carry (22 bits).
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

/// Object identifier as carried on the wire: 10-bit type, 22-bit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub const fn new(object_type: ObjectType, instance: u32) -> Self {
        Self(((object_type.to_raw() as u32 & 0x03FF) << 22) | (instance & MAX_INSTANCE))
    }

    /// Identifier of the Device object with the given instance.
    pub const fn device(instance: u32) -> Self {
        Self::new(ObjectType::Device, instance)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn object_type(self) -> ObjectType {
        ObjectType::from_raw(((self.0 >> 22) & 0x03FF) as u16)
    }

    pub const fn instance(self) -> u32 {
        self.0 & MAX_INSTANCE
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.object_type(), self.instance())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ObjectId", 2)?;
        s.serialize_field("type", &self.object_type())?;
        s.serialize_field("instance", &self.instance())?;
        s.end()
    }
}
