use alloc::{string::String, vec::Vec};

use crate::encoding::tag::AppTag;
use crate::types::ObjectId;

/// Bit string with the count of unused bits in its final octet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BitString {
    pub unused_bits: u8,
    pub data: Vec<u8>,
}

impl BitString {
    pub fn new(unused_bits: u8, data: Vec<u8>) -> Self {
        Self { unused_bits, data }
    }

    /// Number of meaningful bits.
    pub fn len(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.unused_bits as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit `index`, counting from the most significant bit of the first octet.
    pub fn bit(&self, index: usize) -> Option<bool> {
        if index >= self.len() {
            return None;
        }
        Some(self.data[index / 8] & (0x80 >> (index % 8)) != 0)
    }
}

/// BACnet date. `0xFF` in any field means "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Date {
    pub year_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
}

/// BACnet time of day. `0xFF` in any field means "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

/// A property value as read from or written to a device.
///
/// A property whose value is several application-tagged items in a row (a
/// priority array, an object list, a write value list) is a
/// [`PropertyValue::List`]. Context-tagged opening/closing groups decode to
/// [`PropertyValue::Constructed`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "value"))]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString(BitString),
    Enumerated(u32),
    Date(Date),
    Time(Time),
    ObjectId(ObjectId),
    List(Vec<PropertyValue>),
    Constructed {
        tag_num: u8,
        values: Vec<PropertyValue>,
    },
}

impl PropertyValue {
    /// Application tag this value is encoded with, or `None` for lists and
    /// constructed groups.
    pub fn tag(&self) -> Option<AppTag> {
        Some(match self {
            Self::Null => AppTag::Null,
            Self::Boolean(_) => AppTag::Boolean,
            Self::Unsigned(_) => AppTag::UnsignedInt,
            Self::Signed(_) => AppTag::SignedInt,
            Self::Real(_) => AppTag::Real,
            Self::Double(_) => AppTag::Double,
            Self::OctetString(_) => AppTag::OctetString,
            Self::CharacterString(_) => AppTag::CharacterString,
            Self::BitString(_) => AppTag::BitString,
            Self::Enumerated(_) => AppTag::Enumerated,
            Self::Date(_) => AppTag::Date,
            Self::Time(_) => AppTag::Time,
            Self::ObjectId(_) => AppTag::ObjectId,
            Self::List(_) | Self::Constructed { .. } => return None,
        })
    }

    /// Collapses a decoded value list: one item stays as-is, anything else
    /// becomes a [`PropertyValue::List`].
    pub fn from_items(mut items: Vec<PropertyValue>) -> Self {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Self::List(items)
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Unsigned(v) | Self::Enumerated(v) => Some(*v as f64),
            Self::Signed(v) => Some(*v as f64),
            Self::Real(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) | Self::Enumerated(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Unsigned(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::CharacterString(value.into())
    }
}
