use alloc::vec::Vec;

use crate::apdu::confirmed::decode_error_pair;
use crate::encoding::{
    primitives::{
        decode_ctx_object_id, decode_ctx_unsigned, decode_optional_ctx_unsigned,
        decode_unsigned, encode_app_enumerated, encode_ctx_object_id, encode_ctx_unsigned,
    },
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::value_codec::{decode_values_until_closing, encode_property_value};
use crate::types::{ErrorClass, ErrorCode, ObjectId, PropertyId, PropertyValue};
use crate::{DecodeError, EncodeError};

pub const SERVICE_READ_PROPERTY_MULTIPLE: u8 = 0x0E;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyReference {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
}

impl PropertyReference {
    pub const fn new(property_id: PropertyId) -> Self {
        Self {
            property_id,
            array_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAccessSpec {
    pub object_id: ObjectId,
    pub properties: Vec<PropertyReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPropertyMultipleRequest {
    pub specs: Vec<ReadAccessSpec>,
}

impl ReadPropertyMultipleRequest {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if self.specs.is_empty() {
            return Err(EncodeError::Message("read-property-multiple needs a specification"));
        }
        for spec in &self.specs {
            encode_ctx_object_id(w, 0, spec.object_id)?;
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for prop in &spec.properties {
                encode_ctx_unsigned(w, 0, prop.property_id.to_raw())?;
                if let Some(index) = prop.array_index {
                    encode_ctx_unsigned(w, 1, index)?;
                }
            }
            Tag::Closing { tag_num: 1 }.encode(w)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut specs = Vec::new();
        while !r.is_empty() {
            let object_id = decode_ctx_object_id(r, 0)?;
            Tag::expect_opening(r, 1)?;
            let mut properties = Vec::new();
            while Tag::peek(r)? != (Tag::Closing { tag_num: 1 }) {
                properties.push(PropertyReference {
                    property_id: PropertyId::from_raw(decode_ctx_unsigned(r, 0)?),
                    array_index: decode_optional_ctx_unsigned(r, 1)?,
                });
            }
            Tag::expect_closing(r, 1)?;
            specs.push(ReadAccessSpec {
                object_id,
                properties,
            });
        }
        if specs.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(Self { specs })
    }
}

/// Outcome for one property: its value, or the property access error the
/// device reported in its place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReadResult {
    Value(PropertyValue),
    Error { class: ErrorClass, code: ErrorCode },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PropertyResult {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub result: ReadResult,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadAccessResult {
    pub object_id: ObjectId,
    pub results: Vec<PropertyResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMultipleAck {
    pub results: Vec<ReadAccessResult>,
}

impl ReadPropertyMultipleAck {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        for access in &self.results {
            encode_ctx_object_id(w, 0, access.object_id)?;
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for item in &access.results {
                encode_ctx_unsigned(w, 2, item.property_id.to_raw())?;
                if let Some(index) = item.array_index {
                    encode_ctx_unsigned(w, 3, index)?;
                }
                match &item.result {
                    ReadResult::Value(value) => {
                        Tag::Opening { tag_num: 4 }.encode(w)?;
                        encode_property_value(w, value)?;
                        Tag::Closing { tag_num: 4 }.encode(w)?;
                    }
                    ReadResult::Error { class, code } => {
                        Tag::Opening { tag_num: 5 }.encode(w)?;
                        encode_app_enumerated(w, class.to_raw())?;
                        encode_app_enumerated(w, code.to_raw())?;
                        Tag::Closing { tag_num: 5 }.encode(w)?;
                    }
                }
            }
            Tag::Closing { tag_num: 1 }.encode(w)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut results = Vec::new();
        while !r.is_empty() {
            let object_id = decode_ctx_object_id(r, 0)?;
            Tag::expect_opening(r, 1)?;
            let mut items = Vec::new();
            loop {
                let tag = Tag::decode(r)?;
                let property_id = match tag {
                    Tag::Closing { tag_num: 1 } => break,
                    Tag::Context { tag_num: 2, len } => {
                        PropertyId::from_raw(decode_unsigned(r, len as usize)?)
                    }
                    _ => return Err(DecodeError::InvalidTag),
                };
                let array_index = decode_optional_ctx_unsigned(r, 3)?;
                let result = match Tag::decode(r)? {
                    Tag::Opening { tag_num: 4 } => ReadResult::Value(PropertyValue::from_items(
                        decode_values_until_closing(r, 4)?,
                    )),
                    Tag::Opening { tag_num: 5 } => {
                        let class_tag = Tag::decode(r)?;
                        let (class, code) = decode_error_pair(r, class_tag)?;
                        Tag::expect_closing(r, 5)?;
                        ReadResult::Error {
                            class: ErrorClass::from_raw(class),
                            code: ErrorCode::from_raw(code),
                        }
                    }
                    _ => return Err(DecodeError::InvalidTag),
                };
                items.push(PropertyResult {
                    property_id,
                    array_index,
                    result,
                });
            }
            results.push(ReadAccessResult {
                object_id,
                results: items,
            });
        }
        Ok(Self { results })
    }
}
