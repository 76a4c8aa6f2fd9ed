use alloc::vec::Vec;

use crate::encoding::{
    primitives::{
        decode_ctx_object_id, decode_ctx_unsigned, decode_optional_ctx_unsigned,
        encode_ctx_object_id, encode_ctx_unsigned,
    },
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::value_codec::{decode_values_until_closing, encode_property_value};
use crate::types::{ObjectId, PropertyId, PropertyValue};
use crate::{DecodeError, EncodeError};

pub const SERVICE_WRITE_PROPERTY_MULTIPLE: u8 = 0x10;

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteAccessSpec {
    pub object_id: ObjectId,
    pub properties: Vec<PropertyWrite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyMultipleRequest {
    pub specs: Vec<WriteAccessSpec>,
}

impl WritePropertyMultipleRequest {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if self.specs.is_empty() {
            return Err(EncodeError::Message("write-property-multiple needs a specification"));
        }
        for spec in &self.specs {
            encode_ctx_object_id(w, 0, spec.object_id)?;
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for prop in &spec.properties {
                encode_ctx_unsigned(w, 0, prop.property_id.to_raw())?;
                if let Some(index) = prop.array_index {
                    encode_ctx_unsigned(w, 1, index)?;
                }
                Tag::Opening { tag_num: 2 }.encode(w)?;
                encode_property_value(w, &prop.value)?;
                Tag::Closing { tag_num: 2 }.encode(w)?;
                match prop.priority {
                    Some(p @ 1..=16) => encode_ctx_unsigned(w, 3, p as u32)?,
                    Some(_) => return Err(EncodeError::ValueOutOfRange),
                    None => {}
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
                let property_id = PropertyId::from_raw(decode_ctx_unsigned(r, 0)?);
                let array_index = decode_optional_ctx_unsigned(r, 1)?;
                Tag::expect_opening(r, 2)?;
                let value = PropertyValue::from_items(decode_values_until_closing(r, 2)?);
                let priority = decode_optional_ctx_unsigned(r, 3)?
                    .map(|p| u8::try_from(p).map_err(|_| DecodeError::InvalidValue))
                    .transpose()?;
                properties.push(PropertyWrite {
                    property_id,
                    array_index,
                    value,
                    priority,
                });
            }
            Tag::expect_closing(r, 1)?;
            specs.push(WriteAccessSpec {
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
