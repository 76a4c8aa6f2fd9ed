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

pub const SERVICE_READ_PROPERTY: u8 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
}

impl ReadPropertyRequest {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        encode_ctx_object_id(w, 0, self.object_id)?;
        encode_ctx_unsigned(w, 1, self.property_id.to_raw())?;
        if let Some(index) = self.array_index {
            encode_ctx_unsigned(w, 2, index)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: decode_ctx_object_id(r, 0)?,
            property_id: PropertyId::from_raw(decode_ctx_unsigned(r, 1)?),
            array_index: decode_optional_ctx_unsigned(r, 2)?,
        })
    }
}

/// ReadProperty-ACK. A multi-item property value decodes to
/// [`PropertyValue::List`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyAck {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
}

impl ReadPropertyAck {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        encode_ctx_object_id(w, 0, self.object_id)?;
        encode_ctx_unsigned(w, 1, self.property_id.to_raw())?;
        if let Some(index) = self.array_index {
            encode_ctx_unsigned(w, 2, index)?;
        }
        Tag::Opening { tag_num: 3 }.encode(w)?;
        encode_property_value(w, &self.value)?;
        Tag::Closing { tag_num: 3 }.encode(w)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let object_id = decode_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_raw(decode_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        Tag::expect_opening(r, 3)?;
        let value = PropertyValue::from_items(decode_values_until_closing(r, 3)?);
        Ok(Self {
            object_id,
            property_id,
            array_index,
            value,
        })
    }
}
