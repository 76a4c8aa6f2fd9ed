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

pub const SERVICE_WRITE_PROPERTY: u8 = 0x0F;

/// Lowest (least urgent) command priority.
pub const DEFAULT_PRIORITY: u8 = 16;

/// WriteProperty request. `values` are written in order inside the
/// property-value group, so several items form a list write.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub values: Vec<PropertyValue>,
    pub priority: Option<u8>,
}

impl WritePropertyRequest {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if let Some(priority) = self.priority {
            if !(1..=16).contains(&priority) {
                return Err(EncodeError::ValueOutOfRange);
            }
        }
        encode_ctx_object_id(w, 0, self.object_id)?;
        encode_ctx_unsigned(w, 1, self.property_id.to_raw())?;
        if let Some(index) = self.array_index {
            encode_ctx_unsigned(w, 2, index)?;
        }
        Tag::Opening { tag_num: 3 }.encode(w)?;
        for value in &self.values {
            encode_property_value(w, value)?;
        }
        Tag::Closing { tag_num: 3 }.encode(w)?;
        if let Some(priority) = self.priority {
            encode_ctx_unsigned(w, 4, priority as u32)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let object_id = decode_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_raw(decode_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        Tag::expect_opening(r, 3)?;
        let values = decode_values_until_closing(r, 3)?;
        let priority = match decode_optional_ctx_unsigned(r, 4)? {
            Some(p @ 1..=16) => Some(p as u8),
            Some(_) => return Err(DecodeError::InvalidValue),
            None => None,
        };
        Ok(Self {
            object_id,
            property_id,
            array_index,
            values,
            priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::WritePropertyRequest;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
    use crate::EncodeError;
    use alloc::vec;

    fn present_value_write(priority: Option<u8>) -> WritePropertyRequest {
        WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            values: vec![PropertyValue::Real(72.5)],
            priority,
        }
    }

    #[test]
    fn real_write_at_priority_eight() {
        let req = present_value_write(Some(8));
        let mut w = Writer::new();
        req.encode(&mut w).unwrap();
        assert_eq!(
            w.as_written(),
            &[
                0x0C, 0x00, 0x80, 0x00, 0x01, 0x19, 0x55, 0x3E, 0x44, 0x42, 0x91, 0x00, 0x00,
                0x3F, 0x49, 0x08
            ]
        );
        assert_eq!(WritePropertyRequest::decode(&mut Reader::new(w.as_written())).unwrap(), req);
    }

    #[test]
    fn priority_outside_range_is_refused() {
        for priority in [0, 17] {
            let mut w = Writer::new();
            assert_eq!(
                present_value_write(Some(priority)).encode(&mut w).unwrap_err(),
                EncodeError::ValueOutOfRange
            );
        }
    }

    #[test]
    fn relinquish_is_a_null_write() {
        let mut req = present_value_write(Some(16));
        req.values = vec![PropertyValue::Null];
        let mut w = Writer::new();
        req.encode(&mut w).unwrap();
        assert_eq!(&w.as_written()[7..10], &[0x3E, 0x00, 0x3F]);
    }

    #[test]
    fn default_priority_is_lowest_precedence() {
        assert_eq!(crate::services::DEFAULT_PRIORITY, 16);
        let mut w = Writer::new();
        present_value_write(Some(crate::services::DEFAULT_PRIORITY))
            .encode(&mut w)
            .unwrap();
        assert!(w.as_written().ends_with(&[0x49, 0x10]));
    }
}
