use crate::encoding::{
    primitives::{
        decode_app_enumerated, decode_app_object_id, decode_app_unsigned, encode_app_enumerated,
        encode_app_object_id, encode_app_unsigned,
    },
    reader::Reader,
    writer::Writer,
};
use crate::types::{ObjectId, ObjectType, Segmentation};
use crate::{DecodeError, EncodeError};

pub const SERVICE_I_AM: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IAmRequest {
    pub device_id: ObjectId,
    pub max_apdu: u32,
    pub segmentation: Segmentation,
    pub vendor_id: u32,
}

impl IAmRequest {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        encode_app_object_id(w, self.device_id)?;
        encode_app_unsigned(w, self.max_apdu)?;
        encode_app_enumerated(w, self.segmentation.to_raw())?;
        encode_app_unsigned(w, self.vendor_id)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let device_id = decode_app_object_id(r)?;
        if device_id.object_type() != ObjectType::Device {
            return Err(DecodeError::Message("i-am must name a device object"));
        }
        let max_apdu = decode_app_unsigned(r)?;
        let segmentation =
            Segmentation::from_raw(decode_app_enumerated(r)?).ok_or(DecodeError::InvalidValue)?;
        let vendor_id = decode_app_unsigned(r)?;
        Ok(Self {
            device_id,
            max_apdu,
            segmentation,
            vendor_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::IAmRequest;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, Segmentation};
    use crate::DecodeError;

    #[test]
    fn i_am_body_bytes() {
        let iam = IAmRequest {
            device_id: ObjectId::device(15),
            max_apdu: 1476,
            segmentation: Segmentation::None,
            vendor_id: 260,
        };
        let mut w = Writer::new();
        iam.encode(&mut w).unwrap();
        assert_eq!(
            w.as_written(),
            &[0xC4, 0x02, 0x00, 0x00, 0x0F, 0x22, 0x05, 0xC4, 0x91, 0x03, 0x22, 0x01, 0x04]
        );
        assert_eq!(IAmRequest::decode(&mut Reader::new(w.as_written())).unwrap(), iam);
    }

    #[test]
    fn non_device_identifier_is_rejected() {
        let mut w = Writer::new();
        IAmRequest {
            device_id: ObjectId::new(ObjectType::AnalogInput, 1),
            max_apdu: 480,
            segmentation: Segmentation::Both,
            vendor_id: 0,
        }
        .encode(&mut w)
        .unwrap();
        assert!(matches!(
            IAmRequest::decode(&mut Reader::new(w.as_written())),
            Err(DecodeError::Message(_))
        ));
    }
}
