use crate::encoding::{
    primitives::{decode_optional_ctx_unsigned, encode_ctx_unsigned},
    reader::Reader,
    writer::Writer,
};
use crate::types::MAX_INSTANCE;
use crate::{DecodeError, EncodeError};

pub const SERVICE_WHO_IS: u8 = 0x08;

/// Who-Is with an optional device instance range.
///
/// On the wire the two limits are either both present or both absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WhoIsRequest {
    pub limits: Option<(u32, u32)>,
}

impl WhoIsRequest {
    pub const fn global() -> Self {
        Self { limits: None }
    }

    /// Builds a ranged request; a missing bound opens that side of the range.
    pub fn ranged(low: Option<u32>, high: Option<u32>) -> Self {
        match (low, high) {
            (None, None) => Self::global(),
            (low, high) => Self {
                limits: Some((low.unwrap_or(0), high.unwrap_or(MAX_INSTANCE))),
            },
        }
    }

    /// Whether an I-Am from `instance` answers this request.
    pub fn matches(&self, instance: u32) -> bool {
        self.limits
            .map_or(true, |(low, high)| (low..=high).contains(&instance))
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if let Some((low, high)) = self.limits {
            if low > MAX_INSTANCE || high > MAX_INSTANCE {
                return Err(EncodeError::ValueOutOfRange);
            }
            encode_ctx_unsigned(w, 0, low)?;
            encode_ctx_unsigned(w, 1, high)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let low = decode_optional_ctx_unsigned(r, 0)?;
        let high = decode_optional_ctx_unsigned(r, 1)?;
        match (low, high) {
            (Some(low), Some(high)) => Ok(Self {
                limits: Some((low, high)),
            }),
            (None, None) => Ok(Self::global()),
            _ => Err(DecodeError::Message("who-is limits must appear together")),
        }
    }
}
