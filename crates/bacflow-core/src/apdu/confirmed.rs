use crate::apdu::ApduType;
use crate::encoding::{
    primitives::{decode_unsigned, encode_app_enumerated},
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::types::{ErrorClass, ErrorCode, MaxApdu};
use crate::{DecodeError, EncodeError};

const SEGMENTED: u8 = 0b0000_1000;
const MORE_FOLLOWS: u8 = 0b0000_0100;
const SEGMENTED_RESPONSE_ACCEPTED: u8 = 0b0000_0010;

fn expect_type(r: &mut Reader<'_>, expected: ApduType) -> Result<u8, DecodeError> {
    let first = r.read_u8()?;
    if ApduType::from_first_octet(first) != Some(expected) {
        return Err(DecodeError::InvalidValue);
    }
    Ok(first)
}

/// Confirmed-Request header.
///
/// Requests built by the session core are never segmented and never accept
/// segmented responses. The segment fields are still parsed so that a
/// segmented request from a peer is recognised rather than misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedRequestHeader {
    pub segmented: bool,
    pub more_follows: bool,
    pub segmented_response_accepted: bool,
    pub max_segments: u8,
    pub max_apdu: u8,
    pub invoke_id: u8,
    pub sequence_number: Option<u8>,
    pub proposed_window_size: Option<u8>,
    pub service_choice: u8,
}

impl ConfirmedRequestHeader {
    /// Unsegmented request header advertising a 1476-octet APDU limit.
    pub const fn unsegmented(invoke_id: u8, service_choice: u8) -> Self {
        Self {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: false,
            max_segments: 0,
            max_apdu: MaxApdu::UpTo1476.code(),
            invoke_id,
            sequence_number: None,
            proposed_window_size: None,
            service_choice,
        }
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut first = ApduType::ConfirmedRequest.first_octet();
        if self.segmented {
            first |= SEGMENTED;
        }
        if self.more_follows {
            first |= MORE_FOLLOWS;
        }
        if self.segmented_response_accepted {
            first |= SEGMENTED_RESPONSE_ACCEPTED;
        }
        w.write_u8(first)?;
        w.write_u8(((self.max_segments & 0x07) << 4) | (self.max_apdu & 0x0F))?;
        w.write_u8(self.invoke_id)?;
        if self.segmented {
            w.write_u8(self.sequence_number.unwrap_or(0))?;
            w.write_u8(self.proposed_window_size.unwrap_or(1))?;
        }
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let first = expect_type(r, ApduType::ConfirmedRequest)?;
        let segmented = first & SEGMENTED != 0;
        let limits = r.read_u8()?;
        let invoke_id = r.read_u8()?;
        let (sequence_number, proposed_window_size) = if segmented {
            (Some(r.read_u8()?), Some(r.read_u8()?))
        } else {
            (None, None)
        };
        Ok(Self {
            segmented,
            more_follows: first & MORE_FOLLOWS != 0,
            segmented_response_accepted: first & SEGMENTED_RESPONSE_ACCEPTED != 0,
            max_segments: (limits >> 4) & 0x07,
            max_apdu: limits & 0x0F,
            invoke_id,
            sequence_number,
            proposed_window_size,
            service_choice: r.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexAckHeader {
    pub segmented: bool,
    pub more_follows: bool,
    pub invoke_id: u8,
    pub sequence_number: Option<u8>,
    pub proposed_window_size: Option<u8>,
    pub service_choice: u8,
}

impl ComplexAckHeader {
    pub const fn unsegmented(invoke_id: u8, service_choice: u8) -> Self {
        Self {
            segmented: false,
            more_follows: false,
            invoke_id,
            sequence_number: None,
            proposed_window_size: None,
            service_choice,
        }
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut first = ApduType::ComplexAck.first_octet();
        if self.segmented {
            first |= SEGMENTED;
        }
        if self.more_follows {
            first |= MORE_FOLLOWS;
        }
        w.write_u8(first)?;
        w.write_u8(self.invoke_id)?;
        if self.segmented {
            w.write_u8(self.sequence_number.unwrap_or(0))?;
            w.write_u8(self.proposed_window_size.unwrap_or(1))?;
        }
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let first = expect_type(r, ApduType::ComplexAck)?;
        let segmented = first & SEGMENTED != 0;
        let invoke_id = r.read_u8()?;
        let (sequence_number, proposed_window_size) = if segmented {
            (Some(r.read_u8()?), Some(r.read_u8()?))
        } else {
            (None, None)
        };
        Ok(Self {
            segmented,
            more_follows: first & MORE_FOLLOWS != 0,
            invoke_id,
            sequence_number,
            proposed_window_size,
            service_choice: r.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleAck {
    pub invoke_id: u8,
    pub service_choice: u8,
}

impl SimpleAck {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::SimpleAck.first_octet())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_type(r, ApduType::SimpleAck)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            service_choice: r.read_u8()?,
        })
    }
}

/// Error PDU.
///
/// Decoding accepts the standard application-enumerated pair as well as the
/// context-tagged and `[0]`-wrapped variants some stacks emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPdu {
    pub invoke_id: u8,
    pub service_choice: u8,
    pub error_class: ErrorClass,
    pub error_code: ErrorCode,
}

impl ErrorPdu {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Error.first_octet())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.service_choice)?;
        encode_app_enumerated(w, self.error_class.to_raw())?;
        encode_app_enumerated(w, self.error_code.to_raw())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_type(r, ApduType::Error)?;
        let invoke_id = r.read_u8()?;
        let service_choice = r.read_u8()?;

        let (class, code) = match Tag::decode(r)? {
            Tag::Opening { tag_num: 0 } => {
                let class_tag = Tag::decode(r)?;
                let pair = decode_error_pair(r, class_tag)?;
                Tag::expect_closing(r, 0)?;
                pair
            }
            first => decode_error_pair(r, first)?,
        };

        Ok(Self {
            invoke_id,
            service_choice,
            error_class: ErrorClass::from_raw(class),
            error_code: ErrorCode::from_raw(code),
        })
    }
}

pub(crate) fn decode_error_pair(
    r: &mut Reader<'_>,
    class_tag: Tag,
) -> Result<(u32, u32), DecodeError> {
    let class = decode_error_value(r, class_tag, 0)?;
    let code_tag = Tag::decode(r)?;
    let code = decode_error_value(r, code_tag, 1)?;
    Ok((class, code))
}

fn decode_error_value(r: &mut Reader<'_>, tag: Tag, ctx_tag: u8) -> Result<u32, DecodeError> {
    match tag {
        Tag::Application {
            tag: AppTag::Enumerated,
            len,
        } => decode_unsigned(r, len as usize),
        Tag::Context { tag_num, len } if tag_num == ctx_tag => decode_unsigned(r, len as usize),
        _ => Err(DecodeError::InvalidTag),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectPdu {
    pub invoke_id: u8,
    pub reason: u8,
}

impl RejectPdu {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Reject.first_octet())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.reason)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_type(r, ApduType::Reject)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            reason: r.read_u8()?,
        })
    }
}

/// Abort PDU. `server` is set when the responding device sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPdu {
    pub server: bool,
    pub invoke_id: u8,
    pub reason: u8,
}

impl AbortPdu {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Abort.first_octet() | u8::from(self.server))?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.reason)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let first = expect_type(r, ApduType::Abort)?;
        Ok(Self {
            server: first & 0x01 != 0,
            invoke_id: r.read_u8()?,
            reason: r.read_u8()?,
        })
    }
}
