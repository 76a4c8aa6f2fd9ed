//! Frame-level entry points: NPDU + APDU in, [`DecodedFrame`] out, and the
//! reverse for the requests the session core sends.

use alloc::vec::Vec;

use crate::apdu::{
    AbortPdu, ApduType, ComplexAckHeader, ConfirmedRequestHeader, ErrorPdu, RejectPdu, SimpleAck,
    UnconfirmedRequestHeader,
};
use crate::encoding::{reader::Reader, writer::Writer};
use crate::npdu::Npdu;
use crate::services::{
    IAmRequest, ReadPropertyAck, ReadPropertyMultipleAck, ReadPropertyMultipleRequest,
    ReadPropertyRequest, WhoIsRequest, WritePropertyMultipleRequest, WritePropertyRequest,
    SERVICE_I_AM, SERVICE_READ_PROPERTY, SERVICE_READ_PROPERTY_MULTIPLE, SERVICE_WHO_IS,
    SERVICE_WRITE_PROPERTY, SERVICE_WRITE_PROPERTY_MULTIPLE,
};
use crate::types::{ErrorClass, ErrorCode};
use crate::{DecodeError, EncodeError, MalformedFrame};

/// Confirmed service choice. Services the core does not model keep their raw
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmedService {
    ReadProperty,
    ReadPropertyMultiple,
    WriteProperty,
    WritePropertyMultiple,
    Other(u8),
}

impl ConfirmedService {
    pub const fn code(self) -> u8 {
        match self {
            Self::ReadProperty => SERVICE_READ_PROPERTY,
            Self::ReadPropertyMultiple => SERVICE_READ_PROPERTY_MULTIPLE,
            Self::WriteProperty => SERVICE_WRITE_PROPERTY,
            Self::WritePropertyMultiple => SERVICE_WRITE_PROPERTY_MULTIPLE,
            Self::Other(code) => code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            SERVICE_READ_PROPERTY => Self::ReadProperty,
            SERVICE_READ_PROPERTY_MULTIPLE => Self::ReadPropertyMultiple,
            SERVICE_WRITE_PROPERTY => Self::WriteProperty,
            SERVICE_WRITE_PROPERTY_MULTIPLE => Self::WritePropertyMultiple,
            other => Self::Other(other),
        }
    }
}

/// A confirmed request the core can send (and, for simulated peers, answer).
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    ReadProperty(ReadPropertyRequest),
    WriteProperty(WritePropertyRequest),
    ReadPropertyMultiple(ReadPropertyMultipleRequest),
    WritePropertyMultiple(WritePropertyMultipleRequest),
}

impl ServiceRequest {
    pub fn service(&self) -> ConfirmedService {
        match self {
            Self::ReadProperty(_) => ConfirmedService::ReadProperty,
            Self::WriteProperty(_) => ConfirmedService::WriteProperty,
            Self::ReadPropertyMultiple(_) => ConfirmedService::ReadPropertyMultiple,
            Self::WritePropertyMultiple(_) => ConfirmedService::WritePropertyMultiple,
        }
    }

    fn encode_body(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Self::ReadProperty(req) => req.encode(w),
            Self::WriteProperty(req) => req.encode(w),
            Self::ReadPropertyMultiple(req) => req.encode(w),
            Self::WritePropertyMultiple(req) => req.encode(w),
        }
    }

    fn decode_body(
        service: ConfirmedService,
        r: &mut Reader<'_>,
    ) -> Result<Option<Self>, DecodeError> {
        Ok(Some(match service {
            ConfirmedService::ReadProperty => Self::ReadProperty(ReadPropertyRequest::decode(r)?),
            ConfirmedService::WriteProperty => {
                Self::WriteProperty(WritePropertyRequest::decode(r)?)
            }
            ConfirmedService::ReadPropertyMultiple => {
                Self::ReadPropertyMultiple(ReadPropertyMultipleRequest::decode(r)?)
            }
            ConfirmedService::WritePropertyMultiple => {
                Self::WritePropertyMultiple(WritePropertyMultipleRequest::decode(r)?)
            }
            ConfirmedService::Other(_) => return Ok(None),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnconfirmedRequest {
    WhoIs(WhoIsRequest),
    IAm(IAmRequest),
}

/// Payload of a Complex-ACK.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceAck {
    ReadProperty(ReadPropertyAck),
    ReadPropertyMultiple(ReadPropertyMultipleAck),
    /// Acknowledgement for a service whose result the core does not model.
    Raw(Vec<u8>),
}

/// Everything a received APDU can turn into.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    IAm(IAmRequest),
    WhoIs(WhoIsRequest),
    ConfirmedRequest {
        invoke_id: u8,
        request: ServiceRequest,
    },
    ComplexAck {
        invoke_id: u8,
        service: ConfirmedService,
        ack: ServiceAck,
    },
    SimpleAck {
        invoke_id: u8,
        service: ConfirmedService,
    },
    Error {
        invoke_id: u8,
        service: ConfirmedService,
        class: ErrorClass,
        code: ErrorCode,
    },
    Reject {
        invoke_id: u8,
        reason: u8,
    },
    Abort {
        invoke_id: u8,
        reason: u8,
        server: bool,
    },
    /// First segment of a segmented Complex-ACK. The core never reassembles
    /// segments.
    SegmentedAck {
        invoke_id: u8,
        service: ConfirmedService,
    },
    /// Well-formed but outside what the core handles; the bytes are kept.
    Unrecognized {
        raw: Vec<u8>,
    },
}

impl DecodedFrame {
    /// Invoke ID for responses to confirmed requests.
    pub fn response_invoke_id(&self) -> Option<u8> {
        match self {
            Self::ComplexAck { invoke_id, .. }
            | Self::SimpleAck { invoke_id, .. }
            | Self::Error { invoke_id, .. }
            | Self::Reject { invoke_id, .. }
            | Self::Abort { invoke_id, .. }
            | Self::SegmentedAck { invoke_id, .. } => Some(*invoke_id),
            _ => None,
        }
    }
}

/// A decoded NPDU together with the APDU it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPdu {
    pub npdu: Npdu,
    pub frame: DecodedFrame,
}

/// Writes `npdu` and then whatever `body` emits into a fresh buffer.
pub fn encode_frame(
    npdu: &Npdu,
    body: impl FnOnce(&mut Writer) -> Result<(), EncodeError>,
) -> Result<Vec<u8>, EncodeError> {
    let mut w = Writer::new();
    npdu.encode(&mut w)?;
    body(&mut w)?;
    Ok(w.into_vec())
}

/// Encodes a local, unsegmented confirmed request.
pub fn encode(invoke_id: u8, request: &ServiceRequest) -> Result<Vec<u8>, EncodeError> {
    encode_confirmed_request(&Npdu::confirmed(None), invoke_id, request)
}

pub fn encode_confirmed_request(
    npdu: &Npdu,
    invoke_id: u8,
    request: &ServiceRequest,
) -> Result<Vec<u8>, EncodeError> {
    encode_frame(npdu, |w| {
        ConfirmedRequestHeader::unsegmented(invoke_id, request.service().code()).encode(w)?;
        request.encode_body(w)
    })
}

pub fn encode_unconfirmed_request(
    npdu: &Npdu,
    request: &UnconfirmedRequest,
) -> Result<Vec<u8>, EncodeError> {
    encode_frame(npdu, |w| match request {
        UnconfirmedRequest::WhoIs(req) => {
            UnconfirmedRequestHeader {
                service_choice: SERVICE_WHO_IS,
            }
            .encode(w)?;
            req.encode(w)
        }
        UnconfirmedRequest::IAm(req) => {
            UnconfirmedRequestHeader {
                service_choice: SERVICE_I_AM,
            }
            .encode(w)?;
            req.encode(w)
        }
    })
}

/// Decodes an APDU.
///
/// Errors carry the offset (within `apdu`) where decoding stopped.
pub fn decode(apdu: &[u8]) -> Result<DecodedFrame, MalformedFrame> {
    let mut r = Reader::new(apdu);
    decode_apdu(&mut r, apdu).map_err(|kind| MalformedFrame::new(r.position(), kind))
}

/// Decodes an NPDU and the APDU behind it.
///
/// Network-layer messages come back as [`DecodedFrame::Unrecognized`].
pub fn decode_npdu_frame(bytes: &[u8]) -> Result<InboundPdu, MalformedFrame> {
    let mut r = Reader::new(bytes);
    let npdu = Npdu::decode(&mut r).map_err(|kind| MalformedFrame::new(r.position(), kind))?;
    if npdu.network_message.is_some() {
        return Ok(InboundPdu {
            npdu,
            frame: DecodedFrame::Unrecognized {
                raw: bytes.to_vec(),
            },
        });
    }
    let header_len = r.position();
    let frame =
        decode(r.rest()).map_err(|e| MalformedFrame::new(header_len + e.offset, e.kind))?;
    Ok(InboundPdu { npdu, frame })
}

/// Invoke ID of a response APDU, read from its header alone.
///
/// Lets a caller attribute a response whose payload fails to decode.
/// `bytes` starts at the NPDU, as for [`decode_npdu_frame`].
pub fn peek_response_invoke_id(bytes: &[u8]) -> Option<u8> {
    let mut r = Reader::new(bytes);
    let npdu = Npdu::decode(&mut r).ok()?;
    if npdu.network_message.is_some() {
        return None;
    }
    match ApduType::from_first_octet(r.read_u8().ok()?)? {
        ApduType::SimpleAck
        | ApduType::ComplexAck
        | ApduType::Error
        | ApduType::Reject
        | ApduType::Abort => r.read_u8().ok(),
        _ => None,
    }
}

fn unrecognized(apdu: &[u8]) -> DecodedFrame {
    DecodedFrame::Unrecognized { raw: apdu.to_vec() }
}

fn decode_apdu(r: &mut Reader<'_>, apdu: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let Some(pdu_type) = ApduType::from_first_octet(r.peek_u8()?) else {
        return Ok(unrecognized(apdu));
    };

    let frame = match pdu_type {
        ApduType::UnconfirmedRequest => {
            let header = UnconfirmedRequestHeader::decode(r)?;
            match header.service_choice {
                SERVICE_I_AM => DecodedFrame::IAm(IAmRequest::decode(r)?),
                SERVICE_WHO_IS => DecodedFrame::WhoIs(WhoIsRequest::decode(r)?),
                _ => return Ok(unrecognized(apdu)),
            }
        }
        ApduType::ConfirmedRequest => {
            let header = ConfirmedRequestHeader::decode(r)?;
            if header.segmented {
                return Ok(unrecognized(apdu));
            }
            let service = ConfirmedService::from_code(header.service_choice);
            match ServiceRequest::decode_body(service, r)? {
                Some(request) => DecodedFrame::ConfirmedRequest {
                    invoke_id: header.invoke_id,
                    request,
                },
                None => return Ok(unrecognized(apdu)),
            }
        }
        ApduType::ComplexAck => {
            let header = ComplexAckHeader::decode(r)?;
            if header.segmented {
                return Ok(DecodedFrame::SegmentedAck {
                    invoke_id: header.invoke_id,
                    service: ConfirmedService::from_code(header.service_choice),
                });
            }
            let service = ConfirmedService::from_code(header.service_choice);
            let ack = match service {
                ConfirmedService::ReadProperty => {
                    ServiceAck::ReadProperty(ReadPropertyAck::decode(r)?)
                }
                ConfirmedService::ReadPropertyMultiple => {
                    ServiceAck::ReadPropertyMultiple(ReadPropertyMultipleAck::decode(r)?)
                }
                _ => ServiceAck::Raw(r.read_exact(r.remaining())?.to_vec()),
            };
            DecodedFrame::ComplexAck {
                invoke_id: header.invoke_id,
                service,
                ack,
            }
        }
        ApduType::SimpleAck => {
            let ack = SimpleAck::decode(r)?;
            DecodedFrame::SimpleAck {
                invoke_id: ack.invoke_id,
                service: ConfirmedService::from_code(ack.service_choice),
            }
        }
        ApduType::Error => {
            let err = ErrorPdu::decode(r)?;
            DecodedFrame::Error {
                invoke_id: err.invoke_id,
                service: ConfirmedService::from_code(err.service_choice),
                class: err.error_class,
                code: err.error_code,
            }
        }
        ApduType::Reject => {
            let reject = RejectPdu::decode(r)?;
            DecodedFrame::Reject {
                invoke_id: reject.invoke_id,
                reason: reject.reason,
            }
        }
        ApduType::Abort => {
            let abort = AbortPdu::decode(r)?;
            DecodedFrame::Abort {
                invoke_id: abort.invoke_id,
                reason: abort.reason,
                server: abort.server,
            }
        }
        ApduType::SegmentAck => return Ok(unrecognized(apdu)),
    };

    r.finish()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::{
        decode, decode_npdu_frame, encode, peek_response_invoke_id, ConfirmedService,
        DecodedFrame, ServiceAck, ServiceRequest,
    };
    use crate::services::{ReadPropertyRequest, WritePropertyRequest};
    use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
    use crate::DecodeError;
    use alloc::vec;

    fn write_request() -> ServiceRequest {
        ServiceRequest::WriteProperty(WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            values: vec![PropertyValue::Real(72.5)],
            priority: Some(8),
        })
    }

    #[test]
    fn confirmed_request_roundtrips_through_npdu() {
        let bytes = encode(42, &write_request()).unwrap();
        let inbound = decode_npdu_frame(&bytes).unwrap();
        assert!(inbound.npdu.expecting_reply);
        assert_eq!(
            inbound.frame,
            DecodedFrame::ConfirmedRequest {
                invoke_id: 42,
                request: write_request(),
            }
        );
    }

    #[test]
    fn truncated_ack_reports_offset() {
        // Complex-ACK for ReadProperty cut off inside the property identifier.
        let apdu = [0x30, 0x01, 0x0C, 0x0C, 0x02, 0x00, 0x00, 0x01, 0x19];
        let err = decode(&apdu).unwrap_err();
        assert_eq!(err.kind, DecodeError::UnexpectedEof);
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn offsets_are_relative_to_npdu_start() {
        let bytes = [0x01, 0x00, 0x30, 0x01, 0x0C, 0x0C, 0x02];
        let err = decode_npdu_frame(&bytes).unwrap_err();
        assert_eq!(err.offset, 6);
    }

    #[test]
    fn unknown_service_ack_is_kept_raw() {
        let apdu = [0x30, 0x07, 0x1A, 0xAA, 0xBB];
        assert_eq!(
            decode(&apdu).unwrap(),
            DecodedFrame::ComplexAck {
                invoke_id: 7,
                service: ConfirmedService::Other(0x1A),
                ack: ServiceAck::Raw(vec![0xAA, 0xBB]),
            }
        );
    }

    #[test]
    fn unsupported_pdus_are_unrecognized() {
        for apdu in [
            &[0x10, 0x02, 0x00][..],
            &[0x40, 0x01, 0x00, 0x01],
            &[0x90, 0x00],
        ] {
            assert_eq!(
                decode(apdu).unwrap(),
                DecodedFrame::Unrecognized { raw: apdu.to_vec() }
            );
        }
    }

    #[test]
    fn segmented_ack_keeps_invoke_id() {
        let apdu = [0x38, 0x01, 0x00, 0x04, 0x0C, 0x00];
        let frame = decode(&apdu).unwrap();
        assert_eq!(
            frame,
            DecodedFrame::SegmentedAck {
                invoke_id: 1,
                service: ConfirmedService::ReadProperty,
            }
        );
        assert_eq!(frame.response_invoke_id(), Some(1));
    }

    #[test]
    fn invoke_id_is_readable_from_undecodable_responses() {
        // Complex-ACK for ReadProperty with a charset-5 string value.
        let bytes = [
            0x01, 0x00, 0x30, 0x09, 0x0C, 0x0C, 0x00, 0x80, 0x00, 0x01, 0x19, 0x55, 0x3E, 0x73,
            0x05, 0x41, 0x42, 0x3F,
        ];
        assert!(decode_npdu_frame(&bytes).is_err());
        assert_eq!(peek_response_invoke_id(&bytes), Some(9));

        // Truncated Error PDU.
        assert_eq!(peek_response_invoke_id(&[0x01, 0x00, 0x50, 0x04]), Some(4));
        // Requests and bare headers carry no response invoke ID.
        assert_eq!(peek_response_invoke_id(&[0x01, 0x04, 0x00, 0x05, 0x01, 0x0C]), None);
        assert_eq!(peek_response_invoke_id(&[0x01, 0x00, 0x30]), None);
        assert_eq!(peek_response_invoke_id(&[0x01, 0x80, 0x00]), None);
    }

    #[test]
    fn network_layer_message_is_unrecognized() {
        let bytes = [0x01, 0x80, 0x00, 0x00, 0x01];
        let inbound = decode_npdu_frame(&bytes).unwrap();
        assert!(matches!(inbound.frame, DecodedFrame::Unrecognized { .. }));
    }

    #[test]
    fn trailing_bytes_after_simple_ack_are_malformed() {
        let err = decode(&[0x20, 0x01, 0x0F, 0x00]).unwrap_err();
        assert_eq!(err.kind, DecodeError::TrailingBytes);
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn empty_input_is_malformed_at_zero() {
        let err = decode(&[]).unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn read_property_request_uses_service_twelve() {
        let req = ServiceRequest::ReadProperty(ReadPropertyRequest {
            object_id: ObjectId::device(123),
            property_id: PropertyId::ObjectName,
            array_index: None,
        });
        let bytes = encode(1, &req).unwrap();
        assert_eq!(&bytes[..6], &[0x01, 0x04, 0x00, 0x05, 0x01, 0x0C]);
    }
}
