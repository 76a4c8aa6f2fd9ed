/// Confirmed request header and the responses a confirmed request can get.
pub mod confirmed;
/// First-octet PDU type.
pub mod pdu;
/// Unconfirmed request header.
pub mod unconfirmed;

pub use confirmed::{
    AbortPdu, ComplexAckHeader, ConfirmedRequestHeader, ErrorPdu, RejectPdu, SimpleAck,
};
pub use pdu::ApduType;
pub use unconfirmed::UnconfirmedRequestHeader;
