use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// BACnet network protocol version.
pub const NPDU_VERSION: u8 = 0x01;

const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
const CONTROL_DESTINATION: u8 = 0x20;
const CONTROL_SOURCE: u8 = 0x08;
const CONTROL_EXPECTING_REPLY: u8 = 0x04;
const CONTROL_PRIORITY_MASK: u8 = 0x03;

/// Routed address: network number plus a MAC of up to six octets.
///
/// An empty MAC in a destination means "broadcast on that network".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NpduAddress {
    pub network: u16,
    mac: [u8; 6],
    mac_len: u8,
}

impl NpduAddress {
    /// Returns `None` when `mac` is longer than six octets.
    pub fn new(network: u16, mac: &[u8]) -> Option<Self> {
        if mac.len() > 6 {
            return None;
        }
        let mut buf = [0u8; 6];
        buf[..mac.len()].copy_from_slice(mac);
        Some(Self {
            network,
            mac: buf,
            mac_len: mac.len() as u8,
        })
    }

    pub fn mac(&self) -> &[u8] {
        &self.mac[..self.mac_len as usize]
    }

    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_be_u16(self.network)?;
        w.write_u8(self.mac_len)?;
        w.write_all(self.mac())
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let network = r.read_be_u16()?;
        let len = r.read_u8()? as usize;
        if len > 6 {
            return Err(DecodeError::InvalidLength);
        }
        let mac = r.read_exact(len)?;
        Self::new(network, mac).ok_or(DecodeError::InvalidLength)
    }
}

/// Network-layer message carried instead of an APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkMessage {
    pub message_type: u8,
    pub vendor_id: Option<u16>,
}

/// NPDU header. The control octet is derived from the fields on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Npdu {
    pub expecting_reply: bool,
    pub priority: u8,
    pub destination: Option<NpduAddress>,
    pub source: Option<NpduAddress>,
    pub hop_count: Option<u8>,
    pub network_message: Option<NetworkMessage>,
}

impl Npdu {
    /// Local, normal-priority header for an unconfirmed request or response.
    pub const fn local() -> Self {
        Self {
            expecting_reply: false,
            priority: 0,
            destination: None,
            source: None,
            hop_count: None,
            network_message: None,
        }
    }

    /// Header for a confirmed request, optionally routed to `destination`.
    pub fn confirmed(destination: Option<NpduAddress>) -> Self {
        Self {
            expecting_reply: true,
            destination,
            ..Self::local()
        }
    }

    /// Routed header for a unicast or broadcast to `destination`.
    pub fn routed(destination: Option<NpduAddress>) -> Self {
        Self {
            destination,
            ..Self::local()
        }
    }

    pub fn control(&self) -> u8 {
        let mut control = self.priority & CONTROL_PRIORITY_MASK;
        if self.network_message.is_some() {
            control |= CONTROL_NETWORK_MESSAGE;
        }
        if self.destination.is_some() {
            control |= CONTROL_DESTINATION;
        }
        if self.source.is_some() {
            control |= CONTROL_SOURCE;
        }
        if self.expecting_reply {
            control |= CONTROL_EXPECTING_REPLY;
        }
        control
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(NPDU_VERSION)?;
        w.write_u8(self.control())?;
        if let Some(dest) = &self.destination {
            dest.encode(w)?;
        }
        if let Some(src) = &self.source {
            src.encode(w)?;
        }
        if self.destination.is_some() {
            w.write_u8(self.hop_count.unwrap_or(255))?;
        }
        if let Some(msg) = self.network_message {
            w.write_u8(msg.message_type)?;
            if msg.message_type >= 0x80 {
                w.write_be_u16(msg.vendor_id.unwrap_or(0))?;
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.read_u8()? != NPDU_VERSION {
            return Err(DecodeError::InvalidValue);
        }
        let control = r.read_u8()?;
        let destination = if control & CONTROL_DESTINATION != 0 {
            Some(NpduAddress::decode(r)?)
        } else {
            None
        };
        let source = if control & CONTROL_SOURCE != 0 {
            Some(NpduAddress::decode(r)?)
        } else {
            None
        };
        let hop_count = if destination.is_some() {
            Some(r.read_u8()?)
        } else {
            None
        };
        let network_message = if control & CONTROL_NETWORK_MESSAGE != 0 {
            let message_type = r.read_u8()?;
            let vendor_id = if message_type >= 0x80 {
                Some(r.read_be_u16()?)
            } else {
                None
            };
            Some(NetworkMessage {
                message_type,
                vendor_id,
            })
        } else {
            None
        };

        Ok(Self {
            expecting_reply: control & CONTROL_EXPECTING_REPLY != 0,
            priority: control & CONTROL_PRIORITY_MASK,
            destination,
            source,
            hop_count,
            network_message,
        })
    }
}
