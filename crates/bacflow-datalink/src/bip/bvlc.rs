//! BACnet Virtual Link Layer header (Annex J).

use bacflow_core::encoding::{reader::Reader, writer::Writer};
use bacflow_core::{DecodeError, EncodeError};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const BVLC_TYPE_BIP: u8 = 0x81;
pub const BVLC_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvlcFunction {
    Result,
    WriteBroadcastDistributionTable,
    ReadBroadcastDistributionTable,
    ReadBroadcastDistributionTableAck,
    ForwardedNpdu,
    RegisterForeignDevice,
    ReadForeignDeviceTable,
    ReadForeignDeviceTableAck,
    DeleteForeignDeviceTableEntry,
    DistributeBroadcastToNetwork,
    OriginalUnicastNpdu,
    OriginalBroadcastNpdu,
    Unknown(u8),
}

impl BvlcFunction {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Result,
            0x01 => Self::WriteBroadcastDistributionTable,
            0x02 => Self::ReadBroadcastDistributionTable,
            0x03 => Self::ReadBroadcastDistributionTableAck,
            0x04 => Self::ForwardedNpdu,
            0x05 => Self::RegisterForeignDevice,
            0x06 => Self::ReadForeignDeviceTable,
            0x07 => Self::ReadForeignDeviceTableAck,
            0x08 => Self::DeleteForeignDeviceTableEntry,
            0x09 => Self::DistributeBroadcastToNetwork,
            0x0A => Self::OriginalUnicastNpdu,
            0x0B => Self::OriginalBroadcastNpdu,
            v => Self::Unknown(v),
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Result => 0x00,
            Self::WriteBroadcastDistributionTable => 0x01,
            Self::ReadBroadcastDistributionTable => 0x02,
            Self::ReadBroadcastDistributionTableAck => 0x03,
            Self::ForwardedNpdu => 0x04,
            Self::RegisterForeignDevice => 0x05,
            Self::ReadForeignDeviceTable => 0x06,
            Self::ReadForeignDeviceTableAck => 0x07,
            Self::DeleteForeignDeviceTableEntry => 0x08,
            Self::DistributeBroadcastToNetwork => 0x09,
            Self::OriginalUnicastNpdu => 0x0A,
            Self::OriginalBroadcastNpdu => 0x0B,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvlcHeader {
    pub function: BvlcFunction,
    pub length: u16,
}

impl BvlcHeader {
    pub fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(BVLC_TYPE_BIP)?;
        w.write_u8(self.function.to_u8())?;
        w.write_be_u16(self.length)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.read_u8()? != BVLC_TYPE_BIP {
            return Err(DecodeError::InvalidValue);
        }
        let function = BvlcFunction::from_u8(r.read_u8()?);
        let length = r.read_be_u16()?;
        if (length as usize) < BVLC_HEADER_LEN {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { function, length })
    }
}

/// Prefixes `npdu` with a BVLL header for `function`.
pub fn encode_bvll(
    function: BvlcFunction,
    npdu: &[u8],
    limit: usize,
) -> Result<Vec<u8>, EncodeError> {
    let total = BVLC_HEADER_LEN + npdu.len();
    if total > limit || total > usize::from(u16::MAX) {
        return Err(EncodeError::BufferTooSmall);
    }
    let mut w = Writer::with_limit(total);
    BvlcHeader {
        function,
        length: total as u16,
    }
    .encode(&mut w)?;
    w.write_all(npdu)?;
    Ok(w.into_vec())
}

/// An NPDU-carrying BVLL message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvllFrame<'a> {
    pub function: BvlcFunction,
    /// Originating station for Forwarded-NPDU; `None` means the UDP source.
    pub origin: Option<SocketAddr>,
    pub npdu: &'a [u8],
}

impl<'a> BvllFrame<'a> {
    /// Splits a datagram into its BVLL header and the NPDU it carries.
    ///
    /// The header length must match the datagram length exactly.
    pub fn decode(datagram: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(datagram);
        let header = BvlcHeader::decode(&mut r)?;
        if header.length as usize != datagram.len() {
            return Err(DecodeError::InvalidLength);
        }
        let origin = match header.function {
            BvlcFunction::ForwardedNpdu => {
                let ip: [u8; 4] = r.read_array()?;
                let port = r.read_be_u16()?;
                Some(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(ip), port)))
            }
            _ => None,
        };
        Ok(Self {
            function: header.function,
            origin,
            npdu: r.rest(),
        })
    }
}
