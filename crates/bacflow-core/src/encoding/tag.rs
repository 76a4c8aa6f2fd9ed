use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

const CONTEXT_CLASS: u8 = 0b0000_1000;
const EXTENDED_TAG: u8 = 0x0F;
const EXTENDED_LENGTH: u8 = 5;
const OPENING: u8 = 6;
const CLOSING: u8 = 7;

/// Application tag numbers 0..=12. Numbers 13..=15 are reserved and rejected.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AppTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectId = 12,
}

impl AppTag {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        Ok(match value {
            0 => Self::Null,
            1 => Self::Boolean,
            2 => Self::UnsignedInt,
            3 => Self::SignedInt,
            4 => Self::Real,
            5 => Self::Double,
            6 => Self::OctetString,
            7 => Self::CharacterString,
            8 => Self::BitString,
            9 => Self::Enumerated,
            10 => Self::Date,
            11 => Self::Time,
            12 => Self::ObjectId,
            _ => return Err(DecodeError::InvalidTag),
        })
    }
}

/// One decoded tag octet group (initial octet plus any extension octets).
///
/// `len` is the length/value/type field: for application booleans it carries
/// the value itself, otherwise the number of content octets that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Application { tag: AppTag, len: u32 },
    Context { tag_num: u8, len: u32 },
    Opening { tag_num: u8 },
    Closing { tag_num: u8 },
}

impl Tag {
    pub fn encode(self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Tag::Application { tag, len } => write_header(w, tag as u8, false, Lvt::Length(len)),
            Tag::Context { tag_num, len } => write_header(w, tag_num, true, Lvt::Length(len)),
            Tag::Opening { tag_num } => write_header(w, tag_num, true, Lvt::Opening),
            Tag::Closing { tag_num } => write_header(w, tag_num, true, Lvt::Closing),
        }
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let initial = r.read_u8()?;
        let context = initial & CONTEXT_CLASS != 0;
        let tag_num = match initial >> 4 {
            EXTENDED_TAG => r.read_u8()?,
            n => n,
        };
        let lvt = initial & 0x07;

        if context {
            match lvt {
                OPENING => return Ok(Tag::Opening { tag_num }),
                CLOSING => return Ok(Tag::Closing { tag_num }),
                _ => {}
            }
        }

        let len = read_length(r, lvt)?;
        if context {
            Ok(Tag::Context { tag_num, len })
        } else {
            Ok(Tag::Application {
                tag: AppTag::from_u8(tag_num)?,
                len,
            })
        }
    }

    /// Consumes an opening tag with the given number.
    pub fn expect_opening(r: &mut Reader<'_>, tag_num: u8) -> Result<(), DecodeError> {
        match Tag::decode(r)? {
            Tag::Opening { tag_num: n } if n == tag_num => Ok(()),
            _ => Err(DecodeError::InvalidTag),
        }
    }

    /// Consumes a closing tag with the given number.
    pub fn expect_closing(r: &mut Reader<'_>, tag_num: u8) -> Result<(), DecodeError> {
        match Tag::decode(r)? {
            Tag::Closing { tag_num: n } if n == tag_num => Ok(()),
            _ => Err(DecodeError::InvalidTag),
        }
    }

    /// Decodes the next tag without consuming it.
    pub fn peek(r: &Reader<'_>) -> Result<Self, DecodeError> {
        let mut probe = *r;
        Tag::decode(&mut probe)
    }
}

enum Lvt {
    Length(u32),
    Opening,
    Closing,
}

fn write_header(w: &mut Writer, tag_num: u8, context: bool, lvt: Lvt) -> Result<(), EncodeError> {
    let extended = tag_num >= EXTENDED_TAG;
    let mut initial = if extended {
        EXTENDED_TAG << 4
    } else {
        tag_num << 4
    };
    if context {
        initial |= CONTEXT_CLASS;
    }

    let long_len = match lvt {
        Lvt::Opening => {
            initial |= OPENING;
            None
        }
        Lvt::Closing => {
            initial |= CLOSING;
            None
        }
        Lvt::Length(len) if len <= 4 => {
            initial |= len as u8;
            None
        }
        Lvt::Length(len) => {
            initial |= EXTENDED_LENGTH;
            Some(len)
        }
    };

    w.write_u8(initial)?;
    if extended {
        w.write_u8(tag_num)?;
    }
    match long_len {
        None => Ok(()),
        Some(len @ 0..=253) => w.write_u8(len as u8),
        Some(len @ 254..=0xFFFF) => {
            w.write_u8(254)?;
            w.write_be_u16(len as u16)
        }
        Some(len) => {
            w.write_u8(255)?;
            w.write_be_u32(len)
        }
    }
}

fn read_length(r: &mut Reader<'_>, lvt: u8) -> Result<u32, DecodeError> {
    match lvt {
        0..=4 => Ok(lvt as u32),
        EXTENDED_LENGTH => match r.read_u8()? {
            254 => Ok(r.read_be_u16()? as u32),
            255 => r.read_be_u32(),
            short => Ok(short as u32),
        },
        _ => Err(DecodeError::InvalidLength),
    }
}
