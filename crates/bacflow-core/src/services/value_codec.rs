use alloc::{string::String, vec::Vec};

use crate::encoding::{
    primitives::{
        decode_signed, decode_unsigned, encode_signed, encode_unsigned, signed_len,
        unsigned_len,
    },
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::types::{BitString, Date, ObjectId, PropertyValue, Time};
use crate::{DecodeError, EncodeError};

const CHARSET_UTF8: u8 = 0;

fn content_len(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::ValueOutOfRange)
}

fn app(tag: AppTag, len: u32) -> Tag {
    Tag::Application { tag, len }
}

/// Encodes one value. Lists are written as consecutive items; constructed
/// groups keep their opening/closing tags.
pub fn encode_property_value(w: &mut Writer, value: &PropertyValue) -> Result<(), EncodeError> {
    match value {
        PropertyValue::Null => app(AppTag::Null, 0).encode(w),
        PropertyValue::Boolean(v) => app(AppTag::Boolean, u32::from(*v)).encode(w),
        PropertyValue::Unsigned(v) => {
            app(AppTag::UnsignedInt, unsigned_len(*v) as u32).encode(w)?;
            encode_unsigned(w, *v).map(|_| ())
        }
        PropertyValue::Enumerated(v) => {
            app(AppTag::Enumerated, unsigned_len(*v) as u32).encode(w)?;
            encode_unsigned(w, *v).map(|_| ())
        }
        PropertyValue::Signed(v) => {
            app(AppTag::SignedInt, signed_len(*v) as u32).encode(w)?;
            encode_signed(w, *v).map(|_| ())
        }
        PropertyValue::Real(v) => {
            app(AppTag::Real, 4).encode(w)?;
            w.write_all(&v.to_be_bytes())
        }
        PropertyValue::Double(v) => {
            app(AppTag::Double, 8).encode(w)?;
            w.write_all(&v.to_be_bytes())
        }
        PropertyValue::OctetString(bytes) => {
            app(AppTag::OctetString, content_len(bytes.len())?).encode(w)?;
            w.write_all(bytes)
        }
        PropertyValue::CharacterString(s) => {
            app(AppTag::CharacterString, content_len(s.len() + 1)?).encode(w)?;
            w.write_u8(CHARSET_UTF8)?;
            w.write_all(s.as_bytes())
        }
        PropertyValue::BitString(bits) => {
            if bits.unused_bits > 7 {
                return Err(EncodeError::ValueOutOfRange);
            }
            app(AppTag::BitString, content_len(bits.data.len() + 1)?).encode(w)?;
            w.write_u8(bits.unused_bits)?;
            w.write_all(&bits.data)
        }
        PropertyValue::Date(d) => {
            app(AppTag::Date, 4).encode(w)?;
            w.write_all(&[d.year_since_1900, d.month, d.day, d.weekday])
        }
        PropertyValue::Time(t) => {
            app(AppTag::Time, 4).encode(w)?;
            w.write_all(&[t.hour, t.minute, t.second, t.hundredths])
        }
        PropertyValue::ObjectId(id) => {
            app(AppTag::ObjectId, 4).encode(w)?;
            w.write_be_u32(id.raw())
        }
        PropertyValue::List(items) => items
            .iter()
            .try_for_each(|item| encode_property_value(w, item)),
        PropertyValue::Constructed { tag_num, values } => {
            Tag::Opening { tag_num: *tag_num }.encode(w)?;
            for child in values {
                encode_property_value(w, child)?;
            }
            Tag::Closing { tag_num: *tag_num }.encode(w)
        }
    }
}

pub fn decode_property_value(r: &mut Reader<'_>) -> Result<PropertyValue, DecodeError> {
    let tag = Tag::decode(r)?;
    decode_property_value_from_tag(r, tag)
}

fn fixed<const N: usize>(r: &mut Reader<'_>, len: u32) -> Result<[u8; N], DecodeError> {
    if len as usize != N {
        return Err(DecodeError::InvalidLength);
    }
    r.read_array()
}

pub fn decode_property_value_from_tag(
    r: &mut Reader<'_>,
    tag: Tag,
) -> Result<PropertyValue, DecodeError> {
    let (app_tag, len) = match tag {
        Tag::Application { tag, len } => (tag, len),
        Tag::Opening { tag_num } => {
            return Ok(PropertyValue::Constructed {
                tag_num,
                values: decode_values_until_closing(r, tag_num)?,
            })
        }
        Tag::Context { .. } | Tag::Closing { .. } => return Err(DecodeError::InvalidTag),
    };

    Ok(match app_tag {
        AppTag::Null => PropertyValue::Null,
        AppTag::Boolean => match len {
            0 => PropertyValue::Boolean(false),
            1 => PropertyValue::Boolean(true),
            _ => return Err(DecodeError::InvalidValue),
        },
        AppTag::UnsignedInt => PropertyValue::Unsigned(decode_unsigned(r, len as usize)?),
        AppTag::SignedInt => PropertyValue::Signed(decode_signed(r, len as usize)?),
        AppTag::Enumerated => PropertyValue::Enumerated(decode_unsigned(r, len as usize)?),
        AppTag::Real => PropertyValue::Real(f32::from_be_bytes(fixed(r, len)?)),
        AppTag::Double => PropertyValue::Double(f64::from_be_bytes(fixed(r, len)?)),
        AppTag::OctetString => PropertyValue::OctetString(r.read_exact(len as usize)?.to_vec()),
        AppTag::CharacterString => {
            let raw = r.read_exact(len as usize)?;
            let (charset, text) = raw.split_first().ok_or(DecodeError::InvalidLength)?;
            if *charset != CHARSET_UTF8 {
                return Err(DecodeError::Unsupported);
            }
            let text = core::str::from_utf8(text).map_err(|_| DecodeError::InvalidValue)?;
            PropertyValue::CharacterString(String::from(text))
        }
        AppTag::BitString => {
            let raw = r.read_exact(len as usize)?;
            let (unused, data) = raw.split_first().ok_or(DecodeError::InvalidLength)?;
            if *unused > 7 {
                return Err(DecodeError::InvalidValue);
            }
            PropertyValue::BitString(BitString::new(*unused, data.to_vec()))
        }
        AppTag::Date => {
            let [year_since_1900, month, day, weekday] = fixed(r, len)?;
            PropertyValue::Date(Date {
                year_since_1900,
                month,
                day,
                weekday,
            })
        }
        AppTag::Time => {
            let [hour, minute, second, hundredths] = fixed(r, len)?;
            PropertyValue::Time(Time {
                hour,
                minute,
                second,
                hundredths,
            })
        }
        AppTag::ObjectId => {
            PropertyValue::ObjectId(ObjectId::from_raw(u32::from_be_bytes(fixed(r, len)?)))
        }
    })
}

/// Decodes values up to and including the closing tag `tag_num`.
pub fn decode_values_until_closing(
    r: &mut Reader<'_>,
    tag_num: u8,
) -> Result<Vec<PropertyValue>, DecodeError> {
    let mut values = Vec::new();
    loop {
        match Tag::decode(r)? {
            Tag::Closing { tag_num: n } if n == tag_num => return Ok(values),
            tag => values.push(decode_property_value_from_tag(r, tag)?),
        }
    }
}
