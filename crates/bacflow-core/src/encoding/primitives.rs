use crate::encoding::{
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::types::ObjectId;
use crate::{DecodeError, EncodeError};

/// Minimal number of octets needed to carry `value`.
pub const fn unsigned_len(value: u32) -> usize {
    match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Minimal number of two's-complement octets needed to carry `value`.
pub const fn signed_len(value: i32) -> usize {
    match value {
        -128..=127 => 1,
        -32_768..=32_767 => 2,
        -8_388_608..=8_388_607 => 3,
        _ => 4,
    }
}

pub fn encode_unsigned(w: &mut Writer, value: u32) -> Result<usize, EncodeError> {
    let len = unsigned_len(value);
    w.write_all(&value.to_be_bytes()[4 - len..])?;
    Ok(len)
}

pub fn decode_unsigned(r: &mut Reader<'_>, len: usize) -> Result<u32, DecodeError> {
    if !(1..=4).contains(&len) {
        return Err(DecodeError::InvalidLength);
    }
    Ok(r
        .read_exact(len)?
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | *b as u32))
}

pub fn encode_signed(w: &mut Writer, value: i32) -> Result<usize, EncodeError> {
    let len = signed_len(value);
    w.write_all(&value.to_be_bytes()[4 - len..])?;
    Ok(len)
}

pub fn decode_signed(r: &mut Reader<'_>, len: usize) -> Result<i32, DecodeError> {
    if !(1..=4).contains(&len) {
        return Err(DecodeError::InvalidLength);
    }
    let bytes = r.read_exact(len)?;
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut out = [fill; 4];
    out[4 - len..].copy_from_slice(bytes);
    Ok(i32::from_be_bytes(out))
}

fn encode_tagged_unsigned(w: &mut Writer, tag: Tag, value: u32) -> Result<(), EncodeError> {
    tag.encode(w)?;
    encode_unsigned(w, value).map(|_| ())
}

pub fn encode_app_unsigned(w: &mut Writer, value: u32) -> Result<(), EncodeError> {
    let len = unsigned_len(value) as u32;
    encode_tagged_unsigned(
        w,
        Tag::Application {
            tag: AppTag::UnsignedInt,
            len,
        },
        value,
    )
}

pub fn encode_app_enumerated(w: &mut Writer, value: u32) -> Result<(), EncodeError> {
    let len = unsigned_len(value) as u32;
    encode_tagged_unsigned(
        w,
        Tag::Application {
            tag: AppTag::Enumerated,
            len,
        },
        value,
    )
}

pub fn encode_app_object_id(w: &mut Writer, object_id: ObjectId) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::ObjectId,
        len: 4,
    }
    .encode(w)?;
    w.write_be_u32(object_id.raw())
}

pub fn encode_ctx_unsigned(w: &mut Writer, tag_num: u8, value: u32) -> Result<(), EncodeError> {
    let len = unsigned_len(value) as u32;
    encode_tagged_unsigned(w, Tag::Context { tag_num, len }, value)
}

pub fn encode_ctx_object_id(
    w: &mut Writer,
    tag_num: u8,
    object_id: ObjectId,
) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 4 }.encode(w)?;
    w.write_be_u32(object_id.raw())
}

fn decode_app_unsigned_like(r: &mut Reader<'_>, expected: AppTag) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application { tag, len } if tag == expected => decode_unsigned(r, len as usize),
        _ => Err(DecodeError::InvalidTag),
    }
}

pub fn decode_app_unsigned(r: &mut Reader<'_>) -> Result<u32, DecodeError> {
    decode_app_unsigned_like(r, AppTag::UnsignedInt)
}

pub fn decode_app_enumerated(r: &mut Reader<'_>) -> Result<u32, DecodeError> {
    decode_app_unsigned_like(r, AppTag::Enumerated)
}

pub fn decode_app_object_id(r: &mut Reader<'_>) -> Result<ObjectId, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::ObjectId,
            len: 4,
        } => Ok(ObjectId::from_raw(r.read_be_u32()?)),
        _ => Err(DecodeError::InvalidTag),
    }
}

/// Decodes a context-tagged unsigned that must be present with `tag_num`.
pub fn decode_ctx_unsigned(r: &mut Reader<'_>, tag_num: u8) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Context { tag_num: n, len } if n == tag_num => decode_unsigned(r, len as usize),
        _ => Err(DecodeError::InvalidTag),
    }
}

/// Decodes a context-tagged unsigned only when the next tag is `tag_num`.
pub fn decode_optional_ctx_unsigned(
    r: &mut Reader<'_>,
    tag_num: u8,
) -> Result<Option<u32>, DecodeError> {
    if r.is_empty() {
        return Ok(None);
    }
    match Tag::peek(r)? {
        Tag::Context { tag_num: n, .. } if n == tag_num => {
            decode_ctx_unsigned(r, tag_num).map(Some)
        }
        _ => Ok(None),
    }
}

pub fn decode_ctx_object_id(r: &mut Reader<'_>, tag_num: u8) -> Result<ObjectId, DecodeError> {
    match Tag::decode(r)? {
        Tag::Context { tag_num: n, len: 4 } if n == tag_num => {
            Ok(ObjectId::from_raw(r.read_be_u32()?))
        }
        Tag::Context { tag_num: n, .. } if n == tag_num => Err(DecodeError::InvalidLength),
        _ => Err(DecodeError::InvalidTag),
    }
}
