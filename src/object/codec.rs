//! shared canonical-encoding primitives used by every object kind.
//!
//! fixed-width fields (uid, gid, mode, rdev, timestamps) are big-endian;
//! variable-length fields (names, symlink targets, xattr values) are
//! varint-length-prefixed. xattr lists are always sorted by name before
//! encoding so two semantically identical sets serialize identically.

use crate::error::{Error, Result};
use crate::types::Xattr;
use crate::varint::{self, VarintReader};

pub fn write_be_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_be_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn read_be_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = buf.get(*pos..*pos + 4).ok_or(Error::TruncatedObject(crate::Hash::ZERO))?;
    *pos += 4;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

pub fn read_be_u64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let bytes = buf.get(*pos..*pos + 8).ok_or(Error::TruncatedObject(crate::Hash::ZERO))?;
    *pos += 8;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}

/// write a varint-length-prefixed byte string.
pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    varint::encode(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

pub fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

/// read a varint-length-prefixed byte string, advancing `reader`.
pub fn read_bytes(reader: &mut VarintReader<'_>) -> Result<Vec<u8>> {
    let len = reader.read_varint()? as usize;
    let mut buf = vec![0u8; len];
    for slot in buf.iter_mut() {
        *slot = reader.read_byte()?;
    }
    Ok(buf)
}

pub fn read_string(reader: &mut VarintReader<'_>) -> Result<String> {
    let bytes = read_bytes(reader)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidEntryName("invalid utf-8".into()))
}

/// encode an xattr list, sorted by name, as
/// `varint count || (varint name_len, name, varint value_len, value)*`.
pub fn encode_xattrs(xattrs: &[Xattr], out: &mut Vec<u8>) {
    let mut sorted: Vec<&Xattr> = xattrs.iter().collect();
    sorted.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    varint::encode(sorted.len() as u64, out);
    for x in sorted {
        write_str(out, &x.name);
        write_bytes(out, &x.value);
    }
}

pub fn decode_xattrs(reader: &mut VarintReader<'_>) -> Result<Vec<Xattr>> {
    let count = reader.read_varint()?;
    let mut xattrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_string(reader)?;
        let value = read_bytes(reader)?;
        xattrs.push(Xattr { name, value });
    }
    Ok(xattrs)
}
