//! file objects: the content-addressed representation of a regular file or
//! symlink's metadata + payload.
//!
//! the id is always the SHA-256 of the **uncompressed** canonical framing,
//! `BE-u32 header_length || header_record || payload`, regardless of how the
//! payload is actually stored on disk. archive-mode repos zlib-compress the
//! payload when writing the loose object (`.filez`), but that compression
//! happens after id computation and never participates in it.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::codec::{
    decode_xattrs, encode_xattrs, read_be_u32, read_bytes, write_be_u32, write_bytes, write_str,
};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::types::Xattr;
use crate::varint::VarintReader;

/// per-file metadata record: everything about a file except its payload
/// bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub rdev: u32,
    pub symlink_target: Option<String>,
    pub xattrs: Vec<Xattr>,
}

impl FileHeader {
    pub fn regular(uid: u32, gid: u32, mode: u32, xattrs: Vec<Xattr>) -> Self {
        Self {
            uid,
            gid,
            mode,
            rdev: 0,
            symlink_target: None,
            xattrs,
        }
    }

    pub fn symlink(uid: u32, gid: u32, target: impl Into<String>, xattrs: Vec<Xattr>) -> Self {
        Self {
            uid,
            gid,
            mode: 0o120000,
            rdev: 0,
            symlink_target: Some(target.into()),
            xattrs,
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.symlink_target.is_some()
    }

    fn encode_record(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_be_u32(&mut out, self.uid);
        write_be_u32(&mut out, self.gid);
        write_be_u32(&mut out, self.mode);
        write_be_u32(&mut out, self.rdev);
        match &self.symlink_target {
            Some(target) => write_str(&mut out, target),
            None => write_bytes(&mut out, &[]),
        }
        encode_xattrs(&self.xattrs, &mut out);
        out
    }

    fn decode_record(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let uid = read_be_u32(buf, &mut pos)?;
        let gid = read_be_u32(buf, &mut pos)?;
        let mode = read_be_u32(buf, &mut pos)?;
        let rdev = read_be_u32(buf, &mut pos)?;
        let mut reader = VarintReader::new(&buf[pos..]);
        let symlink_bytes = read_bytes(&mut reader)?;
        let symlink_target = if symlink_bytes.is_empty() {
            None
        } else {
            Some(
                String::from_utf8(symlink_bytes)
                    .map_err(|_| Error::InvalidEntryName("symlink target not utf-8".into()))?,
            )
        };
        let xattrs = decode_xattrs(&mut reader)?;
        Ok(Self {
            uid,
            gid,
            mode,
            rdev,
            symlink_target,
            xattrs,
        })
    }
}

/// a file object ready to be hashed and/or written to storage.
pub struct FileObject {
    pub header: FileHeader,
    pub payload: Vec<u8>,
}

impl FileObject {
    pub fn new(header: FileHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// canonical uncompressed framing used for id computation and for
    /// bare/bare-user loose storage.
    pub fn encode_uncompressed(&self) -> Vec<u8> {
        let record = self.header.encode_record();
        let mut out = Vec::with_capacity(4 + record.len() + self.payload.len());
        write_be_u32(&mut out, record.len() as u32);
        out.extend_from_slice(&record);
        out.extend_from_slice(&self.payload);
        out
    }

    /// id is always computed over the uncompressed framing.
    pub fn compute_id(&self) -> Hash {
        Hash::of(&self.encode_uncompressed())
    }

    /// archive-mode on-disk framing: header record is never compressed, only
    /// the payload is, via zlib.
    pub fn encode_archive(&self) -> Result<Vec<u8>> {
        let record = self.header.encode_record();
        let mut compressed = Vec::new();
        {
            let mut enc = ZlibEncoder::new(&mut compressed, Compression::default());
            enc.write_all(&self.payload)
                .map_err(|e| Error::Xattr {
                    path: std::path::PathBuf::new(),
                    message: format!("zlib compression failed: {e}"),
                })?;
        }
        let mut out = Vec::with_capacity(4 + record.len() + compressed.len());
        write_be_u32(&mut out, record.len() as u32);
        out.extend_from_slice(&record);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    pub fn decode_uncompressed(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let header_len = read_be_u32(buf, &mut pos)? as usize;
        let record = buf
            .get(pos..pos + header_len)
            .ok_or(Error::InvalidVarint)?;
        let header = FileHeader::decode_record(record)?;
        let payload = buf[pos + header_len..].to_vec();
        Ok(Self { header, payload })
    }

    pub fn decode_archive(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let header_len = read_be_u32(buf, &mut pos)? as usize;
        let record = buf
            .get(pos..pos + header_len)
            .ok_or(Error::InvalidVarint)?;
        let header = FileHeader::decode_record(record)?;
        let compressed = &buf[pos + header_len..];
        let mut payload = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut payload)
            .map_err(|e| Error::Xattr {
                path: std::path::PathBuf::new(),
                message: format!("zlib decompression failed: {e}"),
            })?;
        Ok(Self { header, payload })
    }
}
