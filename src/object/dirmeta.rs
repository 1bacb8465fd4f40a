//! dir-meta objects: the ownership/permission/xattr record shared by a
//! directory and its dir-tree listing. kept as a distinct object (rather
//! than folded into dir-tree) so that unchanged directory metadata across
//! commits reuses the same object id.

use super::codec::{decode_xattrs, encode_xattrs, read_be_u32, write_be_u32};
use crate::error::Result;
use crate::hash::Hash;
use crate::types::Xattr;
use crate::varint::VarintReader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub xattrs: Vec<Xattr>,
}

impl DirMeta {
    pub fn new(uid: u32, gid: u32, mode: u32, xattrs: Vec<Xattr>) -> Self {
        Self {
            uid,
            gid,
            mode,
            xattrs,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_be_u32(&mut out, self.uid);
        write_be_u32(&mut out, self.gid);
        write_be_u32(&mut out, self.mode);
        encode_xattrs(&self.xattrs, &mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let uid = read_be_u32(buf, &mut pos)?;
        let gid = read_be_u32(buf, &mut pos)?;
        let mode = read_be_u32(buf, &mut pos)?;
        let mut reader = VarintReader::new(&buf[pos..]);
        let xattrs = decode_xattrs(&mut reader)?;
        Ok(Self {
            uid,
            gid,
            mode,
            xattrs,
        })
    }

    pub fn compute_id(&self) -> Hash {
        Hash::of(&self.encode())
    }
}
