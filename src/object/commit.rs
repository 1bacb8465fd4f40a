//! commit objects: a named point in history committing to a root dir-tree
//! and dir-meta pair, an optional parent, and an opaque metadata dict used
//! by callers to stash arbitrary build/version information.

use std::collections::BTreeMap;

use super::codec::{read_string, write_str};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::varint::{self, VarintReader};

/// one value in a commit's metadata dict. kept intentionally small — this
/// is a carrier for caller-supplied key/value pairs, not a general object
/// model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetaValue {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Bool(bool),
}

const TAG_STR: u8 = 0;
const TAG_BYTES: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_BOOL: u8 = 3;

pub type MetaMap = BTreeMap<String, MetaValue>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub parent: Option<Hash>,
    pub subject: String,
    pub body: String,
    pub timestamp: u64,
    pub root_tree: Hash,
    pub root_meta: Hash,
    pub metadata: MetaMap,
}

impl Commit {
    pub fn new(
        parent: Option<Hash>,
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: u64,
        root_tree: Hash,
        root_meta: Hash,
    ) -> Self {
        Self {
            parent,
            subject: subject.into(),
            body: body.into(),
            timestamp,
            root_tree,
            root_meta,
            metadata: MetaMap::new(),
        }
    }

    pub fn is_merge(&self) -> bool {
        false
    }

    /// the commit's timestamp rendered as an RFC 3339 UTC string, the way a
    /// log viewer would display it. returns the raw unix timestamp as a
    /// fallback string if it somehow falls outside chrono's representable
    /// range.
    pub fn formatted_timestamp(&self) -> String {
        match chrono::DateTime::from_timestamp(self.timestamp as i64, 0) {
            Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            None => self.timestamp.to_string(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.parent {
            Some(p) => {
                out.push(1);
                out.extend_from_slice(p.as_bytes());
            }
            None => out.push(0),
        }
        write_str(&mut out, &self.subject);
        write_str(&mut out, &self.body);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(self.root_tree.as_bytes());
        out.extend_from_slice(self.root_meta.as_bytes());

        varint::encode(self.metadata.len() as u64, &mut out);
        // BTreeMap iterates in key order already, giving canonical ordering.
        for (key, value) in &self.metadata {
            write_str(&mut out, key);
            match value {
                MetaValue::Str(s) => {
                    out.push(TAG_STR);
                    write_str(&mut out, s);
                }
                MetaValue::Bytes(b) => {
                    out.push(TAG_BYTES);
                    crate::object::codec::write_bytes(&mut out, b);
                }
                MetaValue::Int(i) => {
                    out.push(TAG_INT);
                    out.extend_from_slice(&i.to_be_bytes());
                }
                MetaValue::Bool(b) => {
                    out.push(TAG_BOOL);
                    out.push(if *b { 1 } else { 0 });
                }
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let has_parent = *buf.first().ok_or(Error::InvalidVarint)?;
        let mut pos = 1usize;
        let parent = match has_parent {
            0 => None,
            1 => {
                let bytes = buf.get(pos..pos + 32).ok_or(Error::InvalidVarint)?;
                pos += 32;
                let mut arr = [0u8; 32];
                arr.copy_from_slice(bytes);
                Some(Hash::from_bytes(arr))
            }
            other => {
                return Err(Error::InvalidConfig {
                    path: std::path::PathBuf::new(),
                    message: format!("invalid commit parent presence byte {other}"),
                })
            }
        };

        let mut reader = VarintReader::new(&buf[pos..]);
        let subject = read_string(&mut reader)?;
        let body = read_string(&mut reader)?;

        let rest_start = pos + reader.position();
        let timestamp_bytes = buf
            .get(rest_start..rest_start + 8)
            .ok_or(Error::InvalidVarint)?;
        let timestamp = u64::from_be_bytes(timestamp_bytes.try_into().unwrap());
        pos = rest_start + 8;

        let root_tree = read_hash_at(buf, &mut pos)?;
        let root_meta = read_hash_at(buf, &mut pos)?;

        let mut reader = VarintReader::new(&buf[pos..]);
        let meta_count = reader.read_varint()?;
        let mut metadata = MetaMap::new();
        for _ in 0..meta_count {
            let key = read_string(&mut reader)?;
            let tag = reader.read_byte()?;
            let value = match tag {
                TAG_STR => MetaValue::Str(read_string(&mut reader)?),
                TAG_BYTES => MetaValue::Bytes(crate::object::codec::read_bytes(&mut reader)?),
                TAG_INT => {
                    let mut arr = [0u8; 8];
                    for slot in arr.iter_mut() {
                        *slot = reader.read_byte()?;
                    }
                    MetaValue::Int(i64::from_be_bytes(arr))
                }
                TAG_BOOL => MetaValue::Bool(reader.read_byte()? != 0),
                other => {
                    return Err(Error::InvalidConfig {
                        path: std::path::PathBuf::new(),
                        message: format!("unknown commit metadata tag {other}"),
                    })
                }
            };
            metadata.insert(key, value);
        }

        Ok(Self {
            parent,
            subject,
            body,
            timestamp,
            root_tree,
            root_meta,
            metadata,
        })
    }

    pub fn compute_id(&self) -> Hash {
        Hash::of(&self.encode())
    }
}

fn read_hash_at(buf: &[u8], pos: &mut usize) -> Result<Hash> {
    let bytes = buf.get(*pos..*pos + 32).ok_or(Error::InvalidVarint)?;
    *pos += 32;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(bytes);
    Ok(Hash::from_bytes(arr))
}
