//! canonical object model: the four content-addressed object kinds plus
//! the supplementary tombstone-commit and detached-commit-metadata tags.
//!
//! every object id is the SHA-256 of a canonical, uncompressed
//! serialization of that object. on-disk compression (zlib payloads for
//! file objects in archive mode) never changes the id it was computed
//! under — see [`file::FileObject`].

mod codec;
mod commit;
mod dirmeta;
mod dirtree;
mod file;
mod ostreemeta;

pub use codec::{decode_xattrs, encode_xattrs};
pub use commit::{Commit, MetaValue};
pub use dirmeta::DirMeta;
pub use dirtree::{DirEntry, DirTree, FileEntry};
pub use file::{FileHeader, FileObject};
pub use ostreemeta::{decode as decode_ostreemeta, encode as encode_ostreemeta, XATTR_NAME as OSTREEMETA_XATTR_NAME};

/// wire tag values for the object kinds this store knows about (§6.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    DirTree,
    DirMeta,
    File,
    TombstoneCommit,
    CommitDetachedMeta,
}

impl ObjectType {
    pub fn tag(self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::DirTree => 2,
            ObjectType::DirMeta => 3,
            ObjectType::File => 4,
            ObjectType::TombstoneCommit => 5,
            ObjectType::CommitDetachedMeta => 6,
        }
    }

    pub fn from_tag(tag: u8) -> crate::Result<Self> {
        Ok(match tag {
            1 => ObjectType::Commit,
            2 => ObjectType::DirTree,
            3 => ObjectType::DirMeta,
            4 => ObjectType::File,
            5 => ObjectType::TombstoneCommit,
            6 => ObjectType::CommitDetachedMeta,
            _ => return Err(crate::Error::InvalidObjectType(tag)),
        })
    }

    /// true for commit/dirtree/dirmeta — objects stored as metadata rather
    /// than as content streams.
    pub fn is_meta(self) -> bool {
        !matches!(self, ObjectType::File)
    }

    /// filename extension used in the loose object store (§3.3).
    pub fn loose_ext(self, compressed: bool) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::DirTree => "dirtree",
            ObjectType::DirMeta => "dirmeta",
            ObjectType::File => {
                if compressed {
                    "filez"
                } else {
                    "file"
                }
            }
            ObjectType::TombstoneCommit => "commit-tombstone",
            ObjectType::CommitDetachedMeta => "commitmeta",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectType::Commit => "commit",
            ObjectType::DirTree => "dirtree",
            ObjectType::DirMeta => "dirmeta",
            ObjectType::File => "file",
            ObjectType::TombstoneCommit => "tombstone-commit",
            ObjectType::CommitDetachedMeta => "commit-detached-metadata",
        };
        write!(f, "{s}")
    }
}
