//! encoding for the `user.ostreemeta` extended attribute (§3.4, §4.3).
//!
//! bare-user repositories can't chown a checked-in file to its real
//! historical owner without privilege, so the on-disk owner is forced to
//! the invoking process and the true uid/gid/mode/xattr list is stashed
//! here instead, to be recovered later by a privileged checkout or a
//! deployment step that promotes the tree to a bare repo.

use crate::error::Result;
use crate::types::Xattr;
use crate::varint::{self, VarintReader};

use super::codec::{decode_xattrs, encode_xattrs};

pub const XATTR_NAME: &str = "user.ostreemeta";

pub fn encode(uid: u32, gid: u32, mode: u32, xattrs: &[Xattr]) -> Vec<u8> {
    let mut out = Vec::new();
    varint::encode(uid as u64, &mut out);
    varint::encode(gid as u64, &mut out);
    varint::encode(mode as u64, &mut out);
    encode_xattrs(xattrs, &mut out);
    out
}

pub fn decode(bytes: &[u8]) -> Result<(u32, u32, u32, Vec<Xattr>)> {
    let mut reader = VarintReader::new(bytes);
    let uid = reader.read_varint()? as u32;
    let gid = reader.read_varint()? as u32;
    let mode = reader.read_varint()? as u32;
    let xattrs = decode_xattrs(&mut reader)?;
    Ok((uid, gid, mode, xattrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let xattrs = vec![Xattr {
            name: "security.selinux".to_string(),
            value: b"system_u:object_r:etc_t:s0".to_vec(),
        }];
        let encoded = encode(1000, 1000, 0o100644, &xattrs);
        let (uid, gid, mode, decoded_xattrs) = decode(&encoded).unwrap();
        assert_eq!((uid, gid, mode), (1000, 1000, 0o100644));
        assert_eq!(decoded_xattrs, xattrs);
    }

    #[test]
    fn test_roundtrip_no_xattrs() {
        let encoded = encode(0, 0, 0o100600, &[]);
        let (uid, gid, mode, xattrs) = decode(&encoded).unwrap();
        assert_eq!((uid, gid, mode), (0, 0, 0o100600));
        assert!(xattrs.is_empty());
    }
}
