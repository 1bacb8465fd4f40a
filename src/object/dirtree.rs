//! dir-tree objects: the ordered listing of a directory's file and
//! subdirectory entries. entries are sorted by name so that two directories
//! with the same content produce byte-identical (and therefore
//! id-identical) trees regardless of the order entries were staged in.

use super::codec::{read_string, write_str};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::varint::{self, VarintReader};

/// a regular file or symlink entry: name plus the checksum of its file
/// object (which itself commits to the file's own metadata and payload).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub checksum: Hash,
}

/// a subdirectory entry: name plus the checksums of its dir-tree and
/// dir-meta objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub tree_checksum: Hash,
    pub meta_checksum: Hash,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirTree {
    pub files: Vec<FileEntry>,
    pub dirs: Vec<DirEntry>,
}

impl DirTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// insert or replace a file entry, keeping `files` sorted by name.
    pub fn insert_file(&mut self, name: impl Into<String>, checksum: Hash) -> Result<()> {
        let name = name.into();
        validate_entry_name(&name)?;
        match self.files.binary_search_by(|e| e.name.as_str().cmp(name.as_str())) {
            Ok(i) => self.files[i].checksum = checksum,
            Err(i) => self.files.insert(i, FileEntry { name, checksum }),
        }
        Ok(())
    }

    pub fn insert_dir(
        &mut self,
        name: impl Into<String>,
        tree_checksum: Hash,
        meta_checksum: Hash,
    ) -> Result<()> {
        let name = name.into();
        validate_entry_name(&name)?;
        match self.dirs.binary_search_by(|e| e.name.as_str().cmp(name.as_str())) {
            Ok(i) => {
                self.dirs[i].tree_checksum = tree_checksum;
                self.dirs[i].meta_checksum = meta_checksum;
            }
            Err(i) => self.dirs.insert(
                i,
                DirEntry {
                    name,
                    tree_checksum,
                    meta_checksum,
                },
            ),
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        varint::encode(self.files.len() as u64, &mut out);
        for f in &self.files {
            write_str(&mut out, &f.name);
            out.extend_from_slice(f.checksum.as_bytes());
        }
        varint::encode(self.dirs.len() as u64, &mut out);
        for d in &self.dirs {
            write_str(&mut out, &d.name);
            out.extend_from_slice(d.tree_checksum.as_bytes());
            out.extend_from_slice(d.meta_checksum.as_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = VarintReader::new(buf);
        let file_count = reader.read_varint()?;
        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let name = read_string(&mut reader)?;
            files.push(FileEntry {
                name,
                checksum: read_hash(&mut reader)?,
            });
        }
        let dir_count = reader.read_varint()?;
        let mut dirs = Vec::with_capacity(dir_count as usize);
        for _ in 0..dir_count {
            let name = read_string(&mut reader)?;
            let tree_checksum = read_hash(&mut reader)?;
            let meta_checksum = read_hash(&mut reader)?;
            dirs.push(DirEntry {
                name,
                tree_checksum,
                meta_checksum,
            });
        }
        Ok(Self { files, dirs })
    }

    pub fn compute_id(&self) -> Hash {
        Hash::of(&self.encode())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

fn read_hash(reader: &mut VarintReader<'_>) -> Result<Hash> {
    let mut arr = [0u8; 32];
    for slot in arr.iter_mut() {
        *slot = reader.read_byte()?;
    }
    Ok(Hash::from_bytes(arr))
}

fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::InvalidEntryName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash {
        Hash::from_bytes([byte; 32])
    }

    #[test]
    fn test_entries_stay_sorted_regardless_of_insertion_order() {
        let mut t = DirTree::new();
        t.insert_file("zeta", h(1)).unwrap();
        t.insert_file("alpha", h(2)).unwrap();
        t.insert_file("mid", h(3)).unwrap();
        let names: Vec<&str> = t.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_roundtrip() {
        let mut t = DirTree::new();
        t.insert_file("a.txt", h(1)).unwrap();
        t.insert_dir("sub", h(2), h(3)).unwrap();
        let encoded = t.encode();
        let decoded = DirTree::decode(&encoded).unwrap();
        assert_eq!(t, decoded);
    }

    #[test]
    fn test_insertion_order_does_not_affect_id() {
        let mut a = DirTree::new();
        a.insert_file("b", h(1)).unwrap();
        a.insert_file("a", h(2)).unwrap();

        let mut b = DirTree::new();
        b.insert_file("a", h(2)).unwrap();
        b.insert_file("b", h(1)).unwrap();

        assert_eq!(a.compute_id(), b.compute_id());
    }

    #[test]
    fn test_rejects_path_separator_in_name() {
        let mut t = DirTree::new();
        assert!(t.insert_file("a/b", h(1)).is_err());
    }

    #[test]
    fn test_rejects_dot_entries() {
        let mut t = DirTree::new();
        assert!(t.insert_dir(".", h(1), h(2)).is_err());
        assert!(t.insert_dir("..", h(1), h(2)).is_err());
    }
}
