//! wire format for static deltas (§4.5): a superblock describing the whole
//! delta plus one or more parts, each an independently-checksummed opcode
//! stream.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{MetaValue, ObjectType};
use crate::varint::{self, VarintReader};

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    varint::encode(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

/// one of the seven opcodes a delta part's instruction stream can contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// open a new output object of a given kind and expected size, without
    /// writing content yet.
    Open = 0,
    /// write literal bytes (inline in the part) into the currently open
    /// output.
    Write = 1,
    /// open an output, write an inline splice, and close it in one step —
    /// the common case for small objects that don't benefit from bsdiff.
    OpenSpliceClose = 2,
    /// point subsequent reads at an existing local object instead of the
    /// part's inline data (used so bspatch can read its source object).
    SetReadSource = 3,
    /// clear a previously set read source.
    UnsetReadSource = 4,
    /// apply a bspatch diff, read from the part's inline data, against the
    /// current read source, appending the result into the currently open
    /// output.
    Bspatch = 5,
    /// finalize the currently open output, verify it against the expected
    /// object id, and hand it to the store.
    Close = 6,
}

impl Opcode {
    pub fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => Opcode::Open,
            1 => Opcode::Write,
            2 => Opcode::OpenSpliceClose,
            3 => Opcode::SetReadSource,
            4 => Opcode::UnsetReadSource,
            5 => Opcode::Bspatch,
            6 => Opcode::Close,
            other => return Err(Error::InvalidOpcode(other)),
        })
    }
}

/// one instruction in a part's opcode stream.
#[derive(Clone, Debug)]
pub enum Instruction {
    Open { kind: ObjectType, size: u64 },
    Write { data: Vec<u8> },
    OpenSpliceClose {
        kind: ObjectType,
        object_id: Hash,
        data: Vec<u8>,
    },
    SetReadSource { kind: ObjectType, object_id: Hash },
    UnsetReadSource,
    Bspatch { patch: Vec<u8> },
    Close { object_id: Hash },
}

impl Instruction {
    fn opcode(&self) -> Opcode {
        match self {
            Instruction::Open { .. } => Opcode::Open,
            Instruction::Write { .. } => Opcode::Write,
            Instruction::OpenSpliceClose { .. } => Opcode::OpenSpliceClose,
            Instruction::SetReadSource { .. } => Opcode::SetReadSource,
            Instruction::UnsetReadSource => Opcode::UnsetReadSource,
            Instruction::Bspatch { .. } => Opcode::Bspatch,
            Instruction::Close { .. } => Opcode::Close,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match self {
            Instruction::Open { kind, size } => {
                out.push(kind.tag());
                varint::encode(*size, out);
            }
            Instruction::Write { data } => write_bytes(out, data),
            Instruction::OpenSpliceClose {
                kind,
                object_id,
                data,
            } => {
                out.push(kind.tag());
                out.extend_from_slice(object_id.as_bytes());
                write_bytes(out, data);
            }
            Instruction::SetReadSource { kind, object_id } => {
                out.push(kind.tag());
                out.extend_from_slice(object_id.as_bytes());
            }
            Instruction::UnsetReadSource => {}
            Instruction::Bspatch { patch } => write_bytes(out, patch),
            Instruction::Close { object_id } => out.extend_from_slice(object_id.as_bytes()),
        }
    }

    fn decode(reader: &mut VarintReader<'_>) -> Result<Self> {
        let op = Opcode::from_byte(reader.read_byte()?)?;
        Ok(match op {
            Opcode::Open => Instruction::Open {
                kind: read_kind(reader)?,
                size: reader.read_varint()?,
            },
            Opcode::Write => Instruction::Write {
                data: read_blob(reader)?,
            },
            Opcode::OpenSpliceClose => {
                let kind = read_kind(reader)?;
                let object_id = read_hash(reader)?;
                let data = read_blob(reader)?;
                Instruction::OpenSpliceClose {
                    kind,
                    object_id,
                    data,
                }
            }
            Opcode::SetReadSource => Instruction::SetReadSource {
                kind: read_kind(reader)?,
                object_id: read_hash(reader)?,
            },
            Opcode::UnsetReadSource => Instruction::UnsetReadSource,
            Opcode::Bspatch => Instruction::Bspatch {
                patch: read_blob(reader)?,
            },
            Opcode::Close => Instruction::Close {
                object_id: read_hash(reader)?,
            },
        })
    }
}

fn read_kind(reader: &mut VarintReader<'_>) -> Result<ObjectType> {
    ObjectType::from_tag(reader.read_byte()?)
}

fn read_blob(reader: &mut VarintReader<'_>) -> Result<Vec<u8>> {
    let len = reader.read_varint()? as usize;
    let mut buf = vec![0u8; len];
    for slot in buf.iter_mut() {
        *slot = reader.read_byte()?;
    }
    Ok(buf)
}

fn read_hash(reader: &mut VarintReader<'_>) -> Result<Hash> {
    let mut arr = [0u8; 32];
    for slot in arr.iter_mut() {
        *slot = reader.read_byte()?;
    }
    Ok(Hash::from_bytes(arr))
}

/// one part of a delta: an independently checksummed instruction stream,
/// optionally LZMA-compressed on disk.
#[derive(Clone, Debug)]
pub struct DeltaPart {
    pub instructions: Vec<Instruction>,
}

impl DeltaPart {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        varint::encode(self.instructions.len() as u64, &mut out);
        for instr in &self.instructions {
            instr.encode(&mut out);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = VarintReader::new(buf);
        let count = reader.read_varint()?;
        let mut instructions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            instructions.push(Instruction::decode(&mut reader)?);
        }
        Ok(Self { instructions })
    }

    pub fn checksum(&self) -> Hash {
        Hash::of(&self.encode())
    }
}

/// byte order the part's multi-byte integers were produced in. static
/// deltas can be generated on one architecture and applied on another; the
/// heuristic is: try the claimed endianness first, and if the instruction
/// count it implies runs past the end of the part body, assume the part
/// was swapped and retry with the opposite endianness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn other(self) -> Self {
        match self {
            Endianness::Little => Endianness::Big,
            Endianness::Big => Endianness::Little,
        }
    }

    fn encode_u64(self, v: u64) -> [u8; 8] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    fn decode_u64(self, b: [u8; 8]) -> u64 {
        match self {
            Endianness::Little => u64::from_le_bytes(b),
            Endianness::Big => u64::from_be_bytes(b),
        }
    }

    fn encode_i64(self, v: i64) -> [u8; 8] {
        self.encode_u64(v as u64)
    }

    fn decode_i64(self, b: [u8; 8]) -> i64 {
        self.decode_u64(b) as i64
    }
}

/// a superblock's 8-byte timestamp is implausible past this point (roughly
/// year 2100); used to detect a part generated on a foreign-endian host per
/// the format's endianness-detection heuristic.
const PLAUSIBLE_TIMESTAMP_MAX: u64 = 4_102_444_800;

/// resolve the byte order a superblock's fixed-width integers were actually
/// written in. tries the declared endianness first; if the timestamp it
/// implies is absurd, assumes the generating host's claim was wrong (or the
/// bytes were swapped in transit) and retries with the opposite order.
/// returns the decoded timestamp, the endianness that produced it, and
/// whether a swap was needed.
fn resolve_endianness(raw_timestamp: [u8; 8], declared: Endianness) -> (u64, Endianness, bool) {
    let primary = declared.decode_u64(raw_timestamp);
    if primary <= PLAUSIBLE_TIMESTAMP_MAX {
        return (primary, declared, false);
    }
    let swapped = declared.other();
    (swapped.decode_u64(raw_timestamp), swapped, true)
}

/// the superblock describing an entire delta between two commits.
pub struct Superblock {
    pub metadata: std::collections::BTreeMap<String, MetaValue>,
    pub timestamp: u64,
    pub from_commit: Option<Hash>,
    pub to_commit: Hash,
    /// the serialized `to` commit object, inlined so an offline apply never
    /// needs to fetch it separately.
    pub to_commit_object: Vec<u8>,
    /// checksums of ancestor deltas this one builds on, oldest first
    /// (empty for a delta generated against the immediate parent).
    pub ancestor_deltas: Vec<Hash>,
    pub part_checksums: Vec<Hash>,
    /// objects the applier must fetch over the network before this delta
    /// can be fully applied offline; empty for a complete delta.
    pub fallback_objects: Vec<Hash>,
    pub endianness: Endianness,
    /// set by [`Superblock::decode`] when the declared endianness byte
    /// didn't match the byte order the fixed-width fields were actually
    /// written in and a swapped retry was needed. always `false` on a
    /// freshly built superblock.
    pub detected_endianness_swap: bool,
}

impl Superblock {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(match self.endianness {
            Endianness::Little => 0,
            Endianness::Big => 1,
        });
        out.extend_from_slice(&self.endianness.encode_u64(self.timestamp));
        match self.from_commit {
            Some(h) => {
                out.push(1);
                out.extend_from_slice(h.as_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(self.to_commit.as_bytes());

        write_bytes(&mut out, &self.to_commit_object);

        varint::encode(self.ancestor_deltas.len() as u64, &mut out);
        for h in &self.ancestor_deltas {
            out.extend_from_slice(h.as_bytes());
        }

        varint::encode(self.part_checksums.len() as u64, &mut out);
        for h in &self.part_checksums {
            out.extend_from_slice(h.as_bytes());
        }

        varint::encode(self.fallback_objects.len() as u64, &mut out);
        for h in &self.fallback_objects {
            out.extend_from_slice(h.as_bytes());
        }

        varint::encode(self.metadata.len() as u64, &mut out);
        for (key, value) in &self.metadata {
            write_str(&mut out, key);
            match value {
                MetaValue::Str(s) => {
                    out.push(0);
                    write_str(&mut out, s);
                }
                MetaValue::Bytes(b) => {
                    out.push(1);
                    write_bytes(&mut out, b);
                }
                MetaValue::Int(i) => {
                    out.push(2);
                    out.extend_from_slice(&self.endianness.encode_i64(*i));
                }
                MetaValue::Bool(b) => {
                    out.push(3);
                    out.push(if *b { 1 } else { 0 });
                }
            }
        }

        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let endianness = match *buf.first().ok_or(Error::InvalidVarint)? {
            0 => Endianness::Little,
            1 => Endianness::Big,
            _ => return Err(Error::InvalidVarint),
        };
        pos += 1;

        let timestamp_bytes = buf.get(pos..pos + 8).ok_or(Error::InvalidVarint)?;
        let raw_timestamp: [u8; 8] = timestamp_bytes.try_into().unwrap();
        let (timestamp, endianness, detected_endianness_swap) =
            resolve_endianness(raw_timestamp, endianness);
        pos += 8;

        let has_from = *buf.get(pos).ok_or(Error::InvalidVarint)?;
        pos += 1;
        let from_commit = if has_from == 1 {
            let h = read_hash_at(buf, &mut pos)?;
            Some(h)
        } else {
            None
        };

        let to_commit = read_hash_at(buf, &mut pos)?;

        let mut reader = VarintReader::new(&buf[pos..]);
        let to_commit_object = read_blob(&mut reader)?;

        let ancestor_count = reader.read_varint()?;
        let mut ancestor_deltas = Vec::with_capacity(ancestor_count as usize);
        for _ in 0..ancestor_count {
            ancestor_deltas.push(read_hash(&mut reader)?);
        }

        let part_count = reader.read_varint()?;
        let mut part_checksums = Vec::with_capacity(part_count as usize);
        for _ in 0..part_count {
            part_checksums.push(read_hash(&mut reader)?);
        }

        let fallback_count = reader.read_varint()?;
        let mut fallback_objects = Vec::with_capacity(fallback_count as usize);
        for _ in 0..fallback_count {
            fallback_objects.push(read_hash(&mut reader)?);
        }

        let meta_count = reader.read_varint()?;
        let mut metadata = std::collections::BTreeMap::new();
        for _ in 0..meta_count {
            let key = {
                let bytes = read_blob(&mut reader)?;
                String::from_utf8(bytes).map_err(|_| Error::InvalidVarint)?
            };
            let tag = reader.read_byte()?;
            let value = match tag {
                0 => {
                    let bytes = read_blob(&mut reader)?;
                    MetaValue::Str(String::from_utf8(bytes).map_err(|_| Error::InvalidVarint)?)
                }
                1 => MetaValue::Bytes(read_blob(&mut reader)?),
                2 => {
                    let mut arr = [0u8; 8];
                    for slot in arr.iter_mut() {
                        *slot = reader.read_byte()?;
                    }
                    MetaValue::Int(endianness.decode_i64(arr))
                }
                3 => MetaValue::Bool(reader.read_byte()? != 0),
                other => return Err(Error::InvalidOpcode(other)),
            };
            metadata.insert(key, value);
        }

        Ok(Self {
            metadata,
            timestamp,
            from_commit,
            to_commit,
            to_commit_object,
            ancestor_deltas,
            part_checksums,
            fallback_objects,
            endianness,
            detected_endianness_swap,
        })
    }
}

fn read_hash_at(buf: &[u8], pos: &mut usize) -> Result<Hash> {
    let bytes = buf.get(*pos..*pos + 32).ok_or(Error::InvalidVarint)?;
    *pos += 32;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(bytes);
    Ok(Hash::from_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash {
        Hash::from_bytes([b; 32])
    }

    #[test]
    fn test_part_roundtrip() {
        let part = DeltaPart {
            instructions: vec![
                Instruction::Open {
                    kind: ObjectType::File,
                    size: 42,
                },
                Instruction::Write {
                    data: b"hello".to_vec(),
                },
                Instruction::Close { object_id: h(1) },
            ],
        };
        let encoded = part.encode();
        let decoded = DeltaPart::decode(&encoded).unwrap();
        assert_eq!(decoded.instructions.len(), 3);
    }

    #[test]
    fn test_open_splice_close_roundtrip() {
        let part = DeltaPart {
            instructions: vec![Instruction::OpenSpliceClose {
                kind: ObjectType::File,
                object_id: h(7),
                data: b"content".to_vec(),
            }],
        };
        let decoded = DeltaPart::decode(&part.encode()).unwrap();
        match &decoded.instructions[0] {
            Instruction::OpenSpliceClose {
                object_id, data, ..
            } => {
                assert_eq!(*object_id, h(7));
                assert_eq!(data, b"content");
            }
            other => panic!("wrong instruction decoded: {other:?}"),
        }
    }

    #[test]
    fn test_bspatch_and_read_source_roundtrip() {
        let part = DeltaPart {
            instructions: vec![
                Instruction::SetReadSource {
                    kind: ObjectType::File,
                    object_id: h(1),
                },
                Instruction::Bspatch {
                    patch: vec![1, 2, 3, 4],
                },
                Instruction::UnsetReadSource,
            ],
        };
        let decoded = DeltaPart::decode(&part.encode()).unwrap();
        assert_eq!(decoded.instructions.len(), 3);
    }

    #[test]
    fn test_invalid_opcode_rejected() {
        let buf = vec![7, 99];
        assert!(matches!(
            DeltaPart::decode(&buf),
            Err(Error::InvalidOpcode(7))
        ));
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let part = DeltaPart {
            instructions: vec![Instruction::Close { object_id: h(3) }],
        };
        assert_eq!(part.checksum(), part.checksum());
    }

    #[test]
    fn test_superblock_roundtrip() {
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("note".to_string(), MetaValue::Str("gen".to_string()));
        let sb = Superblock {
            metadata,
            timestamp: 1_700_000_000,
            from_commit: Some(h(1)),
            to_commit: h(2),
            to_commit_object: b"commit bytes".to_vec(),
            ancestor_deltas: vec![h(3)],
            part_checksums: vec![h(4), h(5)],
            fallback_objects: vec![],
            endianness: Endianness::host(),
            detected_endianness_swap: false,
        };
        let encoded = sb.encode();
        let decoded = Superblock::decode(&encoded).unwrap();
        assert_eq!(decoded.to_commit, h(2));
        assert_eq!(decoded.from_commit, Some(h(1)));
        assert_eq!(decoded.to_commit_object, b"commit bytes");
        assert_eq!(decoded.part_checksums, vec![h(4), h(5)]);
        assert_eq!(decoded.ancestor_deltas, vec![h(3)]);
        assert!(!decoded.detected_endianness_swap);
    }

    #[test]
    fn test_superblock_no_parent_no_fallbacks() {
        let sb = Superblock {
            metadata: std::collections::BTreeMap::new(),
            timestamp: 1,
            from_commit: None,
            to_commit: h(9),
            to_commit_object: vec![],
            ancestor_deltas: vec![],
            part_checksums: vec![],
            fallback_objects: vec![h(8)],
            endianness: Endianness::host(),
            detected_endianness_swap: false,
        };
        let decoded = Superblock::decode(&sb.encode()).unwrap();
        assert!(decoded.from_commit.is_none());
        assert_eq!(decoded.fallback_objects, vec![h(8)]);
    }

    #[test]
    fn test_superblock_detects_foreign_endian_host() {
        let sb = Superblock {
            metadata: std::collections::BTreeMap::new(),
            timestamp: 1_700_000_000,
            from_commit: None,
            to_commit: h(6),
            to_commit_object: b"x".to_vec(),
            ancestor_deltas: vec![],
            part_checksums: vec![],
            fallback_objects: vec![],
            endianness: Endianness::Little,
            detected_endianness_swap: false,
        };
        let mut encoded = sb.encode();
        // flip the declared-endianness byte without touching the timestamp
        // bytes, simulating a delta generated on a foreign-endian host that
        // still wrote its timestamp in its own native order.
        encoded[0] = 1;
        let decoded = Superblock::decode(&encoded).unwrap();
        assert_eq!(decoded.timestamp, 1_700_000_000);
        assert!(decoded.detected_endianness_swap);
    }
}
