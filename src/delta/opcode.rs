//! opcode executor: replays a decoded [`DeltaPart`] against a repository,
//! turning its instruction stream back into stored objects.
//!
//! every instruction stream operates on an object's canonical uncompressed
//! encoding — the same bytes [`crate::object`]'s `compute_id` hashes — so
//! closing an output only ever needs a plain SHA-256 comparison, regardless
//! of which object kind is being written or how the target repo's mode
//! happens to store it on disk.

use qbsdiff::Bspatch;

use super::format::{DeltaPart, Instruction};
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::loader;
use crate::object::{FileObject, ObjectType};
use crate::repo::Repo;
use crate::store;

/// canonical (uncompressed) encoding of an already-stored object, used both
/// to seed a read source and, for file objects, as the final decode target
/// before re-framing per the destination repo's mode.
fn load_canonical_bytes(repo: &Repo, kind: ObjectType, id: &Hash) -> Result<Vec<u8>> {
    match kind {
        ObjectType::File => Ok(loader::load_file(repo, id)?.encode_uncompressed()),
        _ => store::read_object_bytes(repo, kind, id),
    }
}

fn store_canonical_bytes(repo: &Repo, kind: ObjectType, bytes: Vec<u8>) -> Result<Hash> {
    match kind {
        ObjectType::File => {
            let obj = FileObject::decode_uncompressed(&bytes)?;
            loader::store_file(repo, &obj)
        }
        _ => {
            let id = Hash::of(&bytes);
            store::write_object(repo, kind, &id, &bytes)
        }
    }
}

struct OpenOutput {
    kind: ObjectType,
    expected_size: Option<u64>,
    buffer: Vec<u8>,
}

/// execute every instruction in `part` against `repo`, returning the ids of
/// the objects it wrote, in close order.
pub fn execute_part(repo: &Repo, part: &DeltaPart) -> Result<Vec<Hash>> {
    let mut output: Option<OpenOutput> = None;
    let mut read_source: Option<Vec<u8>> = None;
    let mut written = Vec::new();

    for instr in &part.instructions {
        match instr {
            Instruction::Open { kind, size } => {
                if output.is_some() {
                    return Err(Error::OpcodeStateViolation(
                        "Open issued while another output is already open",
                    ));
                }
                output = Some(OpenOutput {
                    kind: *kind,
                    expected_size: Some(*size),
                    buffer: Vec::new(),
                });
            }
            Instruction::Write { data } => {
                let out = output
                    .as_mut()
                    .ok_or(Error::OpcodeStateViolation("Write issued with no open output"))?;
                out.buffer.extend_from_slice(data);
            }
            Instruction::OpenSpliceClose {
                kind,
                object_id,
                data,
            } => {
                if output.is_some() {
                    return Err(Error::OpcodeStateViolation(
                        "OpenSpliceClose issued while another output is already open",
                    ));
                }
                let computed = Hash::of(data);
                if computed != *object_id {
                    return Err(Error::DeltaObjectMismatch {
                        expected: *object_id,
                        computed,
                    });
                }
                let id = store_canonical_bytes(repo, *kind, data.clone())?;
                written.push(id);
            }
            Instruction::SetReadSource { kind, object_id } => {
                read_source = Some(load_canonical_bytes(repo, *kind, object_id)?);
            }
            Instruction::UnsetReadSource => {
                read_source = None;
            }
            Instruction::Bspatch { patch } => {
                let out = output.as_mut().ok_or(Error::OpcodeStateViolation(
                    "Bspatch issued with no open output",
                ))?;
                let source = read_source.as_deref().ok_or(Error::OpcodeStateViolation(
                    "Bspatch issued with no read source set",
                ))?;
                let patcher = Bspatch::new(patch)
                    .map_err(|_| Error::OpcodeStateViolation("malformed bspatch stream"))?;
                let mut patched = Vec::new();
                patcher
                    .apply(source, &mut patched)
                    .map_err(|_| Error::OpcodeStateViolation("bspatch application failed"))?;
                out.buffer.extend_from_slice(&patched);
            }
            Instruction::Close { object_id } => {
                let out = output
                    .take()
                    .ok_or(Error::OpcodeStateViolation("Close issued with no open output"))?;
                if let Some(expected_size) = out.expected_size {
                    if out.buffer.len() as u64 != expected_size {
                        return Err(Error::DeltaOffsetOutOfRange {
                            offset: 0,
                            length: out.buffer.len() as u64,
                            blob_len: expected_size,
                        });
                    }
                }
                let computed = Hash::of(&out.buffer);
                if computed != *object_id {
                    return Err(Error::DeltaObjectMismatch {
                        expected: *object_id,
                        computed,
                    });
                }
                let id = store_canonical_bytes(repo, out.kind, out.buffer)?;
                written.push(id);
            }
        }
    }

    if output.is_some() {
        return Err(Error::OpcodeStateViolation(
            "part ended with an output still open",
        ));
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoMode;
    use crate::object::FileHeader;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Bare).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_open_splice_close_writes_object() {
        let (_dir, repo) = test_repo();
        let obj = FileObject::new(FileHeader::regular(0, 0, 0o100644, vec![]), b"hi".to_vec());
        let bytes = obj.encode_uncompressed();
        let id = obj.compute_id();

        let part = DeltaPart {
            instructions: vec![Instruction::OpenSpliceClose {
                kind: ObjectType::File,
                object_id: id,
                data: bytes,
            }],
        };
        let written = execute_part(&repo, &part).unwrap();
        assert_eq!(written, vec![id]);
        let loaded = loader::load_file(&repo, &id).unwrap();
        assert_eq!(loaded.payload, b"hi");
    }

    #[test]
    fn test_open_write_close_accumulates() {
        let (_dir, repo) = test_repo();
        let obj = FileObject::new(FileHeader::regular(0, 0, 0o100644, vec![]), b"chunked".to_vec());
        let bytes = obj.encode_uncompressed();
        let id = obj.compute_id();

        let part = DeltaPart {
            instructions: vec![
                Instruction::Open {
                    kind: ObjectType::File,
                    size: bytes.len() as u64,
                },
                Instruction::Write {
                    data: bytes[..4].to_vec(),
                },
                Instruction::Write {
                    data: bytes[4..].to_vec(),
                },
                Instruction::Close { object_id: id },
            ],
        };
        let written = execute_part(&repo, &part).unwrap();
        assert_eq!(written, vec![id]);
    }

    #[test]
    fn test_close_without_open_errors() {
        let (_dir, repo) = test_repo();
        let part = DeltaPart {
            instructions: vec![Instruction::Close {
                object_id: Hash::of(b"x"),
            }],
        };
        assert!(matches!(
            execute_part(&repo, &part),
            Err(Error::OpcodeStateViolation(_))
        ));
    }

    #[test]
    fn test_splice_checksum_mismatch_rejected() {
        let (_dir, repo) = test_repo();
        let part = DeltaPart {
            instructions: vec![Instruction::OpenSpliceClose {
                kind: ObjectType::DirTree,
                object_id: Hash::of(b"wrong"),
                data: b"actual bytes".to_vec(),
            }],
        };
        assert!(matches!(
            execute_part(&repo, &part),
            Err(Error::DeltaObjectMismatch { .. })
        ));
    }

    #[test]
    fn test_bspatch_reconstructs_target_from_source() {
        let (_dir, repo) = test_repo();
        let source_obj = FileObject::new(
            FileHeader::regular(0, 0, 0o100644, vec![]),
            b"hello world, this is the source payload".to_vec(),
        );
        let source_id = loader::store_file(&repo, &source_obj).unwrap();

        let target_obj = FileObject::new(
            FileHeader::regular(0, 0, 0o100644, vec![]),
            b"hello world, this is the TARGET payload".to_vec(),
        );
        let target_bytes = target_obj.encode_uncompressed();
        let target_id = target_obj.compute_id();

        let mut patch = Vec::new();
        qbsdiff::Bsdiff::new(&source_obj.encode_uncompressed())
            .compare(&target_bytes, &mut patch)
            .unwrap();

        let part = DeltaPart {
            instructions: vec![
                Instruction::SetReadSource {
                    kind: ObjectType::File,
                    object_id: source_id,
                },
                Instruction::Open {
                    kind: ObjectType::File,
                    size: target_bytes.len() as u64,
                },
                Instruction::Bspatch { patch },
                Instruction::Close {
                    object_id: target_id,
                },
                Instruction::UnsetReadSource,
            ],
        };
        let written = execute_part(&repo, &part).unwrap();
        assert_eq!(written, vec![target_id]);
        let loaded = loader::load_file(&repo, &target_id).unwrap();
        assert_eq!(loaded.payload, b"hello world, this is the TARGET payload");
    }
}
