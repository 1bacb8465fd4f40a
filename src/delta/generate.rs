//! static delta generation (§4.5): diff two commits reachable in the same
//! repository into a superblock plus a sequence of parts, using size-window
//! matching and a rolling-checksum coverage estimate to decide when a
//! bsdiff against an old object is worth it over just inlining the new one.

use std::collections::HashSet;

use qbsdiff::Bsdiff;

use super::format::{Endianness, Instruction, Superblock};
use super::rollsum;
use crate::error::Result;
use crate::hash::Hash;
use crate::loader;
use crate::object::ObjectType;
use crate::repo::Repo;
use crate::store;

/// tuning knobs for delta generation; defaults follow the informal
/// guidance of "only bother diffing same-ish-sized objects, only keep the
/// diff if it covers at least half the target".
#[derive(Clone, Copy, Debug)]
pub struct DeltaGenerateOptions {
    /// a source file is considered a bsdiff candidate for a target file
    /// only if its size is within this fraction of the target's size.
    pub size_window_pct: f64,
    /// minimum rolling-checksum coverage estimate required before bsdiff
    /// is attempted against a size-window candidate.
    pub min_rollsum_coverage: f64,
    /// soft cap (in encoded bytes) on how much inline data a single part
    /// carries before generation starts a new one.
    pub max_part_size: usize,
}

impl Default for DeltaGenerateOptions {
    fn default() -> Self {
        Self {
            size_window_pct: 0.30,
            min_rollsum_coverage: 0.50,
            max_part_size: 4 * 1024 * 1024,
        }
    }
}

/// an object reachable from a commit, with just enough information to
/// decide whether it's a useful bsdiff source or needs to be newly sent.
struct ReachableObject {
    kind: ObjectType,
    id: Hash,
}

fn collect_reachable(repo: &Repo, commit_id: &Hash) -> Result<Vec<ReachableObject>> {
    let commit = loader::load_commit(repo, commit_id)?;
    let mut out = vec![ReachableObject {
        kind: ObjectType::DirMeta,
        id: commit.root_meta,
    }];
    collect_tree(repo, &commit.root_tree, &mut out)?;
    Ok(out)
}

fn collect_tree(repo: &Repo, tree_id: &Hash, out: &mut Vec<ReachableObject>) -> Result<()> {
    out.push(ReachableObject {
        kind: ObjectType::DirTree,
        id: *tree_id,
    });
    let tree = loader::load_dirtree(repo, tree_id)?;
    for file in &tree.files {
        out.push(ReachableObject {
            kind: ObjectType::File,
            id: file.checksum,
        });
    }
    for dir in &tree.dirs {
        out.push(ReachableObject {
            kind: ObjectType::DirMeta,
            id: dir.meta_checksum,
        });
        collect_tree(repo, &dir.tree_checksum, out)?;
    }
    Ok(())
}

struct FileCandidate {
    id: Hash,
    bytes: Vec<u8>,
}

/// diff `from` (if any) against `to`, both already committed in `repo`,
/// producing a superblock and the parts it references.
pub fn generate_delta(
    repo: &Repo,
    from: Option<&Hash>,
    to: &Hash,
    opts: &DeltaGenerateOptions,
) -> Result<(Superblock, Vec<super::format::DeltaPart>)> {
    tracing::info!(from = ?from, to = %to, "generating static delta");

    let to_objects = collect_reachable(repo, to)?;
    let from_objects = match from {
        Some(f) => collect_reachable(repo, f)?,
        None => Vec::new(),
    };

    let from_ids: HashSet<Hash> = from_objects.iter().map(|o| o.id).collect();

    let mut file_candidates: Vec<FileCandidate> = Vec::new();
    for obj in &from_objects {
        if obj.kind == ObjectType::File {
            let bytes = loader::load_file(repo, &obj.id)?.encode_uncompressed();
            file_candidates.push(FileCandidate {
                id: obj.id,
                bytes,
            });
        }
    }

    let mut seen = HashSet::new();
    let mut instructions = Vec::new();
    let mut fallback_objects = Vec::new();

    for obj in &to_objects {
        if from_ids.contains(&obj.id) || !seen.insert(obj.id) {
            continue;
        }
        if !store::has(repo, obj.kind, &obj.id) {
            fallback_objects.push(obj.id);
            continue;
        }

        match obj.kind {
            ObjectType::File => {
                let target_bytes = loader::load_file(repo, &obj.id)?.encode_uncompressed();
                emit_file_instructions(&target_bytes, &obj.id, &file_candidates, opts, &mut instructions);
            }
            other => {
                let bytes = store::read_object_bytes(repo, other, &obj.id)?;
                instructions.push(Instruction::OpenSpliceClose {
                    kind: other,
                    object_id: obj.id,
                    data: bytes,
                });
            }
        }
    }

    let parts = pack_parts(instructions, opts.max_part_size);
    tracing::debug!(parts = parts.len(), "packed delta instructions into parts");
    let part_checksums = parts.iter().map(|p| p.checksum()).collect();

    let to_commit_object = store::read_object_bytes(repo, ObjectType::Commit, to)?;

    let superblock = Superblock {
        metadata: std::collections::BTreeMap::new(),
        timestamp: loader::load_commit(repo, to)?.timestamp,
        from_commit: from.copied(),
        to_commit: *to,
        to_commit_object,
        ancestor_deltas: Vec::new(),
        part_checksums,
        fallback_objects,
        endianness: Endianness::host(),
        detected_endianness_swap: false,
    };

    Ok((superblock, parts))
}

fn emit_file_instructions(
    target_bytes: &[u8],
    target_id: &Hash,
    candidates: &[FileCandidate],
    opts: &DeltaGenerateOptions,
    instructions: &mut Vec<Instruction>,
) {
    let target_size = target_bytes.len() as f64;
    let mut best: Option<(&FileCandidate, f64)> = None;

    for candidate in candidates {
        let size = candidate.bytes.len() as f64;
        if target_size == 0.0 {
            continue;
        }
        let ratio = (size - target_size).abs() / target_size;
        if ratio > opts.size_window_pct {
            continue;
        }
        let coverage = rollsum::estimate_coverage(&candidate.bytes, target_bytes);
        if coverage >= opts.min_rollsum_coverage {
            if best.as_ref().map_or(true, |(_, best_cov)| coverage > *best_cov) {
                best = Some((candidate, coverage));
            }
        }
    }

    if let Some((candidate, _)) = best {
        let mut patch = Vec::new();
        if Bsdiff::new(&candidate.bytes).compare(target_bytes, &mut patch).is_ok() {
            instructions.push(Instruction::SetReadSource {
                kind: ObjectType::File,
                object_id: candidate.id,
            });
            instructions.push(Instruction::Open {
                kind: ObjectType::File,
                size: target_bytes.len() as u64,
            });
            instructions.push(Instruction::Bspatch { patch });
            instructions.push(Instruction::Close {
                object_id: *target_id,
            });
            instructions.push(Instruction::UnsetReadSource);
            return;
        }
    }

    instructions.push(Instruction::OpenSpliceClose {
        kind: ObjectType::File,
        object_id: *target_id,
        data: target_bytes.to_vec(),
    });
}

fn instruction_weight(instr: &Instruction) -> usize {
    match instr {
        Instruction::Write { data } => data.len(),
        Instruction::OpenSpliceClose { data, .. } => data.len(),
        Instruction::Bspatch { patch } => patch.len(),
        _ => 0,
    }
}

fn pack_parts(instructions: Vec<Instruction>, max_part_size: usize) -> Vec<super::format::DeltaPart> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;

    for instr in instructions {
        let weight = instruction_weight(&instr);
        if !current.is_empty() && current_size + weight > max_part_size {
            parts.push(super::format::DeltaPart {
                instructions: std::mem::take(&mut current),
            });
            current_size = 0;
        }
        current_size += weight;
        current.push(instr);
    }
    if !current.is_empty() {
        parts.push(super::format::DeltaPart { instructions: current });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoMode;
    use crate::mtree::stage_directory;
    use crate::object::Commit;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Bare).unwrap();
        (dir, repo)
    }

    fn commit_dir(repo: &Repo, src: &std::path::Path, parent: Option<Hash>) -> Hash {
        let staged = stage_directory(src, RepoMode::Bare).unwrap();
        let (tree, meta) = staged.write(repo).unwrap();
        let commit = Commit::new(parent, "gen", "", 1_700_000_000, tree, meta);
        loader::store_commit(repo, &commit).unwrap()
    }

    #[test]
    fn test_generate_delta_from_scratch_has_no_fallbacks() {
        let (_dir, repo) = test_repo();
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello world").unwrap();
        let to = commit_dir(&repo, src.path(), None);

        let (sb, parts) = generate_delta(&repo, None, &to, &DeltaGenerateOptions::default()).unwrap();
        assert!(sb.fallback_objects.is_empty());
        assert_eq!(sb.to_commit, to);
        assert!(!parts.is_empty());
    }

    #[test]
    fn test_generate_delta_reuses_similar_file_via_bsdiff() {
        let (_dir, repo) = test_repo();

        let src1 = tempdir().unwrap();
        std::fs::write(src1.path().join("a.txt"), "x".repeat(2000)).unwrap();
        let from = commit_dir(&repo, src1.path(), None);

        let src2 = tempdir().unwrap();
        let mut content = "x".repeat(1990);
        content.push_str("DIFFERENT");
        std::fs::write(src2.path().join("a.txt"), &content).unwrap();
        let to = commit_dir(&repo, src2.path(), Some(from));

        let (sb, parts) =
            generate_delta(&repo, Some(&from), &to, &DeltaGenerateOptions::default()).unwrap();
        assert_eq!(sb.from_commit, Some(from));

        let has_bspatch = parts
            .iter()
            .flat_map(|p| p.instructions.iter())
            .any(|i| matches!(i, Instruction::Bspatch { .. }));
        assert!(has_bspatch);
    }
}
