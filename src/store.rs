//! the loose object store: content-addressed reads and writes of the four
//! object kinds under `objects/<2hex>/<62hex>.<ext>` (§3.3, §4.2).
//!
//! writes always land through a temp file in `tmp/` and an atomic rename so
//! a reader never observes a partially written object. objects are
//! immutable once named by their hash: a second write of the same content
//! is a no-op (dedup-by-construction).

use std::fs::{self, File};
use std::io::Write as _;
use std::path::PathBuf;

use crate::config::RepoMode;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;
use crate::object::ObjectType;
use crate::repo::Repo;

/// path an object of `kind` named `id` would live at, given the repo's
/// current compression policy for that kind.
pub fn object_path(repo: &Repo, kind: ObjectType, id: &Hash) -> PathBuf {
    let (dir, file) = id.to_path_components();
    let compressed = kind == ObjectType::File && repo.mode() == RepoMode::Archive;
    repo.objects_path()
        .join(dir)
        .join(format!("{file}.{}", kind.loose_ext(compressed)))
}

/// true if this repo (or its parent chain) already has the object.
pub fn has(repo: &Repo, kind: ObjectType, id: &Hash) -> bool {
    if object_path(repo, kind, id).is_file() {
        return true;
    }
    match repo.parent() {
        Some(parent) => has(parent, kind, id),
        None => false,
    }
}

/// write raw bytes as a loose object, deduplicating against an existing
/// object of the same id. returns the id unchanged for convenience.
pub fn write_object(repo: &Repo, kind: ObjectType, id: &Hash, bytes: &[u8]) -> Result<Hash> {
    let path = object_path(repo, kind, id);
    if path.is_file() {
        tracing::trace!(?kind, %id, "object already present, skipping write");
        return Ok(*id);
    }

    let dir = path.parent().expect("object path always has a parent");
    fs::create_dir_all(dir).with_path(dir)?;

    fs::create_dir_all(repo.tmp_path()).with_path(repo.tmp_path())?;
    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(bytes).with_path(&tmp_path)?;
        if repo.config().fsync {
            tmp_file.sync_all().with_path(&tmp_path)?;
        }
    }

    match fs::rename(&tmp_path, &path) {
        Ok(()) => {}
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_path(&path);
        }
    }

    if repo.config().fsync {
        let dir_file = File::open(dir).with_path(dir)?;
        dir_file.sync_all().with_path(dir)?;
    }

    tracing::debug!(?kind, %id, bytes = bytes.len(), "wrote loose object");
    Ok(*id)
}

/// read a loose object's raw on-disk bytes, checking the local repo then
/// falling back to the parent chain.
pub fn read_object_bytes(repo: &Repo, kind: ObjectType, id: &Hash) -> Result<Vec<u8>> {
    let path = object_path(repo, kind, id);
    match fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match repo.parent() {
            Some(parent) => read_object_bytes(parent, kind, id),
            None => Err(Error::ObjectNotFound(kind, *id)),
        },
        Err(e) => Err(e).with_path(&path),
    }
}

/// delete a loose object from this repo only (never follows the parent
/// chain — parents are read-only collaborators).
pub fn delete_object(repo: &Repo, kind: ObjectType, id: &Hash) -> Result<()> {
    let path = object_path(repo, kind, id);
    match fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!(?kind, %id, "deleted loose object");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ObjectNotFound(kind, *id)),
        Err(e) => Err(e).with_path(&path),
    }
}

/// hardlink-import an object from `src_repo` into `repo`, falling back to a
/// copy when hardlinking isn't possible (cross-device, or the source mode
/// doesn't keep real inodes per object).
pub fn import_object(
    repo: &Repo,
    src_repo: &Repo,
    kind: ObjectType,
    id: &Hash,
    allow_copy_fallback: bool,
) -> Result<()> {
    let dest = object_path(repo, kind, id);
    if dest.is_file() {
        return Ok(());
    }
    let src = object_path(src_repo, kind, id);
    if !src.is_file() {
        return Err(Error::ObjectNotFound(kind, *id));
    }

    let dir = dest.parent().expect("object path always has a parent");
    fs::create_dir_all(dir).with_path(dir)?;

    use nix::libc;

    match fs::hard_link(&src, &dest) {
        Ok(()) => {
            tracing::debug!(?kind, %id, "imported object via hardlink");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e)
            if e.raw_os_error() == Some(libc::EXDEV) || e.raw_os_error() == Some(libc::EMLINK) =>
        {
            if !allow_copy_fallback {
                return Err(Error::NoCopyFallback);
            }
            tracing::debug!(?kind, %id, "hardlink import not possible, falling back to copy");
            let bytes = fs::read(&src).with_path(&src)?;
            write_object(repo, kind, id, &bytes)?;
            Ok(())
        }
        Err(e) => Err(e).with_path(&dest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repo::init(&repo_path, RepoMode::Bare).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"hello dirtree bytes");
        write_object(&repo, ObjectType::DirTree, &id, b"hello dirtree bytes").unwrap();
        assert!(has(&repo, ObjectType::DirTree, &id));
        let bytes = read_object_bytes(&repo, ObjectType::DirTree, &id).unwrap();
        assert_eq!(bytes, b"hello dirtree bytes");
    }

    #[test]
    fn test_write_is_idempotent() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"content");
        write_object(&repo, ObjectType::File, &id, b"content").unwrap();
        write_object(&repo, ObjectType::File, &id, b"content").unwrap();
        assert!(has(&repo, ObjectType::File, &id));
    }

    #[test]
    fn test_missing_object_not_found() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"nope");
        let result = read_object_bytes(&repo, ObjectType::Commit, &id);
        assert!(matches!(result, Err(Error::ObjectNotFound(ObjectType::Commit, _))));
    }

    #[test]
    fn test_delete_nonexistent_object() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"nope");
        assert!(matches!(
            delete_object(&repo, ObjectType::File, &id),
            Err(Error::ObjectNotFound(ObjectType::File, _))
        ));
    }

    #[test]
    fn test_parent_repo_fallback() {
        let dir = tempdir().unwrap();
        let parent_path = dir.path().join("parent");
        let parent = Repo::init(&parent_path, RepoMode::Bare).unwrap();
        let id = Hash::of(b"shared content");
        write_object(&parent, ObjectType::File, &id, b"shared content").unwrap();

        let child_path = dir.path().join("child");
        let mut child = Repo::init(&child_path, RepoMode::Bare).unwrap();
        child.config_mut().parent = Some(parent_path);
        child.save_config().unwrap();
        let child = Repo::open(&child_path).unwrap();

        assert!(has(&child, ObjectType::File, &id));
        let bytes = read_object_bytes(&child, ObjectType::File, &id).unwrap();
        assert_eq!(bytes, b"shared content");
    }

    #[test]
    fn test_import_hardlinks_between_repos() {
        let dir = tempdir().unwrap();
        let (src_dir, src_repo) = {
            let d = tempdir().unwrap();
            let path = d.path().join("src");
            let repo = Repo::init(&path, RepoMode::Bare).unwrap();
            (d, repo)
        };
        let _ = dir;
        let id = Hash::of(b"imported content");
        write_object(&src_repo, ObjectType::File, &id, b"imported content").unwrap();

        let dst_dir = tempdir().unwrap();
        let dst_repo = Repo::init(&dst_dir.path().join("dst"), RepoMode::Bare).unwrap();
        import_object(&dst_repo, &src_repo, ObjectType::File, &id, true).unwrap();
        assert!(has(&dst_repo, ObjectType::File, &id));
        let _ = src_dir;
    }
}
