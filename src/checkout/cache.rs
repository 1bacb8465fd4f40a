//! the uncompressed-object cache (§4.4): in archive-mode repos, file
//! payloads are stored zlib-compressed, so a checkout that wants to
//! hardlink instead of decompress-and-copy needs a decompressed copy to
//! hardlink from. this cache holds exactly that, keyed by object id, and
//! is garbage-collected by nlink — once nothing in any checkout still
//! hardlinks an entry, its link count drops to 1 and it's safe to delete.

use std::fs;
use std::path::PathBuf;

use crate::error::{IoResultExt, Result};
use crate::hash::Hash;
use crate::repo::Repo;

pub fn cache_path(repo: &Repo, id: &Hash) -> PathBuf {
    let (dir, file) = id.to_path_components();
    repo.uncompressed_cache_path().join(dir).join(file)
}

/// write `payload` into the cache for `id`, if not already present.
pub fn populate(repo: &Repo, id: &Hash, payload: &[u8]) -> Result<()> {
    let path = cache_path(repo, id);
    if path.is_file() {
        return Ok(());
    }
    let dir = path.parent().expect("cache path always has a parent");
    fs::create_dir_all(dir).with_path(dir)?;

    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    fs::write(&tmp_path, payload).with_path(&tmp_path)?;
    fs::rename(&tmp_path, &path).with_path(&path)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UncompressedCacheStats {
    pub scanned: usize,
    pub reclaimed: usize,
}

/// remove cache entries with `st_nlink == 1` — i.e. nothing outside the
/// cache directory still hardlinks them.
///
/// known limitation carried from the design this is based on: a cache
/// entry can only be reclaimed once every checkout that hardlinked it has
/// itself been removed, so a long-lived checkout keeps its cache entries
/// alive indefinitely even if the owning commit is later deleted.
pub fn gc_uncompressed_cache(repo: &Repo) -> Result<UncompressedCacheStats> {
    let mut stats = UncompressedCacheStats::default();
    let root = repo.uncompressed_cache_path();
    if !root.is_dir() {
        return Ok(stats);
    }

    for shard in fs::read_dir(&root).with_path(&root)? {
        let shard = shard.with_path(&root)?;
        if !shard.path().is_dir() {
            continue;
        }
        for entry in fs::read_dir(shard.path()).with_path(shard.path())? {
            let entry = entry.with_path(shard.path())?;
            stats.scanned += 1;
            let meta = entry.metadata().with_path(entry.path())?;
            use std::os::unix::fs::MetadataExt;
            if meta.nlink() == 1 {
                fs::remove_file(entry.path()).with_path(entry.path())?;
                stats.reclaimed += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoMode;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Archive).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_populate_and_path() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"payload");
        populate(&repo, &id, b"payload").unwrap();
        let path = cache_path(&repo, &id);
        assert!(path.is_file());
        assert_eq!(fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_gc_reclaims_unlinked_entries() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"orphaned");
        populate(&repo, &id, b"orphaned").unwrap();

        let stats = gc_uncompressed_cache(&repo).unwrap();
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.reclaimed, 1);
        assert!(!cache_path(&repo, &id).is_file());
    }

    #[test]
    fn test_gc_keeps_hardlinked_entries() {
        let (_dir, repo) = test_repo();
        let id = Hash::of(b"kept");
        populate(&repo, &id, b"kept").unwrap();

        let checkout_dir = tempdir().unwrap();
        let link = checkout_dir.path().join("checked-out");
        fs::hard_link(cache_path(&repo, &id), &link).unwrap();

        let stats = gc_uncompressed_cache(&repo).unwrap();
        assert_eq!(stats.reclaimed, 0);
        assert!(cache_path(&repo, &id).is_file());
    }
}
