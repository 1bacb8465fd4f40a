use std::fs::File;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::{Config, RepoMode};
use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;

/// an on-disk repository: object store, refs, and staging areas for one
/// storage mode (§3.3, §3.4).
pub struct Repo {
    path: PathBuf,
    config: Config,
    parent: Option<Box<Repo>>,
}

impl Repo {
    /// initialize a new repository at `path` in the given mode.
    pub fn init(path: &Path, mode: RepoMode) -> Result<Self> {
        let config_path = path.join("config");
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        std::fs::create_dir_all(path.join("objects")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/heads")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/tags")).with_path(path)?;
        std::fs::create_dir_all(path.join("tmp")).with_path(path)?;
        std::fs::create_dir_all(path.join("state")).with_path(path)?;
        std::fs::create_dir_all(path.join("deltas")).with_path(path)?;
        std::fs::create_dir_all(path.join("uncompressed-objects-cache")).with_path(path)?;

        let config = Config::new(mode);
        config.save(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            parent: None,
        })
    }

    /// open an existing repository, optionally chaining a parent repo whose
    /// objects are consulted when this repo is missing something locally.
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;
        let parent = match &config.parent {
            Some(parent_path) => Some(Box::new(Repo::open(parent_path)?)),
            None => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            config,
            parent,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn mode(&self) -> RepoMode {
        self.config.mode
    }

    pub fn parent(&self) -> Option<&Repo> {
        self.parent.as_deref()
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join("config")
    }

    pub fn objects_path(&self) -> PathBuf {
        self.path.join("objects")
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs/heads")
    }

    pub fn tags_path(&self) -> PathBuf {
        self.path.join("refs/tags")
    }

    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    pub fn state_path(&self) -> PathBuf {
        self.path.join("state")
    }

    pub fn deltas_path(&self) -> PathBuf {
        self.path.join("deltas")
    }

    pub fn uncompressed_cache_path(&self) -> PathBuf {
        self.path.join("uncompressed-objects-cache")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.join(".lock")
    }

    /// acquire exclusive lock on repository; guard releases on drop.
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;

        Ok(RepoLock { flock })
    }

    pub fn try_lock(&self) -> Result<Option<RepoLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(RepoLock { flock })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }

    /// marker path for a commit still being written (`state/<id>.commitpartial`).
    pub fn commitpartial_path(&self, id: &Hash) -> PathBuf {
        self.state_path().join(format!("{}.commitpartial", id.to_hex()))
    }

    pub fn mark_commit_partial(&self, id: &Hash) -> Result<()> {
        let path = self.commitpartial_path(id);
        std::fs::create_dir_all(self.state_path()).with_path(self.state_path())?;
        std::fs::write(&path, b"").with_path(&path)
    }

    pub fn clear_commit_partial(&self, id: &Hash) -> Result<()> {
        let path = self.commitpartial_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_path(&path),
        }
    }

    pub fn is_commit_partial(&self, id: &Hash) -> bool {
        self.commitpartial_path(id).is_file()
    }
}

/// guard that holds repository lock until dropped.
pub struct RepoLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}

pub fn with_lock<T, F>(repo: &Repo, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let _lock = repo.lock()?;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_repo_init_bare() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        let repo = Repo::init(&repo_path, RepoMode::Bare).unwrap();

        assert!(repo_path.join("objects").is_dir());
        assert!(repo_path.join("refs/heads").is_dir());
        assert!(repo_path.join("refs/tags").is_dir());
        assert!(repo_path.join("tmp").is_dir());
        assert!(repo_path.join("state").is_dir());
        assert!(repo_path.join("config").is_file());
        assert_eq!(repo.mode(), RepoMode::Bare);
    }

    #[test]
    fn test_repo_init_already_exists() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        Repo::init(&repo_path, RepoMode::Bare).unwrap();
        let result = Repo::init(&repo_path, RepoMode::Bare);

        assert!(matches!(result, Err(Error::RepoExists(_))));
    }

    #[test]
    fn test_repo_open_not_found() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("nonexistent");

        let result = Repo::open(&repo_path);
        assert!(matches!(result, Err(Error::NoRepo(_))));
    }

    #[test]
    fn test_repo_lock() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");
        let repo = Repo::init(&repo_path, RepoMode::Bare).unwrap();

        let lock = repo.lock().unwrap();
        assert!(repo.try_lock().unwrap().is_none());
        drop(lock);
        assert!(repo.try_lock().unwrap().is_some());
    }

    #[test]
    fn test_commitpartial_marker_lifecycle() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");
        let repo = Repo::init(&repo_path, RepoMode::Bare).unwrap();
        let id = Hash::of(b"fake commit bytes");

        assert!(!repo.is_commit_partial(&id));
        repo.mark_commit_partial(&id).unwrap();
        assert!(repo.is_commit_partial(&id));
        repo.clear_commit_partial(&id).unwrap();
        assert!(!repo.is_commit_partial(&id));
    }

    #[test]
    fn test_parent_repo_chain() {
        let dir = tempdir().unwrap();
        let parent_path = dir.path().join("parent-repo");
        Repo::init(&parent_path, RepoMode::Bare).unwrap();

        let child_path = dir.path().join("child-repo");
        let mut child = Repo::init(&child_path, RepoMode::Bare).unwrap();
        child.config_mut().parent = Some(parent_path.clone());
        child.save_config().unwrap();

        let reopened = Repo::open(&child_path).unwrap();
        assert!(reopened.parent().is_some());
        assert_eq!(reopened.parent().unwrap().path(), parent_path);
    }
}
