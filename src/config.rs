use std::path::{Path, PathBuf};

use ini::Ini;

use crate::error::{Error, IoResultExt, Result};

/// storage mode a repository operates in (§3.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoMode {
    /// root-owned loose objects, real uid/gid/mode on disk.
    Bare,
    /// loose objects owned by the repository's own uid, true ownership kept
    /// in a `user.ostreemeta` xattr.
    BareUser,
    /// file objects stored zlib-compressed, no real ownership on disk.
    Archive,
}

impl RepoMode {
    fn as_str(self) -> &'static str {
        match self {
            RepoMode::Bare => "bare",
            RepoMode::BareUser => "bare-user",
            RepoMode::Archive => "archive",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "bare" => Ok(RepoMode::Bare),
            "bare-user" => Ok(RepoMode::BareUser),
            "archive" | "archive-z2" => Ok(RepoMode::Archive),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// repository configuration stored in the `config` INI file's `[core]`
/// section (§6.2).
#[derive(Clone, Debug)]
pub struct Config {
    pub repo_version: u32,
    pub mode: RepoMode,
    /// path to a parent repository consulted when an object is missing
    /// locally (read-only fallback).
    pub parent: Option<PathBuf>,
    pub fsync: bool,
    pub enable_uncompressed_cache: bool,
    pub tombstone_commits: bool,
    pub tmp_expiry_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_version: 1,
            mode: RepoMode::Bare,
            parent: None,
            fsync: true,
            enable_uncompressed_cache: false,
            tombstone_commits: false,
            tmp_expiry_secs: 86400,
        }
    }
}

impl Config {
    pub fn new(mode: RepoMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| Error::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let core = ini.section(Some("core")).ok_or_else(|| Error::InvalidConfig {
            path: path.to_path_buf(),
            message: "missing [core] section".into(),
        })?;

        let repo_version = core
            .get("repo_version")
            .unwrap_or("1")
            .parse()
            .map_err(|_| Error::InvalidConfig {
                path: path.to_path_buf(),
                message: "repo_version must be an integer".into(),
            })?;
        let mode = RepoMode::parse(core.get("mode").unwrap_or("bare"))?;
        let parent = core.get("parent").map(PathBuf::from);
        let fsync = parse_bool(core.get("fsync").unwrap_or("true"), path)?;
        let enable_uncompressed_cache =
            parse_bool(core.get("enable-uncompressed-cache").unwrap_or("false"), path)?;
        let tombstone_commits =
            parse_bool(core.get("tombstone-commits").unwrap_or("false"), path)?;
        let tmp_expiry_secs = core
            .get("tmp-expiry-secs")
            .unwrap_or("86400")
            .parse()
            .map_err(|_| Error::InvalidConfig {
                path: path.to_path_buf(),
                message: "tmp-expiry-secs must be an integer".into(),
            })?;

        Ok(Self {
            repo_version,
            mode,
            parent,
            fsync,
            enable_uncompressed_cache,
            tombstone_commits,
            tmp_expiry_secs,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        ini.with_section(Some("core"))
            .set("repo_version", self.repo_version.to_string())
            .set("mode", self.mode.as_str())
            .set("fsync", self.fsync.to_string())
            .set(
                "enable-uncompressed-cache",
                self.enable_uncompressed_cache.to_string(),
            )
            .set("tombstone-commits", self.tombstone_commits.to_string())
            .set("tmp-expiry-secs", self.tmp_expiry_secs.to_string());
        if let Some(parent) = &self.parent {
            ini.with_section(Some("core"))
                .set("parent", parent.to_string_lossy().to_string());
        }
        ini.write_to_file(path).with_path(path)?;
        Ok(())
    }
}

fn parse_bool(s: &str, path: &Path) -> Result<bool> {
    match s {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("expected boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_ini_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");

        let mut config = Config::new(RepoMode::BareUser);
        config.tombstone_commits = true;
        config.tmp_expiry_secs = 3600;
        config.save(&path).unwrap();

        let parsed = Config::load(&path).unwrap();
        assert_eq!(parsed.mode, RepoMode::BareUser);
        assert!(parsed.tombstone_commits);
        assert_eq!(parsed.tmp_expiry_secs, 3600);
    }

    #[test]
    fn test_default_mode_is_bare() {
        let config = Config::default();
        assert_eq!(config.mode, RepoMode::Bare);
        assert!(config.fsync);
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "[core]\nrepo_version = 1\nmode = bogus\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::InvalidMode(_))));
    }

    #[test]
    fn test_parent_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        let mut config = Config::default();
        config.parent = Some(PathBuf::from("/var/lib/repos/base"));
        config.save(&path).unwrap();

        let parsed = Config::load(&path).unwrap();
        assert_eq!(parsed.parent, Some(PathBuf::from("/var/lib/repos/base")));
    }
}
