//! rootstore - content-addressed object store for UNIX rootfs trees
//!
//! a git-like object store built for composing and updating Linux system
//! images: every file, directory, and commit is addressed by the SHA-256 of
//! its own canonical, uncompressed serialization, independent of whatever
//! compression the repository's storage mode applies on disk.
//!
//! # Core concepts
//!
//! - **File object**: content-addressed file data (uid/gid/mode/xattrs plus
//!   payload, optionally zlib-compressed on disk in archive mode)
//! - **Dir tree / dir meta**: a directory's entries and its own metadata,
//!   stored as two separate objects so renaming a file's mode doesn't
//!   reshuffle the whole tree
//! - **Commit**: a named point in history over a root tree/meta pair, with
//!   an optional parent and an opaque metadata dict
//! - **Ref**: a named pointer to a commit, hierarchical like git branches
//! - **Static delta**: a precomputed, content-addressed diff between two
//!   commits that can be applied entirely offline
//!
//! # Example usage
//!
//! ```no_run
//! use rootstore::{Repo, RepoMode};
//! use rootstore::mtree::stage_directory;
//! use rootstore::object::Commit;
//! use std::path::Path;
//!
//! let repo = Repo::init(Path::new("/path/to/repo"), RepoMode::Bare).unwrap();
//!
//! let staged = stage_directory(Path::new("/source"), RepoMode::Bare).unwrap();
//! let (tree, meta) = staged.write(&repo).unwrap();
//! let commit = Commit::new(None, "initial", "", 0, tree, meta);
//! let commit_id = rootstore::loader::store_commit(&repo, &commit).unwrap();
//! rootstore::refs::write_ref(&repo, "my/ref", &commit_id).unwrap();
//! ```

mod config;
mod error;
mod hash;

pub mod checkout;
pub mod delta;
pub mod fs;
pub mod loader;
pub mod mtree;
pub mod object;
pub mod refs;
pub mod repo;
pub mod store;
pub mod types;
pub mod varint;

pub use config::{Config, RepoMode};
pub use error::{Error, Result};
pub use hash::{Hash, StreamHasher};
pub use repo::{Repo, RepoLock};
pub use types::{ChangeKind, DiffEntry, SparseRegion, Xattr};
