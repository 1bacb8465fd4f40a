//! the checkout engine (§4.4): materializes a commit's tree into a real
//! directory, hardlinking loose objects into place whenever the repo mode
//! allows it and falling back to copying the content out otherwise.

mod cache;

pub use cache::{gc_uncompressed_cache, UncompressedCacheStats};

use std::path::Path;

use crate::config::RepoMode;
use crate::error::{Error, Result};
use crate::fs::{apply_metadata, create_directory, create_hardlink, create_symlink};
use crate::hash::Hash;
use crate::loader;
use crate::object::{DirTree, FileHeader};
use crate::repo::Repo;

/// how an already-existing destination should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverwriteMode {
    /// refuse if the destination already has conflicting content.
    #[default]
    None,
    /// replace individual files in place, keeping everything else that's
    /// already there (used to layer one commit's files onto a live tree).
    UnionFiles,
}

#[derive(Clone, Copy, Debug)]
pub struct CheckoutOptions {
    /// whether checked-out files should carry real uid/gid/mode
    /// (`"user"` skips chown, appropriate for unprivileged bare-user
    /// checkouts).
    pub user_mode: bool,
    pub overwrite: OverwriteMode,
    /// in archive mode, also populate the uncompressed-object cache so a
    /// later checkout of the same file can hardlink instead of
    /// decompressing again.
    pub enable_uncompressed_cache: bool,
    /// if hardlinking isn't possible, fail instead of copying.
    pub no_copy_fallback: bool,
    /// delete files whose name starts with `.wh.` instead of checking them
    /// out, removing the whited-out sibling if present (overlay-style
    /// union checkouts).
    pub process_whiteouts: bool,
    pub disable_fsync: bool,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            user_mode: false,
            overwrite: OverwriteMode::None,
            enable_uncompressed_cache: false,
            no_copy_fallback: false,
            process_whiteouts: false,
            disable_fsync: false,
        }
    }
}

const WHITEOUT_PREFIX: &str = ".wh.";

/// check out `tree`/`meta` (a commit's root, or any subtree) into `dest`.
pub fn checkout_tree(
    repo: &Repo,
    tree: &DirTree,
    uid: u32,
    gid: u32,
    mode: u32,
    xattrs: &[crate::types::Xattr],
    dest: &Path,
    opts: CheckoutOptions,
) -> Result<()> {
    let exists = dest.is_dir();
    if exists && opts.overwrite == OverwriteMode::None && has_entries(dest)? {
        return Err(Error::TargetNotEmpty(dest.to_path_buf()));
    }

    tracing::debug!(
        dest = %dest.display(),
        files = tree.files.len(),
        dirs = tree.dirs.len(),
        "checking out tree"
    );

    create_directory(dest, uid, gid, mode, xattrs)?;

    for entry in &tree.files {
        if opts.process_whiteouts {
            if let Some(target_name) = entry.name.strip_prefix(WHITEOUT_PREFIX) {
                let victim = dest.join(target_name);
                if victim.exists() || victim.symlink_metadata().is_ok() {
                    std::fs::remove_file(&victim)
                        .or_else(|_| std::fs::remove_dir_all(&victim))
                        .map_err(|e| Error::Io {
                            path: victim.clone(),
                            source: e,
                        })?;
                }
                continue;
            }
        }
        checkout_file(repo, &entry.checksum, &dest.join(&entry.name), opts)?;
    }

    for entry in &tree.dirs {
        let child_tree = loader::load_dirtree(repo, &entry.tree_checksum)?;
        let child_meta = loader::load_dirmeta(repo, &entry.meta_checksum)?;
        checkout_tree(
            repo,
            &child_tree,
            child_meta.uid,
            child_meta.gid,
            child_meta.mode,
            &child_meta.xattrs,
            &dest.join(&entry.name),
            opts,
        )?;
    }

    Ok(())
}

fn has_entries(dir: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(dir)
        .map_err(|e| Error::Io {
            path: dir.to_path_buf(),
            source: e,
        })?
        .next()
        .is_some())
}

/// check out a single file object to `dest`, hardlinking from the loose
/// object store when the repo mode stores the content uncompressed, and
/// from the uncompressed cache otherwise.
fn checkout_file(repo: &Repo, id: &Hash, dest: &Path, opts: CheckoutOptions) -> Result<()> {
    if opts.overwrite == OverwriteMode::UnionFiles && dest.exists() {
        std::fs::remove_file(dest).map_err(|e| Error::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
    }

    match repo.mode() {
        RepoMode::Bare => checkout_via_hardlink(repo, id, dest, opts),
        RepoMode::BareUser => checkout_bare_user(repo, id, dest, opts),
        RepoMode::Archive => checkout_via_cache_or_copy(repo, id, dest, opts),
    }
}

/// bare-user checkout (§3.4, §4.4). `mode=user` hardlinks the loose object
/// directly: its on-disk owner is already the invoking process and its true
/// ownership travels along with the shared inode's `user.ostreemeta` xattr,
/// same as the table's `(bare-user repo, mode=user)` entry. `mode=none`
/// asks for the real owner to be restored, which a hardlink to the
/// forced-invoker object can't give us — it copies the content instead and
/// applies uid/gid/mode/xattrs recovered from that xattr.
fn checkout_bare_user(repo: &Repo, id: &Hash, dest: &Path, opts: CheckoutOptions) -> Result<()> {
    if opts.user_mode {
        return checkout_via_hardlink(repo, id, dest, opts);
    }

    let header = loader::load_file_header(repo, id)?;
    if header.is_symlink() {
        return write_symlink(repo, &header, dest, opts);
    }

    let src = crate::store::object_path(repo, crate::object::ObjectType::File, id);
    let (uid, gid, mode, xattrs) =
        crate::fs::read_bare_user_ownership(&src)?.ok_or_else(|| Error::Xattr {
            path: src.clone(),
            message: "bare-user loose object missing user.ostreemeta xattr".to_string(),
        })?;

    let obj = loader::load_file(repo, id)?;
    std::fs::write(dest, &obj.payload).map_err(|e| Error::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    crate::fs::apply_metadata(dest, uid, gid, mode, &xattrs)
}

fn checkout_via_hardlink(repo: &Repo, id: &Hash, dest: &Path, opts: CheckoutOptions) -> Result<()> {
    let src = crate::store::object_path(repo, crate::object::ObjectType::File, id);
    let header = loader::load_file_header(repo, id)?;

    if header.is_symlink() {
        return write_symlink(repo, &header, dest, opts);
    }

    match create_hardlink(dest, &src) {
        Ok(()) => Ok(()),
        Err(_) if opts.no_copy_fallback => Err(Error::NoCopyFallback),
        Err(_) => write_regular_copy(repo, id, &header, dest, opts),
    }
}

fn checkout_via_cache_or_copy(repo: &Repo, id: &Hash, dest: &Path, opts: CheckoutOptions) -> Result<()> {
    let header = loader::load_file_header(repo, id)?;
    if header.is_symlink() {
        return write_symlink(repo, &header, dest, opts);
    }

    // the uncompressed-cache hardlink path only applies to user-mode
    // checkouts (§4.4 step 2) — a mode=none checkout needs real per-object
    // ownership, which the shared, setuid-stripped cache entry can't give.
    if opts.enable_uncompressed_cache && opts.user_mode {
        let cached = cache::cache_path(repo, id);
        if !cached.is_file() {
            let obj = loader::load_file(repo, id)?;
            cache::populate(repo, id, &obj.payload)?;
        }
        match create_hardlink(dest, &cached) {
            Ok(()) => return apply_owner(repo, &header, dest, opts),
            Err(_) if opts.no_copy_fallback => return Err(Error::NoCopyFallback),
            Err(_) => {}
        }
    }

    write_regular_copy(repo, id, &header, dest, opts)
}

fn write_regular_copy(
    repo: &Repo,
    id: &Hash,
    header: &FileHeader,
    dest: &Path,
    opts: CheckoutOptions,
) -> Result<()> {
    let obj = loader::load_file(repo, id)?;
    std::fs::write(dest, &obj.payload).map_err(|e| Error::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    let _ = repo;
    apply_owner(repo, header, dest, opts)
}

fn write_symlink(repo: &Repo, header: &FileHeader, dest: &Path, opts: CheckoutOptions) -> Result<()> {
    let target = header
        .symlink_target
        .as_deref()
        .expect("caller only reaches here for symlink headers");
    let uid = if opts.user_mode { 0 } else { header.uid };
    let gid = if opts.user_mode { 0 } else { header.gid };
    create_symlink(dest, target, uid, gid, &header.xattrs)?;
    let _ = repo;
    Ok(())
}

fn apply_owner(repo: &Repo, header: &FileHeader, dest: &Path, opts: CheckoutOptions) -> Result<()> {
    let _ = repo;
    if opts.user_mode {
        // unprivileged checkout: keep the current process's uid/gid, rely on
        // the object store's own metadata as the source of truth for
        // ownership rather than trying (and failing) to chown.
        return Ok(());
    }
    apply_metadata(dest, header.uid, header.gid, header.mode, &header.xattrs)
}

/// shared subpath checkout: resolve `subpath` inside `tree` and check out
/// only that subtree.
pub fn checkout_subpath(
    repo: &Repo,
    tree: &DirTree,
    root_meta: &crate::object::DirMeta,
    subpath: &str,
    dest: &Path,
    opts: CheckoutOptions,
) -> Result<()> {
    let components: Vec<&str> = subpath.split('/').filter(|c| !c.is_empty()).collect();
    resolve_and_checkout(repo, tree, root_meta, &components, dest, opts)
}

fn resolve_and_checkout(
    repo: &Repo,
    tree: &DirTree,
    meta: &crate::object::DirMeta,
    components: &[&str],
    dest: &Path,
    opts: CheckoutOptions,
) -> Result<()> {
    let Some((head, rest)) = components.split_first() else {
        return checkout_tree(repo, tree, meta.uid, meta.gid, meta.mode, &meta.xattrs, dest, opts);
    };

    if rest.is_empty() {
        if let Some(file) = tree.files.iter().find(|f| f.name == *head) {
            return checkout_file(repo, &file.checksum, dest, opts);
        }
    }
    let dir_entry = tree
        .dirs
        .iter()
        .find(|d| d.name == *head)
        .ok_or_else(|| Error::PathNotFound(components.join("/")))?;
    let child_tree = loader::load_dirtree(repo, &dir_entry.tree_checksum)?;
    let child_meta = loader::load_dirmeta(repo, &dir_entry.meta_checksum)?;
    resolve_and_checkout(repo, &child_tree, &child_meta, rest, dest, opts)
}
