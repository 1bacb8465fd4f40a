//! manual smoke test: stage a throwaway directory, commit it, check it back
//! out, and print what happened. not a CLI — there's no argument parsing
//! here on purpose. run with `cargo run` against a scratch directory to
//! eyeball that the object store, staging, and checkout engine agree with
//! each other end to end.

use rootstore::checkout::{checkout_tree, CheckoutOptions};
use rootstore::mtree::stage_directory;
use rootstore::object::Commit;
use rootstore::{loader, refs, Repo, RepoMode};

fn main() -> rootstore::Result<()> {
    tracing_subscriber::fmt::init();

    let work = tempfile_dir()?;
    let repo_path = work.join("repo");
    let source_path = work.join("source");
    let checkout_path = work.join("checkout");

    std::fs::create_dir_all(&source_path).map_err(|e| rootstore::Error::Io {
        path: source_path.clone(),
        source: e,
    })?;
    std::fs::write(source_path.join("hello.txt"), b"hello, rootstore\n").map_err(|e| {
        rootstore::Error::Io {
            path: source_path.clone(),
            source: e,
        }
    })?;
    std::fs::create_dir_all(source_path.join("sub")).map_err(|e| rootstore::Error::Io {
        path: source_path.clone(),
        source: e,
    })?;
    std::fs::write(source_path.join("sub/nested.txt"), b"nested content\n").map_err(|e| {
        rootstore::Error::Io {
            path: source_path.clone(),
            source: e,
        }
    })?;

    tracing::info!(path = %repo_path.display(), "initializing repository");
    let repo = Repo::init(&repo_path, RepoMode::Bare)?;

    let staged = stage_directory(&source_path, repo.mode())?;
    let (root_tree, root_meta) = staged.write(&repo)?;

    let commit = Commit::new(None, "smoke test commit", "", 0, root_tree, root_meta);
    let commit_id = loader::store_commit(&repo, &commit)?;
    refs::write_ref(&repo, "smoke", &commit_id)?;
    tracing::info!(commit = %commit_id, "committed source tree");

    let landed = refs::resolve_ref(&repo, "smoke")?;
    let landed_commit = loader::load_commit(&repo, &landed)?;
    let tree = loader::load_dirtree(&repo, &landed_commit.root_tree)?;
    let meta = loader::load_dirmeta(&repo, &landed_commit.root_meta)?;

    checkout_tree(
        &repo,
        &tree,
        meta.uid,
        meta.gid,
        meta.mode,
        &meta.xattrs,
        &checkout_path,
        CheckoutOptions::default(),
    )?;
    tracing::info!(dest = %checkout_path.display(), "checked out commit");

    println!("commit:   {commit_id}");
    println!("tree:     {} files, {} dirs", tree.files.len(), tree.dirs.len());
    println!("checkout: {}", checkout_path.display());

    Ok(())
}

fn tempfile_dir() -> rootstore::Result<std::path::PathBuf> {
    let base = std::env::temp_dir().join(format!("rootstore-smoke-{}", std::process::id()));
    std::fs::create_dir_all(&base).map_err(|e| rootstore::Error::Io {
        path: base.clone(),
        source: e,
    })?;
    Ok(base)
}
