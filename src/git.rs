//! Git repository discovery.
//!
//! Only used to pick the default location of a new store: `init` places
//! `.tasks/` at the root of the enclosing working tree when there is one.

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository};

use crate::error::{Error, Result};

/// Root of the working tree containing `start`, if any.
///
/// Bare repositories have no working tree and yield `None`.
pub fn repo_root(start: &Path) -> Result<Option<PathBuf>> {
    match Repository::discover(start) {
        Ok(repo) => Ok(repo.workdir().map(Path::to_path_buf)),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(Error::Git(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_root_from_nested_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        Repository::init(dir.path()).expect("init repo");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let root = repo_root(&nested).expect("discover").expect("root");
        assert_eq!(
            root.canonicalize().expect("canonical"),
            dir.path().canonicalize().expect("canonical")
        );
    }
}
