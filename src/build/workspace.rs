//! Per-build temporary workspaces.
//!
//! Each job gets its own uniquely named directory, so concurrent builds of
//! the same repository never see each other's files. The directory is removed
//! when the job finishes unless it is kept for a dry-run post-mortem.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Prefix of every workspace directory name.
const WORKSPACE_PREFIX: &str = "gh2lp-";

/// An exclusively owned temporary build directory.
///
/// Dropping a workspace without calling [`BuildWorkspace::finish`] removes it
/// silently.
#[derive(Debug)]
pub struct BuildWorkspace {
    dir: TempDir,
}

impl BuildWorkspace {
    /// Creates a workspace under the system temporary directory, suffixed with
    /// the repository name.
    pub fn create(repository: &str) -> io::Result<Self> {
        Self::create_in(&std::env::temp_dir(), repository)
    }

    /// Creates a workspace under `base` instead of the system temporary directory.
    pub fn create_in(base: &Path, repository: &str) -> io::Result<Self> {
        let suffix = format!("-{repository}");
        tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .suffix(&suffix)
            .tempdir_in(base)
            .map(|dir| BuildWorkspace { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Ends the workspace's life.
    ///
    /// With `keep` the directory stays on disk and its path is returned;
    /// otherwise it is removed recursively.
    pub fn finish(self, keep: bool) -> io::Result<Option<PathBuf>> {
        if keep {
            Ok(Some(self.dir.keep()))
        } else {
            self.dir.close().map(|()| None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn name_carries_repository_suffix() {
        let base = tempdir().unwrap();
        let ws = BuildWorkspace::create_in(base.path(), "yavdr-base").unwrap();

        let name = ws.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with(WORKSPACE_PREFIX));
        assert!(name.ends_with("-yavdr-base"));
        assert!(ws.path().is_dir());
    }

    #[test]
    fn two_workspaces_for_same_repo_are_distinct() {
        let base = tempdir().unwrap();
        let a = BuildWorkspace::create_in(base.path(), "repo").unwrap();
        let b = BuildWorkspace::create_in(base.path(), "repo").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn finish_removes_directory_tree() {
        let base = tempdir().unwrap();
        let ws = BuildWorkspace::create_in(base.path(), "repo").unwrap();
        let path = ws.path().to_path_buf();
        std::fs::create_dir_all(path.join("src/debian")).unwrap();
        std::fs::write(path.join("src/debian/changelog"), "x").unwrap();

        assert_eq!(ws.finish(false).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn finish_with_keep_leaves_directory() {
        let base = tempdir().unwrap();
        let ws = BuildWorkspace::create_in(base.path(), "repo").unwrap();
        let path = ws.path().to_path_buf();

        assert_eq!(ws.finish(true).unwrap(), Some(path.clone()));
        assert!(path.is_dir());
    }
}
