//! CLI command implementations.

pub mod config;
pub mod dataset;
pub mod evaluate;
pub mod offline;
pub mod online;

use std::path::{Path, PathBuf};

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

/// Fail early with a hint when an input directory is missing.
pub fn require_dir(path: &Path) -> anyhow::Result<()> {
    if !path.is_dir() {
        anyhow::bail!(
            "Input directory does not exist: {:?}\n\n  Hint: Point --input at a directory of executed test files.",
            path
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_keeps_plain_paths() {
        assert_eq!(expand_path(Path::new("out/run")), PathBuf::from("out/run"));
    }

    #[test]
    fn test_require_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(require_dir(dir.path()).is_ok());
        assert!(require_dir(&dir.path().join("missing")).is_err());
    }
}
