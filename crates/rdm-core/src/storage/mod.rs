//! Staging file lifecycle.
//!
//! A download is written to `<destination>.part`, appended to across attempts,
//! and atomically renamed onto the destination once verified. The final path
//! is never opened for writing.

mod partial;
mod writer;

use std::io;
use std::path::{Path, PathBuf};

pub use partial::PartialFile;
pub use writer::StagingWriter;

/// Staging file suffix used before atomic rename.
pub const STAGING_SUFFIX: &str = ".part";

/// Path for the staging file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn staging_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(STAGING_SUFFIX);
    PathBuf::from(o)
}

/// Create the destination's parent directory (recursively) if it is missing.
/// Fails when the parent path exists but is not a directory.
pub fn ensure_parent_dir(final_path: &Path) -> io::Result<()> {
    match final_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
            std::fs::create_dir_all(dir)?;
            tracing::debug!(dir = %dir.display(), "created destination directory");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_path_appends_part() {
        let p = staging_path(Path::new("file.iso"));
        assert_eq!(p.to_string_lossy(), "file.iso.part");
        let p2 = staging_path(Path::new("/tmp/archive.zip"));
        assert_eq!(p2.to_string_lossy(), "/tmp/archive.zip.part");
    }

    #[test]
    fn ensure_parent_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a").join("b").join("out.bin");
        ensure_parent_dir(&dest).unwrap();
        assert!(dest.parent().unwrap().is_dir());
        // Bare file names have no directory to create.
        ensure_parent_dir(Path::new("out.bin")).unwrap();
    }

    #[test]
    fn ensure_parent_dir_rejects_file_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        assert!(ensure_parent_dir(&blocker.join("out.bin")).is_err());
        assert!(ensure_parent_dir(&blocker.join("sub").join("out.bin")).is_err());
    }
}
