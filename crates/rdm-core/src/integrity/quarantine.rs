use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{Checksum, ChecksumError};

const QUARANTINE_DIR: &str = "quarantine";

/// Result of checking a published file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityVerdict {
    Verified,
    /// Hash differed; the file now lives at `moved_to`.
    Quarantined { actual: String, moved_to: PathBuf },
}

/// `<dir of file>/quarantine`.
pub fn quarantine_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(QUARANTINE_DIR),
        _ => PathBuf::from(QUARANTINE_DIR),
    }
}

/// Move `file` into its quarantine directory and return the new path.
/// An earlier quarantined file of the same name is kept; `.1`, `.2`, ... are appended.
pub fn quarantine(file: &Path) -> io::Result<PathBuf> {
    let name = file.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", file.display()),
        )
    })?;
    let dir = quarantine_dir(file);
    fs::create_dir_all(&dir)?;

    let mut target = dir.join(name);
    let mut n = 1u32;
    while target.exists() {
        let mut numbered = name.to_os_string();
        numbered.push(format!(".{}", n));
        target = dir.join(numbered);
        n += 1;
    }
    fs::rename(file, &target)?;
    tracing::warn!(from = %file.display(), to = %target.display(), "file quarantined");
    Ok(target)
}

/// Verify `file` and quarantine it on mismatch.
pub fn verify_or_quarantine(file: &Path, expected: &Checksum) -> Result<IntegrityVerdict, ChecksumError> {
    let actual = expected.compute(file)?;
    if actual == expected.hex() {
        tracing::info!(file = %file.display(), algorithm = %expected.algorithm(), "checksum verified");
        return Ok(IntegrityVerdict::Verified);
    }
    tracing::warn!(file = %file.display(), expected = expected.hex(), actual = %actual, "checksum mismatch");
    let moved_to = quarantine(file).map_err(|source| ChecksumError::Quarantine {
        path: file.to_path_buf(),
        source,
    })?;
    Ok(IntegrityVerdict::Quarantined { actual, moved_to })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "sha256:5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn matching_file_stays_put() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello\n").unwrap();
        let c = Checksum::parse(HELLO_SHA256).unwrap();
        assert_eq!(verify_or_quarantine(&file, &c).unwrap(), IntegrityVerdict::Verified);
        assert!(file.exists());
        assert!(!quarantine_dir(&file).exists());
    }

    #[test]
    fn mismatch_moves_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"tampered\n").unwrap();
        let c = Checksum::parse(HELLO_SHA256).unwrap();
        match verify_or_quarantine(&file, &c).unwrap() {
            IntegrityVerdict::Quarantined { moved_to, actual } => {
                assert_eq!(moved_to, dir.path().join("quarantine").join("a.txt"));
                assert_ne!(actual, c.hex());
                assert_eq!(fs::read(&moved_to).unwrap(), b"tampered\n");
            }
            other => panic!("expected quarantine, got {:?}", other),
        }
        assert!(!file.exists());
    }

    #[test]
    fn existing_quarantined_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("img.iso");
        fs::write(&file, b"one").unwrap();
        let first = quarantine(&file).unwrap();
        fs::write(&file, b"two").unwrap();
        let second = quarantine(&file).unwrap();
        assert_eq!(second, dir.path().join("quarantine").join("img.iso.1"));
        assert_eq!(fs::read(first).unwrap(), b"one");
        assert_eq!(fs::read(second).unwrap(), b"two");
    }

    #[test]
    fn bare_file_name_uses_relative_dir() {
        assert_eq!(quarantine_dir(Path::new("x.bin")), PathBuf::from("quarantine"));
    }
}
