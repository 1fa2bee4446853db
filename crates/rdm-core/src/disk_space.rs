//! Free-space check for the destination volume.
//!
//! Required bytes get a safety margin (10% by default). When the volume cannot
//! be queried the guard fails open and logs a warning.

use std::io;
use std::path::Path;

/// Default safety margin added on top of the bytes still to be written.
pub const DEFAULT_MARGIN_PERCENT: u8 = 10;

/// Source of "bytes available to an unprivileged writer" for a directory.
pub trait FreeSpace: Send {
    fn available(&self, dir: &Path) -> io::Result<u64>;
}

impl<F> FreeSpace for F
where
    F: Fn(&Path) -> io::Result<u64> + Send,
{
    fn available(&self, dir: &Path) -> io::Result<u64> {
        self(dir)
    }
}

/// Queries the operating system (`statvfs` on Unix).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFreeSpace;

impl FreeSpace for SystemFreeSpace {
    #[cfg(unix)]
    fn available(&self, dir: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let r = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if r != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }

    #[cfg(not(unix))]
    fn available(&self, _dir: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free-space query not supported on this platform",
        ))
    }
}

/// Verdict of one disk-space check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceVerdict {
    Sufficient,
    Insufficient { required: u64, available: u64 },
    /// Volume could not be queried; the caller proceeds.
    Unknown,
}

pub struct DiskSpaceGuard {
    probe: Box<dyn FreeSpace>,
    margin_percent: u8,
}

impl Default for DiskSpaceGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MARGIN_PERCENT)
    }
}

impl DiskSpaceGuard {
    pub fn new(margin_percent: u8) -> Self {
        Self::with_probe(SystemFreeSpace, margin_percent)
    }

    pub fn with_probe(probe: impl FreeSpace + 'static, margin_percent: u8) -> Self {
        Self {
            probe: Box::new(probe),
            margin_percent,
        }
    }

    pub fn margin_percent(&self) -> u8 {
        self.margin_percent
    }

    /// `bytes` plus the safety margin.
    pub fn required_with_margin(&self, bytes: u64) -> u64 {
        let margin = u128::from(bytes) * u128::from(self.margin_percent) / 100;
        u64::try_from(u128::from(bytes) + margin).unwrap_or(u64::MAX)
    }

    /// Check whether `required` more bytes fit on the volume holding `destination`.
    pub fn check(&self, destination: &Path, required: u64) -> SpaceVerdict {
        if required == 0 {
            return SpaceVerdict::Sufficient;
        }
        let dir = match destination.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let available = match self.probe.available(dir) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "unable to check disk space, proceeding");
                return SpaceVerdict::Unknown;
            }
        };
        let needed = self.required_with_margin(required);
        if available < needed {
            tracing::debug!(needed, available, "disk space check failed");
            SpaceVerdict::Insufficient {
                required: needed,
                available,
            }
        } else {
            SpaceVerdict::Sufficient
        }
    }
}

impl std::fmt::Debug for DiskSpaceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskSpaceGuard")
            .field("margin_percent", &self.margin_percent)
            .finish_non_exhaustive()
    }
}
