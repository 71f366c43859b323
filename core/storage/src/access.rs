//! OS permission checks.
//!
//! [`PosixAccess`] asks the kernel through `access(2)`, which honours the
//! real user, group membership and ACLs. [`ModeBitsAccess`] only looks at
//! the owner/group/other permission bits in the file metadata: it reports
//! "readable" when any read bit is set and "writable" when any write bit is
//! set. That is an approximation, not an ACL check, and is used where no
//! native access call exists.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Permission probe used by the path validator.
pub trait AccessCheck: Send + Sync {
    /// Name of the implementation, for logs.
    fn name(&self) -> &str;

    /// Check that `path` may be opened for reading.
    fn check_read(&self, path: &Path, metadata: &Metadata) -> io::Result<()>;

    /// Check that `path` may be written, or for a directory, that entries
    /// may be created in it.
    fn check_write(&self, path: &Path, metadata: &Metadata) -> io::Result<()>;
}

/// Pick the access check for the platform this binary was built for.
pub fn platform_access() -> Arc<dyn AccessCheck> {
    #[cfg(unix)]
    {
        Arc::new(PosixAccess)
    }
    #[cfg(not(unix))]
    {
        Arc::new(ModeBitsAccess)
    }
}

/// `access(2)` based check for POSIX systems.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixAccess;

#[cfg(unix)]
impl PosixAccess {
    fn access(path: &Path, mode: libc::c_int) -> io::Result<()> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte")
        })?;

        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        let rc = unsafe { libc::access(c_path.as_ptr(), mode) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(unix)]
impl AccessCheck for PosixAccess {
    fn name(&self) -> &str {
        "posix"
    }

    fn check_read(&self, path: &Path, _metadata: &Metadata) -> io::Result<()> {
        Self::access(path, libc::R_OK)
    }

    fn check_write(&self, path: &Path, _metadata: &Metadata) -> io::Result<()> {
        Self::access(path, libc::W_OK)
    }
}

/// Permission-bit approximation for platforms without `access(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeBitsAccess;

const READ_BITS: u32 = 0o444;
const WRITE_BITS: u32 = 0o222;

impl ModeBitsAccess {
    #[cfg(unix)]
    fn mode(metadata: &Metadata) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode()
    }

    // Only the read-only flag is available; treat it as clearing every write bit.
    #[cfg(not(unix))]
    fn mode(metadata: &Metadata) -> u32 {
        if metadata.permissions().readonly() {
            0o555
        } else {
            0o777
        }
    }
}

impl AccessCheck for ModeBitsAccess {
    fn name(&self) -> &str {
        "mode-bits"
    }

    fn check_read(&self, _path: &Path, metadata: &Metadata) -> io::Result<()> {
        if Self::mode(metadata) & READ_BITS == 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot access for read",
            ));
        }
        Ok(())
    }

    fn check_write(&self, _path: &Path, metadata: &Metadata) -> io::Result<()> {
        if Self::mode(metadata) & WRITE_BITS == 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot access for write",
            ));
        }
        Ok(())
    }
}
