//! Path validation ahead of a session.
//!
//! Validation is advisory: it runs before the host opens a session and has no
//! side effects. A file that changes between validation and use surfaces as an
//! error from the failing operation instead.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::access::{platform_access, AccessCheck};
use idpjson_common::{Error, OperationKind, Result};

/// Checks that a path can serve a given operation.
pub struct PathValidator {
    access: Arc<dyn AccessCheck>,
}

impl PathValidator {
    /// Create a validator using the platform access check.
    pub fn new() -> Self {
        Self {
            access: platform_access(),
        }
    }

    /// Create a validator with a custom access check.
    pub fn with_access(access: Arc<dyn AccessCheck>) -> Self {
        Self { access }
    }

    /// Validate `path` for `op`.
    ///
    /// `field` names the configuration field the path came from and is
    /// reported when the path is blank.
    ///
    /// # Errors
    /// - `MissingPath` if `path` is empty
    /// - `NotFound` if the source file, or the destination's parent, is absent
    /// - `InvalidArgument` if a path component is not a directory, or the
    ///   target itself is a directory
    /// - `PermissionDenied` if the OS would refuse the access
    pub fn validate(&self, path: &Path, field: &'static str, op: OperationKind) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(Error::MissingPath { field });
        }

        if op.reads_source() {
            self.check_readable(path)?;
        }
        if op.writes_file() {
            self.check_writable(path)?;
        }

        debug!(
            "Validated {} path {} with {} access check",
            op,
            path.display(),
            self.access.name()
        );
        Ok(())
    }

    /// The source must exist, be a file, and be readable.
    fn check_readable(&self, path: &Path) -> Result<()> {
        let metadata = fs::metadata(path).map_err(|source| match source.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
                reason: source.to_string(),
            },
            _ => Error::NotFound {
                path: path.to_path_buf(),
                source,
            },
        })?;

        if metadata.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "'{}' is a directory",
                path.display()
            )));
        }

        self.require_read(path, &metadata)
    }

    /// The target must be writable if it exists, and its parent directory
    /// must exist and accept new entries either way: files are replaced by
    /// renaming a sibling temp file over them.
    fn check_writable(&self, path: &Path) -> Result<()> {
        let target = resolve_links(path)?;
        match fs::metadata(&target) {
            Ok(metadata) => {
                if metadata.is_dir() {
                    return Err(Error::InvalidArgument(format!(
                        "'{}' is a directory",
                        path.display()
                    )));
                }
                self.require_write(&target, &metadata)?;
                self.check_parent(&target)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                self.check_parent(&target)
            }
            Err(e) => Err(Error::from_io(path, e)),
        }
    }

    fn check_parent(&self, path: &Path) -> Result<()> {
        let parent = parent_dir(path);

        let metadata = match fs::metadata(parent) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => {
                return Err(not_a_directory(parent));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    path: parent.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => return Err(Error::from_io(parent, e)),
        };

        if !metadata.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "'{}' is not a directory",
                parent.display()
            )));
        }

        self.require_write(parent, &metadata)
    }

    fn require_read(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        self.access
            .check_read(path, metadata)
            .map_err(|e| Error::PermissionDenied {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn require_write(&self, path: &Path, metadata: &Metadata) -> Result<()> {
        self.access
            .check_write(path, metadata)
            .map_err(|e| Error::PermissionDenied {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl Default for PathValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory that holds `path`; a bare file name lives in the current directory.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Follow symbolic links until `path` names something that is not a link.
///
/// Dangling links resolve to the path they point at, so a write through
/// them creates the missing file.
pub fn resolve_links(path: &Path) -> Result<PathBuf> {
    let mut target = path.to_path_buf();
    for _ in 0..MAX_LINK_DEPTH {
        match fs::symlink_metadata(&target) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let link = fs::read_link(&target).map_err(|e| Error::from_io(&target, e))?;
                target = parent_dir(&target).join(link);
            }
            _ => return Ok(target),
        }
    }
    Err(Error::InvalidArgument(format!(
        "too many levels of symbolic links in '{}'",
        path.display()
    )))
}

const MAX_LINK_DEPTH: usize = 40;

fn not_a_directory(path: &Path) -> Error {
    Error::InvalidArgument(format!(
        "a component of '{}' is not a directory",
        path.display()
    ))
}
