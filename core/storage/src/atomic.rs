//! Atomic file replacement.
//!
//! Content is written to a uniquely named temp file next to the destination,
//! flushed and synced, then renamed over the destination. Readers see either
//! the old file or the new one, never a truncated mix.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::validator::{parent_dir, resolve_links};
use idpjson_common::{Error, Result};

/// Replace the contents of `path` with `contents`.
///
/// A symbolic link at `path` is followed, so the file it points to is
/// replaced and the link itself stays in place. The replacement is a new
/// file: it keeps the old mode bits but is owned by the writing process.
///
/// # Postconditions
/// - On success `path` holds exactly `contents`; an existing file keeps its
///   permissions
/// - On failure `path` is untouched and no temp file is left behind
///
/// # Errors
/// - `NotFound` / `PermissionDenied` if the directory cannot take the file
/// - `Io` for write, sync or rename failures
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let target = resolve_links(path)?;
    let file_name = target.file_name().ok_or_else(|| {
        Error::InvalidArgument(format!("'{}' does not name a file", path.display()))
    })?;
    let tmp_path = parent_dir(&target).join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4()
    ));

    let result = write_then_rename(path, &target, &tmp_path, contents);
    if result.is_err() && tmp_path.exists() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("Failed to remove temp file {}: {}", tmp_path.display(), e);
        }
    }
    result
}

/// `path` is the destination as configured and is the one named in errors;
/// `target` is where the link chain behind it ends.
fn write_then_rename(path: &Path, target: &Path, tmp_path: &Path, contents: &[u8]) -> Result<()> {
    let file = File::create(tmp_path).map_err(|e| Error::from_io(path, e))?;

    let mut writer = BufWriter::new(file);
    writer.write_all(contents)?;
    let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);

    if let Ok(existing) = fs::metadata(target) {
        fs::set_permissions(tmp_path, existing.permissions())?;
    }

    fs::rename(tmp_path, target).map_err(|e| Error::from_io(path, e))?;

    debug!("Wrote {} bytes to {}", contents.len(), target.display());
    Ok(())
}
