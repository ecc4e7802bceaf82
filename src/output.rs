//! Persisting resolved keys to an authorized_keys file.

use std::fs::{File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt, fchown};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

/// Owner read/write only
pub const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// What happened while writing the file. Nothing here is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub path: PathBuf,
    pub written: bool,
    pub permissions_set: bool,
    pub ownership_set: bool,
}

impl PersistReport {
    pub fn is_complete(&self) -> bool {
        self.written && self.permissions_set && self.ownership_set
    }
}

/// Create or truncate `path`. A new file is created with
/// `AUTHORIZED_KEYS_MODE`; an existing file keeps its mode until chmod.
fn open_restricted(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(AUTHORIZED_KEYS_MODE)
        .open(path)
}

/// Create or truncate `path`, write `text`, restrict its mode and give it
/// the owner of the containing directory.
///
/// Later steps are still attempted when chmod fails. Nothing is rolled back.
pub fn write_authorized_keys(path: &Path, text: &[u8]) -> PersistReport {
    let mut report = PersistReport {
        path: path.to_path_buf(),
        written: false,
        permissions_set: false,
        ownership_set: false,
    };

    let mut file = match open_restricted(path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to create authorized_keys file at {}: {}", path.display(), e);
            return report;
        }
    };

    if let Err(e) = file.write_all(text).and_then(|_| file.flush()) {
        error!("Failed to write authorized_keys file to {}: {}", path.display(), e);
        return report;
    }
    report.written = true;

    match file.set_permissions(Permissions::from_mode(AUTHORIZED_KEYS_MODE)) {
        Ok(()) => report.permissions_set = true,
        Err(e) => warn!("Failed to change file permissions on {}: {}", path.display(), e),
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let metadata = match std::fs::metadata(parent) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Failed to stat {}: {}", parent.display(), e);
            return report;
        }
    };

    let (uid, gid) = (metadata.uid(), metadata.gid());
    match fchown(&file, Some(uid), Some(gid)) {
        Ok(()) => report.ownership_set = true,
        Err(e) => warn!(
            "Failed to set file ownership on {} to {}:{}: {}",
            path.display(),
            uid,
            gid,
            e
        ),
    }

    debug!("Wrote {} bytes to {}", text.len(), path.display());
    report
}
