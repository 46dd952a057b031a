//! Named file locks gating tick execution.
//!
//! Each tick kind (monitor, rotate) has its own lock file under `state/`.
//! An external timer firing while the previous tick still runs must not
//! queue: acquisition is non-blocking, and a busy lock is reported as a
//! skip, not an error.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::warn;

use crate::error::SteerError;

/// An exclusive advisory lock on `state/<name>.lock`.
///
/// Released on drop, on every exit path.
#[derive(Debug)]
pub struct TickLock {
    file: File,
    name: String,
}

impl TickLock {
    /// Try to take the named lock without blocking.
    ///
    /// Returns `Ok(None)` when another process holds it; the caller logs
    /// and treats the tick as already running.
    pub fn try_acquire(state_dir: &Path, name: &str) -> Result<Option<Self>, SteerError> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                name: name.to_string(),
            })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!(lock = name, "tick already running, skipping");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TickLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(lock = %self.name, "failed to release tick lock: {e}");
        }
    }
}
