//! Advisory lock on `<index>/write.lock`, shared by every handle and
//! process that writes to the same index directory.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Held until dropped.
#[derive(Debug)]
pub(crate) struct WriteLock {
    file: File,
}

impl WriteLock {
    /// Poll for the exclusive lock for up to `timeout`. A zero timeout tries
    /// exactly once.
    pub(crate) fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new().create(true).read(true).write(true).truncate(false).open(path)?;
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(Self { file }),
                Err(e) if is_contended(&e) => {
                    let now = Instant::now();
                    match deadline {
                        Some(d) if now >= d => return Err(Error::WriterBusy(timeout)),
                        Some(d) => thread::sleep(POLL_INTERVAL.min(d - now)),
                        None => thread::sleep(POLL_INTERVAL),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(error = %e, "could not release write lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_waits_then_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("write.lock");
        let held = WriteLock::acquire(&path, Duration::ZERO).unwrap();
        assert!(matches!(WriteLock::acquire(&path, Duration::from_millis(30)), Err(Error::WriterBusy(_))));
        drop(held);
        assert!(WriteLock::acquire(&path, Duration::ZERO).is_ok());
    }
}
