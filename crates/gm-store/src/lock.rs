//! Advisory locking and atomic replacement for file-backed stores.
//!
//! Writers take an exclusive lock on a `<path>.lock` sibling, stage the new
//! contents in a `<path>.tmp` sibling, and rename it into place, so readers
//! never observe a half-written database.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use gm_core::{ClassifierError, Result};

/// How long `FileLock::acquire` waits before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(20);

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive advisory lock on `<target>.lock`, held until drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Poll for the lock until `timeout` elapses.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self> {
        let path = sibling(target, ".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), "acquired file lock");
                    return Ok(Self { file, path });
                }
                Err(_) if Instant::now() < deadline => std::thread::sleep(RETRY_INTERVAL),
                Err(_) => return Err(ClassifierError::LockTimeout(path)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Replace `target` atomically: the closure fills a staged `<target>.tmp`,
/// which is synced and renamed over the target in one step. The staged file
/// is removed if the closure fails.
pub fn replace_file<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let staged = sibling(target, ".tmp");
    let mut file = File::create(&staged)?;
    if let Err(e) = write(&mut file) {
        drop(file);
        let _ = fs::remove_file(&staged);
        return Err(e);
    }
    file.sync_all()?;
    drop(file);
    fs::rename(&staged, target)?;
    debug!(path = %target.display(), "replaced file contents");
    Ok(())
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
