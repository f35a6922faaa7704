//! Host-wide serialization of plugin invocations.
//!
//! The inventory is not safe against two invocations changing the pool at the
//! same time, so every ADD and DEL on a host runs inside one exclusive scope.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nix::fcntl::{flock, FlockArg};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A scope at most one caller can be inside at a time
pub trait ExclusiveScope {
    /// Block until the scope is free, run `f`, then release the scope even if
    /// `f` panics.
    fn with_exclusive<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R;
}

/// Exclusive scope backed by `flock(2)` on a lock file
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Create a lock on the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_error(&self, source: std::io::Error) -> Error {
        Error::Lock {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Held flock, released on drop
struct FlockGuard {
    file: File,
}

impl Drop for FlockGuard {
    fn drop(&mut self) {
        // Closing the file releases the lock too, this just makes it prompt
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!(error = %e, "failed to unlock execution lock");
        }
    }
}

impl ExclusiveScope for FileLock {
    fn with_exclusive<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .mode(0o600)
            .open(&self.path)
            .map_err(|e| self.lock_error(e))?;

        debug!(path = %self.path.display(), "waiting for execution lock");
        flock(file.as_raw_fd(), FlockArg::LockExclusive)
            .map_err(|e| self.lock_error(std::io::Error::from(e)))?;
        debug!(path = %self.path.display(), "execution lock acquired");

        let _guard = FlockGuard { file };
        Ok(f())
    }
}

/// In-process exclusive scope, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryLock {
    inner: Arc<Mutex<()>>,
}

impl MemoryLock {
    /// Create an unlocked scope
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExclusiveScope for MemoryLock {
    fn with_exclusive<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        // A panicking holder still released the scope
        let _guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f())
    }
}
