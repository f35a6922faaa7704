//! Network namespace scoping.
//!
//! Namespace membership belongs to an OS thread, not to a process. Switching
//! into a container namespace and back must therefore happen on one thread
//! that nothing else runs on. [`PinnedContext::run`] provides that thread and
//! hands out a `!Send` token that every [`NamespaceControl`] call requires.

use std::fs::File;
use std::io;
use std::marker::PhantomData;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;

use nix::sched::{setns, CloneFlags};
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Namespace file of the calling thread
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Proof that the caller runs on a dedicated, non-migrating OS thread.
///
/// The token cannot be sent to or shared with another thread.
#[derive(Debug)]
pub struct PinnedContext {
    _not_send: PhantomData<*const ()>,
}

impl PinnedContext {
    /// Run `f` on a freshly spawned OS thread and wait for its result.
    ///
    /// Whatever namespace state `f` leaves behind dies with the thread.
    /// A panic inside `f` is resumed on the caller.
    pub fn run<F, R>(name: &str, f: F) -> io::Result<R>
    where
        F: FnOnce(&PinnedContext) -> R + Send,
        R: Send,
    {
        thread::scope(|scope| -> io::Result<R> {
            let handle = thread::Builder::new()
                .name(name.to_string())
                .spawn_scoped(scope, move || {
                    let ctx = PinnedContext {
                        _not_send: PhantomData,
                    };
                    f(&ctx)
                })?;

            match handle.join() {
                Ok(value) => Ok(value),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        })
    }
}

/// Entering and leaving network namespaces
pub trait NamespaceControl: Send + Sync {
    /// Run `f` inside the namespace at `path`, restoring the caller's namespace
    /// on every exit path.
    fn with_namespace<F, R>(&self, ctx: &PinnedContext, path: &Path, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>;
}

impl<T: NamespaceControl> NamespaceControl for &T {
    fn with_namespace<F, R>(&self, ctx: &PinnedContext, path: &Path, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        (**self).with_namespace(ctx, path, f)
    }
}

/// Namespace control implemented with `setns(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SetnsNamespace;

/// Switches the thread back to its original namespace when dropped
struct RestoreGuard {
    original: File,
    restored: bool,
}

impl RestoreGuard {
    fn restore(mut self) -> nix::Result<()> {
        self.restored = true;
        setns(self.original.as_raw_fd(), CloneFlags::CLONE_NEWNET)
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = setns(self.original.as_raw_fd(), CloneFlags::CLONE_NEWNET) {
            error!(error = %e, "failed to restore original network namespace");
        }
    }
}

impl NamespaceControl for SetnsNamespace {
    fn with_namespace<F, R>(&self, _ctx: &PinnedContext, path: &Path, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let ns_path = path.display().to_string();

        let original = File::open(THREAD_NETNS)
            .map_err(|e| Error::namespace(THREAD_NETNS, format!("cannot open: {}", e)))?;
        let target = File::open(path)
            .map_err(|e| Error::namespace(ns_path.clone(), format!("cannot open: {}", e)))?;

        setns(target.as_raw_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(|e| Error::namespace(ns_path.clone(), format!("cannot enter: {}", e)))?;
        debug!(netns = %ns_path, "entered network namespace");

        let guard = RestoreGuard {
            original,
            restored: false,
        };
        let result = f();

        guard
            .restore()
            .map_err(|e| Error::namespace(THREAD_NETNS, format!("cannot restore: {}", e)))?;
        debug!(netns = %ns_path, "left network namespace");

        result
    }
}
