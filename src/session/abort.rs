//! Cooperative abort for a call's upstream session.
//!
//! The dispatcher owns one [`AbortSignal`] per call and fires it when the call times out
//! or its caller goes away. Sessions check it before every upstream command, and
//! connections register hooks that shut their sockets down so blocked I/O returns.

use crate::error::{GatewayError, GatewayResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

type AbortHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
    aborted: AtomicBool,
    hooks: Mutex<Vec<AbortHook>>,
}

/// Shared, clonable abort flag for one tool call.
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// `Ok` while the call may still talk to the upstream server.
    pub fn check(&self) -> GatewayResult<()> {
        if self.is_aborted() {
            Err(GatewayError::Connection(
                "session aborted before the next upstream command".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Run `hook` when the signal fires. Runs it immediately if it already has.
    pub fn on_abort(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.hooks();
            if !self.is_aborted() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn abort(&self) {
        if self.inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks: Vec<AbortHook> = std::mem::take(&mut *self.hooks());
        debug!(hooks = hooks.len(), "aborting upstream session");
        for hook in hooks {
            hook();
        }
    }

    /// Fires the signal when dropped, unless disarmed first.
    pub fn abort_on_drop(&self) -> AbortOnDrop {
        AbortOnDrop {
            signal: Some(self.clone()),
        }
    }

    fn hooks(&self) -> std::sync::MutexGuard<'_, Vec<AbortHook>> {
        self.inner
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Aborts the session of a call whose future is dropped before the worker finished.
pub struct AbortOnDrop {
    signal: Option<AbortSignal>,
}

impl AbortOnDrop {
    pub fn disarm(mut self) {
        self.signal = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_abort_runs_hooks_once() {
        let signal = AbortSignal::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        signal.on_abort(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(signal.check().is_ok());
        signal.abort();
        signal.abort();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(signal.check().unwrap_err().kind(), ErrorKind::ConnectionError);
    }

    #[test]
    fn test_hook_registered_after_abort_runs_immediately() {
        let signal = AbortSignal::new();
        signal.abort();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        signal.on_abort(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_abort_on_drop() {
        let signal = AbortSignal::new();
        {
            let _guard = signal.abort_on_drop();
        }
        assert!(signal.is_aborted());

        let signal = AbortSignal::new();
        signal.abort_on_drop().disarm();
        assert!(!signal.is_aborted());
    }
}
