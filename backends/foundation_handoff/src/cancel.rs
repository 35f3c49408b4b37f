// External cancellation for threads blocked inside a store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam::channel::{self, Receiver, Sender};

/// Implemented by anything that parks threads and must release them
/// when a [`CancelToken`] fires.
pub trait Interrupt: Send + Sync {
    /// Wake every thread currently parked so it re-checks its token.
    fn interrupt(&self);
}

struct TokenInner {
    cancelled: AtomicBool,

    /// Dropping the sender disconnects `signal`, which makes every
    /// `select!` waiting on it ready at once.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,

    watchers: Mutex<Vec<(usize, Arc<dyn Interrupt>)>>,
    next_watcher: AtomicUsize,
}

/// `CancelToken` is the stop request handed to a producer or consumer.
///
/// Cloning shares the same underlying flag, so the orchestrator keeps one
/// clone and the task the other. Once cancelled a token stays cancelled;
/// hand out a fresh token to resume using a store.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (trigger, signal) = channel::bounded::<()>(0);
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
                watchers: Mutex::new(Vec::new()),
                next_watcher: AtomicUsize::new(0),
            }),
        }
    }

    /// `cancel` flips the token and wakes whatever is blocked on it.
    ///
    /// Returns false when the token was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        drop(
            self.inner
                .trigger
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        // snapshot so interrupt() never runs under the watchers lock.
        let watchers: Vec<Arc<dyn Interrupt>> = self
            .inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, watcher)| Arc::clone(watcher))
            .collect();

        tracing::debug!(watchers = watchers.len(), "cancel token fired");
        for watcher in watchers {
            watcher.interrupt();
        }
        true
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once the token fires.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Registers `target` to be interrupted on cancellation for as long as
    /// the returned guard lives.
    ///
    /// Callers must check [`Self::is_cancelled`] after registering and
    /// before parking, otherwise a cancel racing the registration is lost.
    pub(crate) fn watch(&self, target: Arc<dyn Interrupt>) -> WatchGuard<'_> {
        let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, target));
        WatchGuard { token: self, id }
    }

    #[cfg(test)]
    fn watcher_count(&self) -> usize {
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) struct WatchGuard<'a> {
    token: &'a CancelToken,
    id: usize,
}

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        let mut watchers = self
            .token
            .inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod test_cancel_token {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{CancelToken, Interrupt};

    #[derive(Default)]
    struct Counting {
        hits: AtomicUsize,
    }

    impl Interrupt for Counting {
        fn interrupt(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn cancel_is_one_shot_and_shared_by_clones() {
        let token = CancelToken::new();
        let observer = token.clone();

        assert!(!observer.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(observer.is_cancelled());
    }

    #[test]
    fn cancel_interrupts_registered_watchers_only_while_guarded() {
        let token = CancelToken::new();
        let counting = Arc::new(Counting::default());

        {
            let _guard = token.watch(counting.clone());
            assert_eq!(token.watcher_count(), 1);
        }
        assert_eq!(token.watcher_count(), 0);

        let _guard = token.watch(counting.clone());
        token.cancel();
        assert_eq!(counting.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[ntest::timeout(5000)]
    fn signal_disconnects_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = thread::spawn(move || waiter.signal().recv().is_err());

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert!(handle.join().expect("should join waiter"));
    }
}
