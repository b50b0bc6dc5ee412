//! Liveness flag shared between a pipeline's owner and its workers.
//!
//! Workers wrap every listener invocation in `deliver`, which runs the callback
//! only while the token is live. `cancel` flips the flag and then waits for any
//! delivery already in progress on another thread, so once `cancel` returns no
//! listener call can start or still be running. A listener may cancel its own
//! token from inside the callback; that case skips the wait.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

thread_local! {
    /// Tokens whose delivery gate is held by the current thread.
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    gate: RwLock<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Mark the token cancelled. Returns true for the first call only.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::SeqCst);
        if !self.delivering_here() {
            // Wait out in-flight deliveries on other threads.
            drop(self.inner.gate.write().unwrap_or_else(|p| p.into_inner()));
        }
        first
    }

    /// Run `f` if the token is still live. Returns whether `f` ran.
    pub fn deliver<F: FnOnce()>(&self, f: F) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if self.delivering_here() {
            // Nested delivery; this thread already holds the gate.
            f();
            return true;
        }
        let _gate = self.inner.gate.read().unwrap_or_else(|p| p.into_inner());
        if self.is_cancelled() {
            return false;
        }
        let _mark = DeliveryMark::enter(self.key());
        f();
        true
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn delivering_here(&self) -> bool {
        let key = self.key();
        DELIVERING.with(|d| d.borrow().contains(&key))
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Records that this thread holds a token's gate; cleared on drop, even on panic.
struct DeliveryMark(usize);

impl DeliveryMark {
    fn enter(key: usize) -> Self {
        DELIVERING.with(|d| d.borrow_mut().push(key));
        Self(key)
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|d| {
            let mut d = d.borrow_mut();
            if let Some(pos) = d.iter().rposition(|k| *k == self.0) {
                d.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn delivers_until_cancelled() {
        let token = CancellationToken::new();
        assert!(token.deliver(|| {}));
        assert!(token.cancel());
        assert!(!token.cancel());
        let mut ran = false;
        assert!(!token.deliver(|| ran = true));
        assert!(!ran);
    }

    #[test]
    fn cancel_waits_for_in_flight_delivery() {
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = mpsc::channel();

        let worker = {
            let token = token.clone();
            let finished = finished.clone();
            thread::spawn(move || {
                token.deliver(|| {
                    entered_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    finished.fetch_add(1, Ordering::SeqCst);
                });
            })
        };

        entered_rx.recv().unwrap();
        let started = Instant::now();
        token.cancel();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(10));
        worker.join().unwrap();
    }

    #[test]
    fn cancel_from_inside_delivery_does_not_deadlock() {
        let token = CancellationToken::new();
        let inner = token.clone();
        assert!(token.deliver(|| {
            assert!(inner.cancel());
        }));
        assert!(token.is_cancelled());
        assert!(!token.deliver(|| {}));
    }
}
