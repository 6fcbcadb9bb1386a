use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A single-slot, edge-triggered, idempotent signal.
///
/// Used for the server-side cancel flag and the client-side completion flag
/// described in spec §9 ("Latched single-slot signals"): firing it twice in a row is
/// a no-op beyond the first fire, and it can be cleared and re-armed for reuse out of
/// a pool.
#[derive(Debug, Default)]
pub struct Latch {
    fired: AtomicBool,
    notify: Notify,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the latch. Idempotent: firing an already-fired latch changes nothing.
    pub fn set(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Clears the latch so it can be reused. Idempotent.
    pub fn clear(&self) {
        self.fired.store(false, Ordering::Release);
    }

    /// Non-blocking check of whether the latch has fired.
    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the latch has fired, including if it already had before this
    /// call. Tolerates spurious wakeups internally (check-then-wait-then-recheck).
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            self.notify.notified().await;
        }
    }
}
