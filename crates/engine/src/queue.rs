use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

/// Pushes between retention trims.
pub const TRIM_EVERY: u64 = 1000;
/// Entries kept by a trim (the most recent ones).
pub const MAX_RETAINED: usize = 5000;

/// FIFO buffer between the stream reader and the consumer loop.
///
/// Every [`TRIM_EVERY`] pushes the queue is cut back to its newest
/// [`MAX_RETAINED`] entries. If the consumer falls that far behind, the
/// oldest unread messages are dropped.
#[derive(Debug, Default)]
pub struct StreamQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<String>,
    pushes: u64,
    dropped: u64,
}

impl StreamQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: String) {
        {
            let mut inner = self.lock();
            inner.items.push_back(message);
            inner.pushes += 1;
            if inner.pushes % TRIM_EVERY == 0 && inner.items.len() > MAX_RETAINED {
                let excess = inner.items.len() - MAX_RETAINED;
                inner.items.drain(..excess);
                inner.dropped += excess as u64;
                warn!(dropped = excess, retained = MAX_RETAINED, "Stream queue trimmed");
            }
        }
        self.notify.notify_one();
    }

    /// Pop the oldest message, waiting up to `timeout` for one to arrive.
    pub async fn pop(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(msg) = self.try_pop() {
                return Some(msg);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub fn try_pop(&self) -> Option<String> {
        self.lock().items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages discarded by trims since startup.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the deque inconsistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
