use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Bounded FIFO of items waiting to be resent.
///
/// When full, the oldest items are evicted to make room for new ones.
#[derive(Debug)]
pub struct RetryBuffer<T> {
    items: Mutex<VecDeque<T>>,
    len: AtomicUsize,
    capacity: usize,
}

impl<T> RetryBuffer<T> {
    /// Empty buffer holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Append `items`, evicting from the front past capacity. Returns the
    /// number of evicted items.
    pub fn offer(&self, items: impl IntoIterator<Item = T>) -> usize {
        let mut buffer = self.items.lock();
        let mut evicted = 0;
        for item in items {
            buffer.push_back(item);
            if buffer.len() > self.capacity {
                buffer.pop_front();
                evicted += 1;
            }
        }
        self.len.store(buffer.len(), Ordering::Release);
        evicted
    }

    /// Take everything, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let mut buffer = self.items.lock();
        self.len.store(0, Ordering::Release);
        buffer.drain(..).collect()
    }

    /// Current number of items, without locking.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
