use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Why a push was refused. The rejected item is handed back.
#[derive(Debug)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

/// FIFO hand-off between any number of producers and one consumer.
pub struct JobQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    max_depth: Option<usize>,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> JobQueue<T> {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            max_depth,
        }
    }

    /// Append without blocking.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut guard = self.lock();
        if guard.closed {
            return Err(PushError::Closed(item));
        }
        if self.max_depth.is_some_and(|max| guard.items.len() >= max) {
            return Err(PushError::Full(item));
        }
        guard.items.push_back(item);
        drop(guard);

        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |inner| {
                inner.items.is_empty() && !inner.closed
            })
            .unwrap_or_else(PoisonError::into_inner);
        guard.items.pop_front()
    }

    /// Refuse further pushes and return whatever is still queued, oldest first.
    pub fn close(&self) -> Vec<T> {
        let mut guard = self.lock();
        guard.closed = true;
        let remaining = guard.items.drain(..).collect();
        drop(guard);

        self.available.notify_all();
        remaining
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
