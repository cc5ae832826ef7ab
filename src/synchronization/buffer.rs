use std::{
    collections::VecDeque,
    error::Error,
    fmt::{self, Display},
};

use parking_lot::{Condvar, Mutex};

/// Error returned by `BoundedBuffer::send` once the buffer is closed, it hands the item back.
#[derive(Debug, PartialEq, Eq)]
pub struct ClosedErr<T>(pub T);

impl<T> Display for ClosedErr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoundedBuffer error: sending on a closed buffer")
    }
}

impl<T: fmt::Debug> Error for ClosedErr<T> {}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A fixed capacity blocking queue.
///
/// Senders block while the buffer is full and receivers while it's empty.
/// Closing wakes everyone up, further sends fail while receivers keep draining
/// what was already queued.
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedBuffer<T> {
    /// Creates a new `BoundedBuffer`.
    ///
    /// # Arguments
    /// * `capacity` - The maximum amount of queued items, a zero capacity is bumped to one.
    ///
    /// # Returns
    /// A new `BoundedBuffer` instance.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The amount of items currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues `item`, blocking while the buffer is full.
    ///
    /// # Arguments
    /// * `item` - The item to queue.
    ///
    /// # Returns
    /// A `ClosedErr` holding `item` if the buffer is, or gets, closed before a slot frees up.
    pub fn send(&self, item: T) -> Result<(), ClosedErr<T>> {
        let mut inner = self.inner.lock();

        while !inner.closed && inner.items.len() >= self.capacity {
            self.not_full.wait(&mut inner);
        }

        if inner.closed {
            return Err(ClosedErr(item));
        }

        inner.items.push_back(item);
        drop(inner);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the oldest item, blocking while the buffer is empty.
    ///
    /// # Returns
    /// The item, or `None` once the buffer is closed and fully drained.
    pub fn receive(&self) -> Option<T> {
        let mut inner = self.inner.lock();

        while !inner.closed && inner.items.is_empty() {
            self.not_empty.wait(&mut inner);
        }

        let item = inner.items.pop_front();
        drop(inner);

        if item.is_some() {
            self.not_full.notify_one();
        }

        item
    }

    /// Takes the oldest item without blocking.
    ///
    /// # Returns
    /// The item or `None` if nothing is queued right now.
    pub fn try_receive(&self) -> Option<T> {
        let item = self.inner.lock().items.pop_front();

        if item.is_some() {
            self.not_full.notify_one();
        }

        item
    }

    /// Closes the buffer and wakes up every blocked caller. Closing twice is a no-op.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}
