//! Lock-free object pool with RAII borrowing.
//!
//! # Responsibilities
//! - Hand out reusable scratch objects without blocking
//! - Reset every object before a borrower sees it
//! - Return objects exactly once, when the borrow guard drops
//!
//! # Design Decisions
//! - Backed by `crossbeam_queue::ArrayQueue`; `acquire()` allocates when empty
//! - Idle set is bounded; surplus objects are dropped on release
//! - Oversized objects are not retained (see [`Reusable::is_reusable`])

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;

/// Largest buffer capacity kept in a pool after use.
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// A scratch object that can be recycled through a [`Pool`].
pub trait Reusable: Send + 'static {
    /// Return the object to its empty state.
    fn reset(&mut self);

    /// Whether the object should go back to the idle set after use.
    fn is_reusable(&self) -> bool {
        true
    }
}

impl Reusable for BytesMut {
    fn reset(&mut self) {
        self.clear();
    }

    fn is_reusable(&self) -> bool {
        self.capacity() <= MAX_RETAINED_CAPACITY
    }
}

/// A pool of reusable objects of a single type.
pub struct Pool<T: Reusable> {
    idle: ArrayQueue<T>,
    make: fn() -> T,
}

impl<T: Reusable> Pool<T> {
    /// Create a pool keeping at most `max_idle` objects between borrows.
    ///
    /// `max_idle` is clamped to at least one slot.
    pub fn new(max_idle: usize, make: fn() -> T) -> Arc<Self> {
        Arc::new(Self {
            idle: ArrayQueue::new(max_idle.max(1)),
            make,
        })
    }

    /// Borrow an object. Never blocks; allocates a fresh one if none is idle.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let mut value = self.idle.pop().unwrap_or_else(self.make);
        value.reset();
        Pooled {
            value: Some(value),
            pool: Arc::clone(self),
        }
    }

    /// Number of objects currently waiting for a borrower.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    fn release(&self, value: T) {
        if value.is_reusable() {
            // Full idle set: drop the surplus.
            let _ = self.idle.push(value);
        }
    }
}

impl<T: Reusable> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle.len())
            .field("max_idle", &self.idle.capacity())
            .finish()
    }
}

/// A borrowed pool object. Goes back to its pool when dropped.
pub struct Pooled<T: Reusable> {
    value: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T: Reusable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `None` after drop has started.
        self.value.as_ref().unwrap_or_else(|| unreachable!("pooled value already released"))
    }
}

impl<T: Reusable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!("pooled value already released"))
    }
}

impl<T: Reusable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

impl<T: Reusable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}
