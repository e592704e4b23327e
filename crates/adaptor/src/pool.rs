//! Bounded object pools with RAII guards.
//!
//! Objects are recycled on release, before they are pushed back; a full pool
//! drops the object instead. A [`Pooled`] guard releases on drop, so every exit
//! path, unwinding included, gives the object back.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use http::HeaderMap;
use once_cell::sync::Lazy;

/// Number of idle bridge storages kept around
pub const BRIDGE_POOL_CAPACITY: usize = 1024;

/// Number of idle drain scratch buffers kept around
pub const SCRATCH_POOL_CAPACITY: usize = 256;

/// Buffers that grew beyond this are freed instead of being kept for reuse
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

pub(crate) static BRIDGE_POOL: Lazy<Pool<BridgeBuffers>> = Lazy::new(|| Pool::new(BRIDGE_POOL_CAPACITY, BridgeBuffers::default));

pub(crate) static SCRATCH_POOL: Lazy<Pool<BytesMut>> = Lazy::new(|| Pool::new(SCRATCH_POOL_CAPACITY, BytesMut::new));

/// Resets an object to its pristine state, keeping allocations where possible.
pub trait Recycle {
    fn recycle(&mut self);
}

impl Recycle for BytesMut {
    fn recycle(&mut self) {
        if self.capacity() > MAX_RETAINED_CAPACITY {
            *self = BytesMut::new();
        } else {
            self.clear();
        }
    }
}

/// The reusable storage of one response: header fields and the body buffer.
#[derive(Debug, Default)]
pub struct BridgeBuffers {
    pub headers: HeaderMap,
    pub body: BytesMut,
}

impl Recycle for BridgeBuffers {
    fn recycle(&mut self) {
        self.headers.clear();
        self.body.recycle();
    }
}

pub struct Pool<T> {
    queue: ArrayQueue<T>,
    create: fn() -> T,
}

impl<T: Recycle> Pool<T> {
    pub fn new(capacity: usize, create: fn() -> T) -> Self {
        Self { queue: ArrayQueue::new(capacity), create }
    }

    /// Takes an idle object, or creates one when the pool is empty.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let value = self.queue.pop().unwrap_or_else(self.create);
        Pooled { pool: self, value: ManuallyDrop::new(value) }
    }

    pub fn release(&self, mut value: T) {
        value.recycle();
        // a full pool drops the value
        let _ = self.queue.push(value);
    }

    /// Number of idle objects.
    pub fn idle(&self) -> usize {
        self.queue.len()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("idle", &self.queue.len()).field("capacity", &self.queue.capacity()).finish()
    }
}

/// An object on loan from a [`Pool`]; released back on drop.
pub struct Pooled<'p, T: Recycle> {
    pool: &'p Pool<T>,
    value: ManuallyDrop<T>,
}

impl<T: Recycle> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Recycle> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&*self.value).finish()
    }
}

impl<T: Recycle> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `value` is never touched again after this take.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        self.pool.release(value);
    }
}
