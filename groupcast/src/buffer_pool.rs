//! Buffer Pool (spec §3, §4.A): fixed-capacity datagram buffers with
//! free-list reuse, a soft cap on retained buffers, and an eviction
//! hysteresis threshold below it.
//!
//! Shaped after `bufferpool::BufferPool` (`Arc`-shared handle, `pull`,
//! `Deref`/`DerefMut` buffers, an `opentelemetry` `UpDownCounter` tracking
//! live buffers) but with an explicit free list instead of
//! `lockfree_object_pool`, because the spec's *pool-size* / *pool-hold*
//! knobs need control over eviction the generic object pool doesn't expose.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use opentelemetry::metrics::UpDownCounter;
use opentelemetry::KeyValue;
use parking_lot::Mutex;

struct Inner {
    capacity: usize,
    pool_size: usize,
    pool_hold: usize,
    free: Mutex<Vec<Vec<u8>>>,
    counter: UpDownCounter<i64>,
    attributes: [KeyValue; 1],
}

/// A cloneable, thread-safe handle to a buffer pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    pub fn new(capacity: usize, pool_size: usize, pool_hold: usize, tag: &'static str) -> Self {
        let counter = opentelemetry::global::meter("groupcast")
            .i64_up_down_counter("system.buffer.count")
            .with_description("The number of buffers retained in the free list.")
            .with_unit("{buffers}")
            .build();

        Self {
            inner: Arc::new(Inner {
                capacity,
                pool_size,
                pool_hold,
                free: Mutex::new(Vec::with_capacity(pool_size)),
                counter,
                attributes: [KeyValue::new("system.buffer.pool.name", tag)],
            }),
        }
    }

    /// Returns a buffer sized to `capacity` with logical length 0 — `pick-free`.
    pub fn pick_free(&self) -> Buffer {
        let storage = {
            let mut free = self.inner.free.lock();
            match free.pop() {
                Some(mut buf) => {
                    self.inner.counter.add(-1, &self.inner.attributes);
                    buf.clear();
                    buf.resize(self.inner.capacity, 0);
                    buf
                }
                None => vec![0u8; self.inner.capacity],
            }
        };

        Buffer {
            storage,
            len: 0,
            pool: self.inner.clone(),
        }
    }

    /// Convenience: a buffer pre-filled with `data` (used by the send path).
    pub fn pick_initialised(&self, data: &[u8]) -> Buffer {
        let mut buf = self.pick_free();
        buf.set_len(data.len());
        buf[..data.len()].copy_from_slice(data);
        buf
    }

    /// Drops all retained free buffers — `clear`.
    pub fn clear(&self) {
        let mut free = self.inner.free.lock();
        let n = free.len() as i64;
        free.clear();
        if n > 0 {
            self.inner.counter.add(-n, &self.inner.attributes);
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Inner {
    /// `release`: returns a buffer to the free list while below the hold
    /// threshold; above it (or at the hard `pool_size` cap), the buffer is
    /// dropped instead of retained.
    fn release(&self, storage: Vec<u8>) {
        let mut free = self.free.lock();
        if free.len() >= self.pool_hold || free.len() >= self.pool_size {
            return;
        }
        free.push(storage);
        self.counter.add(1, &self.attributes);
    }
}

/// A pooled datagram buffer. Deref/DerefMut expose the *logical* slice
/// (`[0..len]`); the pool's fixed `capacity` backs the underlying storage.
pub struct Buffer {
    storage: Vec<u8>,
    len: usize,
    pool: Arc<Inner>,
}

impl Buffer {
    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.storage.len());
        self.len = len.min(self.storage.len());
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Mutable access to the full-capacity backing storage, for `recvfrom`
    /// to write into before the caller calls `set_len` with the byte count.
    pub fn full_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.storage[..self.len]
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len).finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let storage = std::mem::take(&mut self.storage);
        self.pool.release(storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_free_is_zero_length_but_full_capacity() {
        let pool = BufferPool::new(1024, 4, 2, "test");
        let buf = pool.pick_free();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 1024);
    }

    #[test]
    fn release_reuses_buffer_below_hold() {
        let pool = BufferPool::new(64, 4, 4, "test");
        {
            let _buf = pool.pick_free();
        }
        assert_eq!(pool.inner.free.lock().len(), 1);
    }

    #[test]
    fn clear_drops_all_retained_buffers() {
        let pool = BufferPool::new(64, 4, 4, "test");
        drop(pool.pick_free());
        drop(pool.pick_free());
        assert_eq!(pool.inner.free.lock().len(), 2);
        pool.clear();
        assert_eq!(pool.inner.free.lock().len(), 0);
    }

    #[test]
    fn pick_initialised_copies_data() {
        let pool = BufferPool::new(64, 4, 4, "test");
        let buf = pool.pick_initialised(b"PING");
        assert_eq!(&buf[..], b"PING");
    }
}
