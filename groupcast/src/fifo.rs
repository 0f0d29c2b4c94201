//! Bounded FIFO (spec §3, §4.B): an ordered queue of buffers guarded by a
//! mutex. The FIFO itself never signals — pairing a mutation with an event
//! signal is the caller's job (network loop / processor loop / send path).

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::buffer_pool::Buffer;

/// A plain mutex-guarded deque. `push_front` exists so a partially-drained
/// send head can be put back to preserve ordering (spec §3, §4.E `SendData`).
#[derive(Default)]
pub struct Fifo {
    inner: Mutex<VecDeque<Buffer>>,
}

impl Fifo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, buf: Buffer) {
        self.inner.lock().push_back(buf);
    }

    pub fn push_front(&self, buf: Buffer) {
        self.inner.lock().push_front(buf);
    }

    pub fn pop_front(&self) -> Option<Buffer> {
        self.inner.lock().pop_front()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;

    #[test]
    fn push_front_reorders_ahead_of_back() {
        let pool = BufferPool::new(16, 4, 4, "test");
        let fifo = Fifo::new();
        fifo.push_back(pool.pick_initialised(b"a"));
        fifo.push_back(pool.pick_initialised(b"b"));
        fifo.push_front(pool.pick_initialised(b"z"));

        assert_eq!(&fifo.pop_front().unwrap()[..], b"z");
        assert_eq!(&fifo.pop_front().unwrap()[..], b"a");
        assert_eq!(&fifo.pop_front().unwrap()[..], b"b");
        assert!(fifo.pop_front().is_none());
    }

    #[test]
    fn size_and_clear() {
        let pool = BufferPool::new(16, 4, 4, "test");
        let fifo = Fifo::new();
        fifo.push_back(pool.pick_initialised(b"a"));
        fifo.push_back(pool.pick_initialised(b"b"));
        assert_eq!(fifo.size(), 2);
        fifo.clear();
        assert_eq!(fifo.size(), 0);
        assert!(fifo.is_empty());
    }
}
