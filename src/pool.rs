//! Buffer recycling for the stream readers and writers.
//!
//! One pool typically backs many streams, so implementations must tolerate
//! concurrent acquire/release. A buffer handed out by `alloc_*` is owned by
//! the caller until the matching `release_*`; releasing it again or using it
//! after release is a contract violation.

use std::sync::Arc;

use parking_lot::Mutex;

/// Buffers are keyed by role so that, say, a reader's frame buffer and its
/// decode buffer do not evict each other.
pub trait BufferPool: Send + Sync {
    /// Returns a buffer of length at least `min_len`, possibly longer.
    fn alloc_input(&self, min_len: usize) -> Vec<u8>;
    fn release_input(&self, buf: Vec<u8>);

    fn alloc_output(&self, min_len: usize) -> Vec<u8>;
    fn release_output(&self, buf: Vec<u8>);

    fn alloc_encode(&self, min_len: usize) -> Vec<u8>;
    fn release_encode(&self, buf: Vec<u8>);

    fn alloc_decode(&self, min_len: usize) -> Vec<u8>;
    fn release_decode(&self, buf: Vec<u8>);
}

/// Default pool: one cached buffer per role. A released buffer replaces a
/// smaller cached one and is otherwise dropped, so the cache never grows
/// beyond four buffers.
#[derive(Debug, Default)]
pub struct CachingPool {
    input: Mutex<Option<Vec<u8>>>,
    output: Mutex<Option<Vec<u8>>>,
    encode: Mutex<Option<Vec<u8>>>,
    decode: Mutex<Option<Vec<u8>>>,
}

impl CachingPool {
    pub fn new() -> CachingPool {
        CachingPool::default()
    }

    fn take(slot: &Mutex<Option<Vec<u8>>>, min_len: usize) -> Vec<u8> {
        if let Some(buf) = slot.lock().take() {
            if buf.len() >= min_len {
                return buf;
            }
        }
        vec![0; min_len]
    }

    fn put(slot: &Mutex<Option<Vec<u8>>>, buf: Vec<u8>) {
        let mut slot = slot.lock();
        if slot.as_ref().map_or(true, |cached| cached.len() < buf.len()) {
            *slot = Some(buf);
        }
    }
}

impl BufferPool for CachingPool {
    fn alloc_input(&self, min_len: usize) -> Vec<u8> {
        Self::take(&self.input, min_len)
    }
    fn release_input(&self, buf: Vec<u8>) {
        Self::put(&self.input, buf);
    }

    fn alloc_output(&self, min_len: usize) -> Vec<u8> {
        Self::take(&self.output, min_len)
    }
    fn release_output(&self, buf: Vec<u8>) {
        Self::put(&self.output, buf);
    }

    fn alloc_encode(&self, min_len: usize) -> Vec<u8> {
        Self::take(&self.encode, min_len)
    }
    fn release_encode(&self, buf: Vec<u8>) {
        Self::put(&self.encode, buf);
    }

    fn alloc_decode(&self, min_len: usize) -> Vec<u8> {
        Self::take(&self.decode, min_len)
    }
    fn release_decode(&self, buf: Vec<u8>) {
        Self::put(&self.decode, buf);
    }
}

/// A pool that allocates fresh and drops on release, for callers that want
/// no cross-stream sharing at all.
#[derive(Debug, Default)]
pub struct NoopPool;

impl BufferPool for NoopPool {
    fn alloc_input(&self, min_len: usize) -> Vec<u8> {
        vec![0; min_len]
    }
    fn release_input(&self, _buf: Vec<u8>) {}

    fn alloc_output(&self, min_len: usize) -> Vec<u8> {
        vec![0; min_len]
    }
    fn release_output(&self, _buf: Vec<u8>) {}

    fn alloc_encode(&self, min_len: usize) -> Vec<u8> {
        vec![0; min_len]
    }
    fn release_encode(&self, _buf: Vec<u8>) {}

    fn alloc_decode(&self, min_len: usize) -> Vec<u8> {
        vec![0; min_len]
    }
    fn release_decode(&self, _buf: Vec<u8>) {}
}

lazy_static! {
    static ref DEFAULT_POOL: Arc<CachingPool> = Arc::new(CachingPool::new());
}

/// The process-wide pool streams use unless given another one.
pub fn default_pool() -> Arc<dyn BufferPool> {
    DEFAULT_POOL.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_meets_minimum() {
        let pool = CachingPool::new();
        assert!(pool.alloc_input(100).len() >= 100);
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = CachingPool::new();
        let mut buf = pool.alloc_decode(64);
        buf[0] = 0xAB;
        let cap = buf.capacity();
        pool.release_decode(buf);
        let again = pool.alloc_decode(32);
        assert_eq!(again.capacity(), cap);
        assert_eq!(again[0], 0xAB);
    }

    #[test]
    fn undersized_cache_entry_is_not_returned() {
        let pool = CachingPool::new();
        pool.release_encode(vec![0; 8]);
        assert!(pool.alloc_encode(1024).len() >= 1024);
    }

    #[test]
    fn larger_release_replaces_smaller() {
        let pool = CachingPool::new();
        pool.release_output(vec![0; 8]);
        pool.release_output(vec![1; 128]);
        let buf = pool.alloc_output(16);
        assert_eq!(buf.len(), 128);
    }
}
