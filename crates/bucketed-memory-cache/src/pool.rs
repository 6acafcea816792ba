//! Free lists of reusable buffers, one per size class

use std::time::{Duration, Instant};

struct FreeBuffer {
    bytes: Box<[u8]>,
    released_at: Instant,
}

pub(crate) struct BufferPool {
    sizes: Vec<usize>,
    free: Vec<Vec<FreeBuffer>>,
    retained_bytes: usize,
    max_retained_bytes: usize,
}

impl BufferPool {
    /// A pool holding at most 1.1 × `capacity_bytes` of free buffers
    pub fn new(sizes: Vec<usize>, capacity_bytes: usize) -> Self {
        let free = sizes.iter().map(|_| Vec::new()).collect();
        Self {
            sizes,
            free,
            retained_bytes: 0,
            max_retained_bytes: capacity_bytes.saturating_add(capacity_bytes / 10),
        }
    }

    /// Take a buffer of class `class`, allocating when the free list is empty
    pub fn acquire(&mut self, class: usize) -> Box<[u8]> {
        match self.free[class].pop() {
            Some(buffer) => {
                self.retained_bytes -= buffer.bytes.len();
                buffer.bytes
            }
            None => vec![0u8; self.sizes[class]].into_boxed_slice(),
        }
    }

    /// Hand a buffer back. Dropped when the pool is already full.
    pub fn release(&mut self, class: usize, bytes: Box<[u8]>) {
        let size = bytes.len();
        if self.retained_bytes + size > self.max_retained_bytes {
            return;
        }
        self.retained_bytes += size;
        self.free[class].push(FreeBuffer {
            bytes,
            released_at: Instant::now(),
        });
    }

    /// Drop free buffers that have been idle for longer than `max_age`
    pub fn release_idle(&mut self, now: Instant, max_age: Duration) -> usize {
        let mut released = 0;
        let mut released_bytes = 0;
        for list in &mut self.free {
            list.retain(|buffer| {
                let idle = now.saturating_duration_since(buffer.released_at) > max_age;
                if idle {
                    released += 1;
                    released_bytes += buffer.bytes.len();
                }
                !idle
            });
        }
        self.retained_bytes -= released_bytes;
        released
    }

    pub fn buffer_count(&self) -> usize {
        self.free.iter().map(Vec::len).sum()
    }

    pub fn retained_bytes(&self) -> usize {
        self.retained_bytes
    }
}
