use super::pool_allocator::SharedPoolAllocator;

/// Largest capacity stored inline, without a separate allocation
pub const RING_BUFFER_INLINE_CAPACITY: usize = 10;

enum Storage<T> {
    Inline([T; RING_BUFFER_INLINE_CAPACITY]),
    Heap(Box<[T]>),
}

/// Bounded FIFO queue over a circular buffer.
///
/// Rings of up to `RING_BUFFER_INLINE_CAPACITY` elements keep their storage
/// inline. Larger rings take a block from the shared pool they were created
/// with (returned on drop), or from the heap when no pool is given.
///
/// `push` on a full ring fails instead of overwriting the oldest element.
pub struct RingBuffer<T: Copy + Default> {
    storage: Storage<T>,
    pool: Option<SharedPoolAllocator<T>>,
    capacity: usize,
    /// Index of the oldest element
    head: usize,
    count: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring of `capacity` elements without an external pool
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Create a ring whose large-capacity storage comes from `pool`
    ///
    /// Small rings stay inline and never touch the pool.
    pub fn with_pool(capacity: usize, pool: &SharedPoolAllocator<T>) -> Self {
        Self::build(capacity, Some(pool.clone()))
    }

    fn build(capacity: usize, pool: Option<SharedPoolAllocator<T>>) -> Self {
        if capacity <= RING_BUFFER_INLINE_CAPACITY {
            return Self {
                storage: Storage::Inline([T::default(); RING_BUFFER_INLINE_CAPACITY]),
                pool: None,
                capacity,
                head: 0,
                count: 0,
            };
        }

        let pooled_block = pool.as_ref().and_then(|pool| match pool.lock() {
            Ok(mut pool) => Some(pool.acquire(capacity)),
            Err(_) => {
                crate::engine_warn!("sirmetal::RingBuffer",
                    "Pool lock poisoned, falling back to heap storage for {} elements", capacity);
                None
            }
        });

        let (block, pool) = match pooled_block {
            Some(block) => (block, pool),
            None => (vec![T::default(); capacity].into_boxed_slice(), None),
        };

        Self {
            storage: Storage::Heap(block),
            pool,
            capacity,
            head: 0,
            count: 0,
        }
    }

    /// Whether storage is inline
    pub fn uses_small_size_optimization(&self) -> bool {
        matches!(self.storage, Storage::Inline(_))
    }

    fn slots(&self) -> &[T] {
        match &self.storage {
            Storage::Inline(array) => array,
            Storage::Heap(block) => block,
        }
    }

    fn slots_mut(&mut self) -> &mut [T] {
        match &mut self.storage {
            Storage::Inline(array) => array,
            Storage::Heap(block) => block,
        }
    }

    /// Enqueue `value`; returns false and leaves the ring untouched when full
    pub fn push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.count) % self.capacity;
        self.slots_mut()[tail] = value;
        self.count += 1;
        true
    }

    /// Dequeue the oldest element
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots()[self.head];
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        Some(value)
    }

    /// Oldest element, without removing it
    pub fn front(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        Some(self.slots()[self.head])
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn used_element_count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every queued element
    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }
}

impl<T: Copy + Default> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        let Storage::Heap(block) = std::mem::replace(&mut self.storage, Storage::Heap(Box::default())) else {
            return;
        };
        let guard = pool.lock();
        match guard {
            Ok(mut pool) => pool.release(block),
            Err(_) => {
                crate::engine_warn!("sirmetal::RingBuffer",
                    "Pool lock poisoned, dropping {} element block instead of returning it", block.len());
            }
        };
    }
}

#[cfg(test)]
#[path = "ring_buffer_tests.rs"]
mod tests;
