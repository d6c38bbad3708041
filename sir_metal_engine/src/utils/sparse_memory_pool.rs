use crate::error::{Error, Result};

/// Fixed-capacity pool handing out stable `u32` slot indices.
///
/// Storage for every slot is allocated up front. Freed indices go on a stack
/// and are reused most-recently-freed first, so allocation order is
/// deterministic: a fresh pool hands out 0, 1, 2, ...
///
/// # Example
///
/// ```ignore
/// let mut pool: SparseMemoryPool<u64> = SparseMemoryPool::new(4);
/// let (a, slot) = pool.get_free_memory_data()?;  // a == 0
/// *slot = 42;
/// pool.free(a);
/// let (b, _) = pool.get_free_memory_data()?;     // b == 0 again
/// ```
pub struct SparseMemoryPool<T> {
    slots: Vec<T>,
    /// Stack of free indices, top = next handed out
    free_list: Vec<u32>,
}

impl<T: Default> SparseMemoryPool<T> {
    /// Preallocate `capacity` default-initialized slots
    pub fn new(capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, T::default);
        Self {
            slots,
            free_list: (0..capacity).rev().collect(),
        }
    }
}

impl<T> SparseMemoryPool<T> {
    /// Take the next free slot
    ///
    /// Returns the slot index and its data. The slot keeps whatever content
    /// the previous owner left in it.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` when every slot is in use.
    pub fn get_free_memory_data(&mut self) -> Result<(u32, &mut T)> {
        let Some(index) = self.free_list.pop() else {
            crate::engine_error!("sirmetal::SparseMemoryPool",
                "Pool exhausted: all {} slots are allocated", self.slots.len());
            return Err(Error::OutOfMemory);
        };
        Ok((index, &mut self.slots[index as usize]))
    }

    /// Return a slot to the pool
    ///
    /// Indices outside the pool are logged and ignored. Freeing an index
    /// twice is a caller bug.
    pub fn free(&mut self, index: u32) {
        if index as usize >= self.slots.len() {
            crate::engine_error!("sirmetal::SparseMemoryPool",
                "Ignoring free of slot {} outside pool capacity {}", index, self.slots.len());
            return;
        }
        debug_assert!(!self.free_list.contains(&index), "double free of slot {}", index);
        self.free_list.push(index);
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize)
    }

    /// Number of slots currently handed out
    pub fn allocated_count(&self) -> u32 {
        (self.slots.len() - self.free_list.len()) as u32
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_full(&self) -> bool {
        self.free_list.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "sparse_memory_pool_tests.rs"]
mod tests;
