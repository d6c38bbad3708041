use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Pool shared between several ring buffers
pub type SharedPoolAllocator<T> = Arc<Mutex<PoolAllocator<T>>>;

/// Size-class pool of reusable storage blocks.
///
/// Blocks are bucketed by power-of-two length. `acquire` hands out a cached
/// block of the right class when one exists and allocates a fresh one
/// otherwise; `release` puts a block back for the next caller. Shared between
/// owners as `SharedPoolAllocator<T>`.
pub struct PoolAllocator<T> {
    free_blocks: FxHashMap<usize, Vec<Box<[T]>>>,
    outstanding: usize,
}

impl<T: Copy + Default> PoolAllocator<T> {
    pub fn new() -> Self {
        Self {
            free_blocks: FxHashMap::default(),
            outstanding: 0,
        }
    }

    /// Wrap a new pool for sharing
    pub fn shared() -> SharedPoolAllocator<T> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Size class serving a request of `len` elements
    pub fn size_class(len: usize) -> usize {
        len.max(1).next_power_of_two()
    }

    /// Get a block of at least `len` elements
    pub fn acquire(&mut self, len: usize) -> Box<[T]> {
        let class = Self::size_class(len);
        self.outstanding += 1;
        if let Some(block) = self.free_blocks.get_mut(&class).and_then(|blocks| blocks.pop()) {
            return block;
        }
        crate::engine_trace!("sirmetal::PoolAllocator", "New block for size class {}", class);
        vec![T::default(); class].into_boxed_slice()
    }

    /// Give a block back to the pool
    pub fn release(&mut self, block: Box<[T]>) {
        debug_assert!(block.len().is_power_of_two(), "block was not acquired from a pool");
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free_blocks.entry(block.len()).or_default().push(block);
    }

    /// Blocks currently handed out
    pub fn outstanding_count(&self) -> usize {
        self.outstanding
    }

    /// Blocks cached for reuse in the size class serving `len`
    pub fn cached_block_count(&self, len: usize) -> usize {
        self.free_blocks
            .get(&Self::size_class(len))
            .map_or(0, |blocks| blocks.len())
    }
}

impl<T: Copy + Default> Default for PoolAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}
