//! CPU-side memory primitives backing the GPU-facing managers

pub mod stack_allocator;
pub mod sparse_memory_pool;
pub mod pool_allocator;
pub mod ring_buffer;

pub use stack_allocator::{StackAllocator, StackScope};
pub use sparse_memory_pool::SparseMemoryPool;
pub use pool_allocator::{PoolAllocator, SharedPoolAllocator};
pub use ring_buffer::{RingBuffer, RING_BUFFER_INLINE_CAPACITY};
