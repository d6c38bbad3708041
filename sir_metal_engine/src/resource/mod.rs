//! Resource management module
//!
//! GPU memory allocation and the handle-based registries built on top of it.

pub mod gpu_memory_allocator;
pub mod constant_buffer_manager;
pub mod texture_manager;
pub mod shader_manager;
pub mod mesh_manager;

pub use gpu_memory_allocator::{
    GpuMemoryAllocator, GpuAllocationFlags, GpuBufferInfo,
    GPU_BUFFER_ALIGNMENT, align_size,
};
pub use constant_buffer_manager::{
    ConstantBufferManager, ConstantBufferFlags, ConstantBufferBindInfo,
};
pub use texture_manager::{TextureManager, AllocTextureRequest, MAX_SAMPLE_COUNT};
pub use shader_manager::ShaderManager;
pub use mesh_manager::{
    MeshManager, MeshData, MeshRecord, MeshAttribute, MemoryRange,
    MESH_ATTRIBUTE_COUNT, VERTEX_STREAM_ALIGNMENT,
};
