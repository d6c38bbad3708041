/*!
# SirMetal Engine

Resource and memory core of the SirMetal rendering engine.

This crate is backend-agnostic: it reaches the GPU only through the
`GraphicsDevice` / `Buffer` / `Texture` / `ShaderLibrary` traits, implemented
by backend crates (see `sir_metal_engine_renderer_vulkan`).

## Architecture

- **Handles**: typed 32-bit keys (8-bit type tag, 24-bit index) into the registries
- **GpuMemoryAllocator**: aligned GPU buffers, CPU-visible or GPU-only with staged upload
- **ConstantBufferManager**: pooled constant buffers, N-way buffered per frame in flight
- **TextureManager / ShaderManager / MeshManager**: handle-based registries
- **FrameGate**: admission gate bounding frames in flight
- **Utils**: stack allocator, sparse memory pool, ring buffer
- **DenseTree**: flat world hierarchy with depth-first re-linearization
- **EngineContext**: owns all of the above for one device
*/

// Internal modules
mod error;
mod engine;
mod config;
pub mod log;
pub mod handle;
pub mod utils;
pub mod graphics_device;
pub mod resource;
pub mod frame;
pub mod scene;

#[cfg(test)]
mod test_utils;

// Main sirmetal namespace module
pub mod sirmetal {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine context and configuration
    pub use crate::engine::EngineContext;
    pub use crate::config::EngineConfig;

    // Device boundary
    pub use crate::graphics_device::GraphicsDevice;

    // Handles
    pub use crate::handle::{
        TextureHandle, ShaderHandle, MeshHandle, BufferHandle, ConstantBufferHandle, HandleType,
    };

    // Logging sub-module (types and global slot; the engine_* macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger,
            set_logger, reset_logger, set_min_severity, min_severity,
        };
    }

    // Device sub-module with all boundary types
    pub mod device {
        pub use crate::graphics_device::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
    }

    // Frame pacing sub-module
    pub mod frame {
        pub use crate::frame::*;
    }

    // Memory primitives sub-module
    pub mod utils {
        pub use crate::utils::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }
}

// Re-export math library at crate root
pub use glam;
