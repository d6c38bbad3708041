/// Graphics device module - the GPU boundary consumed by the memory core

// Module declarations
pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod shader;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use buffer::*;
pub use texture::*;
pub use shader::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
