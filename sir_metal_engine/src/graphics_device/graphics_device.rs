/// GraphicsDevice trait - the device + queue the engine allocates from

use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::Result;
use super::{Buffer, BufferDesc, Texture, TextureDesc, ShaderLibrary, ShaderLibraryDesc};

/// Hardware limits the allocators need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of a uniform buffer binding offset
    pub min_uniform_buffer_offset_alignment: u64,
    /// Largest single buffer the device accepts
    pub max_buffer_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            max_buffer_size: 1 << 30,
        }
    }
}

/// Buffer-to-buffer copy submitted to the device queue
///
/// The device keeps both buffers alive until the copy has executed.
#[derive(Clone)]
pub struct BufferCopy {
    pub source: Arc<dyn Buffer>,
    pub source_offset: u64,
    pub destination: Arc<dyn Buffer>,
    pub destination_offset: u64,
    pub size: u64,
}

/// Main graphics device trait
///
/// Central factory for GPU resources plus the queue used for transfer work.
/// Implemented by backend-specific devices (e.g., VulkanGraphicsDevice).
pub trait GraphicsDevice: Send + Sync {
    /// Create a buffer
    ///
    /// CPU-visible buffers are created with `desc.data` already written.
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a texture, uploading `desc.data` to mip level 0 when present
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a shader library from backend bytecode
    fn create_shader_library(&mut self, desc: &ShaderLibraryDesc) -> Result<Arc<dyn ShaderLibrary>>;

    /// Record and submit a buffer copy on the transfer queue
    ///
    /// Returns once the copy is submitted, not when it has executed. Use
    /// `wait_idle` to observe completion.
    fn submit_copy(&mut self, copy: BufferCopy) -> Result<()>;

    /// Block until all submitted GPU work has completed
    fn wait_idle(&mut self) -> Result<()>;

    fn limits(&self) -> DeviceLimits;
}

/// Lock a shared device, turning a poisoned mutex into an error
pub fn lock_device<'a>(
    device: &'a Arc<Mutex<dyn GraphicsDevice>>,
    source: &str,
) -> Result<MutexGuard<'a, dyn GraphicsDevice + 'static>> {
    device.lock().map_err(|_| crate::engine_err!(source, "GraphicsDevice mutex poisoned"))
}
