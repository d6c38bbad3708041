/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Buffers live in CPU memory, copies execute immediately at submission and
/// every call is recorded so tests can check what the managers asked for.

use std::any::Any;
use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::engine_bail;
use crate::graphics_device::{
    GraphicsDevice, DeviceLimits, BufferCopy,
    Buffer, BufferDesc, BufferUsage, StorageMode,
    Texture, TextureDesc, TextureInfo,
    ShaderLibrary, ShaderLibraryDesc,
};

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub size: u64,
    pub usage: BufferUsage,
    pub storage: StorageMode,
    pub name: Option<String>,
    contents: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(size: u64, usage: BufferUsage, storage: StorageMode, name: Option<String>) -> Self {
        Self {
            size,
            usage,
            storage,
            name,
            contents: Mutex::new(vec![0u8; size as usize]),
        }
    }

    /// Snapshot of the buffer bytes, whatever the storage mode
    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().unwrap().clone()
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > self.size {
            engine_bail!("sirmetal::MockBuffer",
                "Write of {} bytes at offset {} exceeds buffer size {}", data.len(), offset, self.size);
        }
        self.contents.lock().unwrap()[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }
}

impl Buffer for MockBuffer {
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.storage == StorageMode::GpuOnly {
            engine_bail!(InvalidOperation => "sirmetal::MockBuffer", "Buffer is not CPU-accessible");
        }
        self.write(offset, data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn storage_mode(&self) -> StorageMode {
        self.storage
    }

    fn label(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        match self.storage {
            StorageMode::CpuVisible => Some(self.contents.lock().unwrap().as_mut_ptr()),
            StorageMode::GpuOnly => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    pub info: TextureInfo,
    pub name: Option<String>,
    pub uploaded_bytes: usize,
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn label(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Shader Library
// ============================================================================

#[derive(Debug)]
pub struct MockShaderLibrary {
    pub name: String,
    pub code_size: usize,
}

impl ShaderLibrary for MockShaderLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

/// One recorded `submit_copy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCopy {
    pub source_label: Option<String>,
    pub destination_label: Option<String>,
    pub size: u64,
}

pub struct MockGraphicsDevice {
    pub limits: DeviceLimits,
    /// Every buffer created, in creation order
    pub buffers: Vec<Arc<MockBuffer>>,
    pub textures_created: usize,
    pub shader_libraries_created: usize,
    pub copies: Vec<RecordedCopy>,
    pub wait_idle_count: usize,
    /// When set, the next buffer/texture creation fails with OutOfMemory
    pub fail_next_allocation: bool,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits::default(),
            buffers: Vec::new(),
            textures_created: 0,
            shader_libraries_created: 0,
            copies: Vec::new(),
            wait_idle_count: 0,
            fail_next_allocation: false,
        }
    }

    /// Wrap in the shared form the managers take, keeping a typed handle
    pub fn shared() -> (Arc<Mutex<MockGraphicsDevice>>, Arc<Mutex<dyn GraphicsDevice>>) {
        let mock = Arc::new(Mutex::new(Self::new()));
        let device: Arc<Mutex<dyn GraphicsDevice>> = mock.clone();
        (mock, device)
    }

    /// Find the mock behind a trait object handed out by this device
    pub fn downcast(buffer: &Arc<dyn Buffer>) -> &MockBuffer {
        buffer.as_any().downcast_ref::<MockBuffer>().unwrap()
    }

    fn take_failure(&mut self) -> bool {
        std::mem::replace(&mut self.fail_next_allocation, false)
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        if self.take_failure() {
            return Err(Error::OutOfMemory);
        }
        if desc.size > self.limits.max_buffer_size {
            return Err(Error::OutOfMemory);
        }
        let buffer = Arc::new(MockBuffer::new(desc.size, desc.usage, desc.storage, desc.name.clone()));
        if let (StorageMode::CpuVisible, Some(data)) = (desc.storage, desc.data) {
            buffer.write(0, data)?;
        }
        self.buffers.push(buffer.clone());
        Ok(buffer)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        if self.take_failure() {
            return Err(Error::OutOfMemory);
        }
        self.textures_created += 1;
        Ok(Arc::new(MockTexture {
            info: TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage,
                storage: desc.storage,
                sample_count: desc.sample_count,
                mip_levels: desc.mip_levels,
            },
            name: desc.name.clone(),
            uploaded_bytes: desc.data.map_or(0, |d| d.len()),
        }))
    }

    fn create_shader_library(&mut self, desc: &ShaderLibraryDesc) -> Result<Arc<dyn ShaderLibrary>> {
        if desc.code.is_empty() {
            engine_bail!("sirmetal::MockGraphicsDevice", "Shader library '{}' has no code", desc.name);
        }
        self.shader_libraries_created += 1;
        Ok(Arc::new(MockShaderLibrary {
            name: desc.name.to_string(),
            code_size: desc.code.len(),
        }))
    }

    fn submit_copy(&mut self, copy: BufferCopy) -> Result<()> {
        let source = MockGraphicsDevice::downcast(&copy.source);
        let destination = MockGraphicsDevice::downcast(&copy.destination);
        let start = copy.source_offset as usize;
        let bytes = source.contents()[start..start + copy.size as usize].to_vec();
        // GPU-side copy: allowed into GPU-only buffers
        destination.write(copy.destination_offset, &bytes)?;
        self.copies.push(RecordedCopy {
            source_label: source.name.clone(),
            destination_label: destination.name.clone(),
            size: copy.size,
        });
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.wait_idle_count += 1;
        Ok(())
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
