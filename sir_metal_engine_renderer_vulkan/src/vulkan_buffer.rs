/// VulkanBuffer - Vulkan implementation of the Buffer trait

use sir_metal_engine::sirmetal::Result;
use sir_metal_engine::sirmetal::device::{Buffer, StorageMode};
use sir_metal_engine::engine_bail;
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    /// Taken on drop
    pub(crate) allocation: Option<Allocation>,
    pub(crate) size: u64,
    storage: StorageMode,
    label: Option<String>,
}

impl VulkanBuffer {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        buffer: vk::Buffer,
        allocation: Allocation,
        size: u64,
        storage: StorageMode,
        label: Option<String>,
    ) -> Self {
        Self {
            ctx,
            buffer,
            allocation: Some(allocation),
            size,
            storage,
            label,
        }
    }

    /// Raw Vulkan handle, for recording copies
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.buffer
    }
}

impl Buffer for VulkanBuffer {
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            engine_bail!(InvalidOperation => "sirmetal::vulkan",
                "Buffer update out of range: {} bytes at offset {} (size {})",
                data.len(), offset, self.size);
        }

        let mapped_ptr = match self.mapped_ptr() {
            Some(ptr) => ptr,
            None => engine_bail!(InvalidOperation => "sirmetal::vulkan",
                "Buffer '{}' is not CPU-accessible", self.label.as_deref().unwrap_or("unnamed")),
        };

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped_ptr.add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn storage_mode(&self) -> StorageMode {
        self.storage
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        if self.storage != StorageMode::CpuVisible {
            return None;
        }
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .map(|ptr| ptr.as_ptr() as *mut u8)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free_memory(allocation);
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
