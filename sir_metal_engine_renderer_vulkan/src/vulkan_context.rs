/// GpuContext - Shared GPU state for every Vulkan resource
///
/// Buffers, textures and shader libraries keep an `Arc<GpuContext>` so they
/// can free their memory and destroy their handles on drop.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use sir_metal_engine::sirmetal::{Error, Result};
use sir_metal_engine::{engine_err, engine_error};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

/// Shared GPU context for all Vulkan resources.
///
/// Device and instance destruction is handled by `VulkanGraphicsDevice::drop()`,
/// once every resource holding the context is gone.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    /// Queue used for uploads and buffer copies
    pub graphics_queue: vk::Queue,

    pub graphics_queue_family: u32,

    /// Command pool for one-shot transfer work
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    pub upload_command_pool: Mutex<vk::CommandPool>,
}

impl GpuContext {
    pub fn new(
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        upload_command_pool: vk::CommandPool,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            graphics_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
        }
    }

    /// Allocate memory for `requirements` from the shared allocator
    pub fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut allocator = self.allocator
            .lock()
            .map_err(|_| engine_err!("sirmetal::vulkan", "GPU allocator mutex poisoned"))?;

        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!("sirmetal::vulkan",
                    "Out of GPU memory for '{}' ({:.2} MB): {:?}", name, size_mb, e);
                Error::OutOfMemory
            })
    }

    /// Return an allocation to the allocator, ignoring a poisoned lock
    pub fn free_memory(&self, allocation: Allocation) {
        if let Ok(mut allocator) = self.allocator.lock() {
            allocator.free(allocation).ok();
        }
    }

    /// Allocate and begin a one-time-submit command buffer from the upload pool
    pub fn begin_one_shot(&self) -> Result<vk::CommandBuffer> {
        let pool = *self.upload_command_pool
            .lock()
            .map_err(|_| engine_err!("sirmetal::vulkan", "Upload command pool mutex poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to allocate upload command buffer: {:?}", e))?
                .into_iter()
                .next()
                .ok_or_else(|| engine_err!("sirmetal::vulkan", "Driver returned no command buffer"))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            if let Err(e) = self.device.begin_command_buffer(command_buffer, &begin_info) {
                self.device.free_command_buffers(pool, &[command_buffer]);
                return Err(engine_err!("sirmetal::vulkan", "Failed to begin upload command buffer: {:?}", e));
            }

            Ok(command_buffer)
        }
    }

    /// End `command_buffer` and submit it, signaling `fence` on completion
    pub fn submit_one_shot(&self, command_buffer: vk::CommandBuffer, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device.end_command_buffer(command_buffer)
                .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to end upload command buffer: {:?}", e))?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

            self.device.queue_submit(self.graphics_queue, &[submit_info], fence)
                .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to submit upload: {:?}", e))
        }
    }

    /// Return a finished one-shot command buffer to the upload pool
    pub fn free_one_shot(&self, command_buffer: vk::CommandBuffer) {
        if let Ok(pool) = self.upload_command_pool.lock() {
            unsafe {
                self.device.free_command_buffers(*pool, &[command_buffer]);
            }
        }
    }
}
