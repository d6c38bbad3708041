/// VulkanGraphicsDevice - headless Vulkan implementation of the GraphicsDevice trait
///
/// Owns the instance, the logical device and the gpu-allocator heap. There is
/// no surface: presentation belongs to the renderer, this device only creates
/// resources and runs transfer work on the graphics queue.

use sir_metal_engine::sirmetal::{Error, Result};
use sir_metal_engine::sirmetal::device::{
    Buffer, BufferCopy, BufferDesc, BufferUsage, DeviceLimits, GraphicsDevice, ShaderLibrary,
    ShaderLibraryDesc, StorageMode, Texture, TextureDesc, TextureFormat, TextureInfo,
    TextureUsage,
};
use sir_metal_engine::{engine_bail, engine_debug, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_shader::VulkanShaderLibrary;
use crate::vulkan_texture::VulkanTexture;

/// First word of every SPIR-V module
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Copy submitted to the queue and not yet known to have completed
///
/// Holds both buffers so neither is destroyed while the GPU reads or writes it.
struct PendingCopy {
    fence: vk::Fence,
    command_buffer: vk::CommandBuffer,
    _source: Arc<dyn Buffer>,
    _destination: Arc<dyn Buffer>,
}

/// Vulkan graphics device
pub struct VulkanGraphicsDevice {
    /// Keeps the Vulkan loader alive
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    /// Shared with every resource created by this device
    ctx: Arc<GpuContext>,
    limits: DeviceLimits,
    pending_copies: Vec<PendingCopy>,
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanGraphicsDevice {
    /// Create a headless device on the first GPU exposing a graphics queue
    ///
    /// Discrete GPUs are preferred. When `enable_validation` is set and the
    /// Khronos validation layer is installed, its messages are routed to the
    /// engine logger.
    pub fn new(enable_validation: bool) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("sirmetal::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"SirMetal Application")
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"SirMetal")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let enable_validation = enable_validation && Self::validation_layer_available(&entry);

            let mut extension_names = Vec::new();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if enable_validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("sirmetal::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let (debug_utils_loader, debug_messenger) = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::messenger_severity_flags())
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                match debug_utils.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => (Some(debug_utils), Some(messenger)),
                    Err(e) => {
                        instance.destroy_instance(None);
                        engine_error!("sirmetal::vulkan", "Failed to create debug messenger: {:?}", e);
                        return Err(Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e)));
                    }
                }
            } else {
                (None, None)
            };

            let destroy_instance = || {
                if let (Some(debug_utils), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
                instance.destroy_instance(None);
            };

            let (physical_device, graphics_family_index) = match Self::pick_physical_device(&instance) {
                Ok(picked) => picked,
                Err(e) => {
                    destroy_instance();
                    return Err(e);
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            let limits = Self::query_limits(&instance, physical_device, &properties);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());

            let queue_priorities = [1.0f32];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    destroy_instance();
                    engine_error!("sirmetal::vulkan", "Failed to create logical device: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to create device: {:?}", e)));
                }
            };

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    destroy_instance();
                    engine_error!("sirmetal::vulkan", "Failed to create GPU allocator: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
                }
            };

            // TRANSIENT + RESET for reusable one-shot uploads
            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let upload_command_pool = match device.create_command_pool(&upload_pool_create_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    drop(allocator);
                    device.destroy_device(None);
                    destroy_instance();
                    engine_error!("sirmetal::vulkan", "Failed to create upload command pool: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e)));
                }
            };

            let ctx = Arc::new(GpuContext::new(
                device,
                Arc::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_family_index,
                upload_command_pool,
            ));

            engine_info!("sirmetal::vulkan",
                "Vulkan device '{}' ready (queue family {}, validation {})",
                device_name, graphics_family_index, if enable_validation { "on" } else { "off" });

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                ctx,
                limits,
                pending_copies: Vec::new(),
                debug_utils_loader,
                debug_messenger,
            })
        }
    }

    /// Whether the crate was built with the `vulkan-validation` feature
    pub fn default_validation() -> bool {
        cfg!(feature = "vulkan-validation")
    }

    /// Shared context handed to every resource
    pub fn gpu_context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Copies submitted but not yet reclaimed
    pub fn pending_copy_count(&self) -> usize {
        self.pending_copies.len()
    }

    unsafe fn validation_layer_available(entry: &ash::Entry) -> bool {
        let layers = entry.enumerate_instance_layer_properties().unwrap_or_default();
        let available = layers.iter().any(|layer| {
            layer.layer_name_as_c_str()
                .map(|name| name == c"VK_LAYER_KHRONOS_validation")
                .unwrap_or(false)
        });
        if !available {
            engine_warn!("sirmetal::vulkan",
                "VK_LAYER_KHRONOS_validation is not installed, continuing without validation");
        }
        available
    }

    /// First device with a graphics queue, discrete GPUs first
    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!("sirmetal::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = physical_devices
            .into_iter()
            .filter_map(|physical_device| {
                let family = instance
                    .get_physical_device_queue_family_properties(physical_device)
                    .iter()
                    .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
                let discrete = instance.get_physical_device_properties(physical_device).device_type
                    == vk::PhysicalDeviceType::DISCRETE_GPU;
                Some((physical_device, family as u32, discrete))
            })
            .collect();
        candidates.sort_by_key(|&(_, _, discrete)| !discrete);

        match candidates.first() {
            Some(&(physical_device, family, _)) => Ok((physical_device, family)),
            None => {
                engine_error!("sirmetal::vulkan", "No GPU with a graphics queue found");
                Err(Error::InitializationFailed("No GPU with a graphics queue found".to_string()))
            }
        }
    }

    unsafe fn query_limits(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        properties: &vk::PhysicalDeviceProperties,
    ) -> DeviceLimits {
        let mut max_buffer_size = DeviceLimits::default().max_buffer_size;
        if properties.api_version >= vk::API_VERSION_1_3 {
            let mut maintenance4 = vk::PhysicalDeviceMaintenance4Properties::default();
            let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut maintenance4);
            instance.get_physical_device_properties2(physical_device, &mut properties2);
            max_buffer_size = maintenance4.max_buffer_size;
        }
        DeviceLimits {
            min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment.max(1),
            max_buffer_size,
        }
    }

    /// Release command buffers and buffers of finished copies
    fn reclaim_finished_copies(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        self.pending_copies.retain(|copy| {
            let finished = unsafe { ctx.device.get_fence_status(copy.fence) }.unwrap_or(false);
            if finished {
                unsafe { ctx.device.destroy_fence(copy.fence, None) };
                ctx.free_one_shot(copy.command_buffer);
            }
            !finished
        });
    }

    /// Upload `data` to mip 0 of `image` and leave it in `final_layout`
    ///
    /// Blocks until the copy has executed; the staging buffer is freed on return.
    unsafe fn upload_texture_data(
        &self,
        image: vk::Image,
        desc: &TextureDesc,
        data: &[u8],
        final_layout: vk::ImageLayout,
    ) -> Result<()> {
        let staging = self.create_vk_buffer(&BufferDesc {
            size: data.len() as u64,
            usage: BufferUsage::TRANSFER_SRC,
            storage: StorageMode::CpuVisible,
            name: Some("texture_staging".to_string()),
            data: Some(data),
        })?;

        let command_buffer = self.ctx.begin_one_shot()?;
        let device = &self.ctx.device;

        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: desc.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        };

        let barrier_to_transfer = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_transfer],
        );

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            });

        device.cmd_copy_buffer_to_image(
            command_buffer,
            staging.buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        let barrier_to_final = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(final_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ);

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_final],
        );

        let fence = match device.create_fence(&vk::FenceCreateInfo::default(), None) {
            Ok(fence) => fence,
            Err(e) => {
                self.ctx.free_one_shot(command_buffer);
                engine_bail!("sirmetal::vulkan", "Failed to create upload fence: {:?}", e);
            }
        };

        let result = self.ctx.submit_one_shot(command_buffer, fence).and_then(|_| {
            device.wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to wait for texture upload: {:?}", e))
        });

        device.destroy_fence(fence, None);
        self.ctx.free_one_shot(command_buffer);
        result
    }

    /// Create a `VulkanBuffer` with its memory bound and `desc.data` written when mappable
    unsafe fn create_vk_buffer(&self, desc: &BufferDesc) -> Result<VulkanBuffer> {
        if desc.size == 0 {
            engine_bail!(InvalidOperation => "sirmetal::vulkan", "Cannot create a zero-sized buffer");
        }
        if desc.size > self.limits.max_buffer_size {
            engine_bail!(InvalidOperation => "sirmetal::vulkan",
                "Buffer of {} bytes exceeds the device maximum of {} bytes",
                desc.size, self.limits.max_buffer_size);
        }

        let device = &self.ctx.device;
        let buffer_create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.create_buffer(&buffer_create_info, None)
            .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?;

        let requirements = device.get_buffer_memory_requirements(buffer);
        let name = desc.name.as_deref().unwrap_or("buffer");

        let allocation = match self.ctx.allocate_memory(name, requirements, memory_location(desc.storage), true) {
            Ok(allocation) => allocation,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
            self.ctx.free_memory(allocation);
            device.destroy_buffer(buffer, None);
            engine_bail!("sirmetal::vulkan", "Failed to bind buffer memory: {:?}", e);
        }

        let vk_buffer = VulkanBuffer::new(
            Arc::clone(&self.ctx),
            buffer,
            allocation,
            desc.size,
            desc.storage,
            desc.name.clone(),
        );

        match (desc.storage, desc.data) {
            (StorageMode::CpuVisible, Some(data)) => vk_buffer.update(0, data)?,
            (StorageMode::GpuOnly, Some(_)) => engine_warn!("sirmetal::vulkan",
                "Initial data ignored for GPU-only buffer '{}', upload it with a copy", name),
            _ => {}
        }

        Ok(vk_buffer)
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        let buffer = unsafe { self.create_vk_buffer(desc)? };
        engine_debug!("sirmetal::vulkan", "Created {:?} buffer '{}' ({} bytes)",
            desc.storage, desc.name.as_deref().unwrap_or("unnamed"), desc.size);
        Ok(Arc::new(buffer))
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        if desc.width == 0 || desc.height == 0 {
            engine_bail!(InvalidOperation => "sirmetal::vulkan",
                "Cannot create a {}x{} texture", desc.width, desc.height);
        }
        if desc.data.is_some() && desc.format.is_depth() {
            engine_bail!(InvalidOperation => "sirmetal::vulkan", "Depth textures cannot be created with data");
        }
        let samples = sample_count_to_vk(desc.sample_count)?;
        let format = texture_format_to_vk(desc.format);
        let mip_levels = desc.mip_levels.max(1);
        let aspect_mask = if desc.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let (tiling, linear) = match desc.storage {
            StorageMode::GpuOnly => (vk::ImageTiling::OPTIMAL, false),
            StorageMode::CpuVisible => (vk::ImageTiling::LINEAR, true),
        };

        unsafe {
            let device = &self.ctx.device;
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: 1,
                })
                .mip_levels(mip_levels)
                .array_layers(1)
                .samples(samples)
                .tiling(tiling)
                .usage(texture_usage_to_vk(desc.usage, desc.format))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to create texture image: {:?}", e))?;

            let requirements = device.get_image_memory_requirements(image);
            let name = desc.name.as_deref().unwrap_or("texture");

            let allocation = match self.ctx.allocate_memory(name, requirements, memory_location(desc.storage), linear) {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.ctx.free_memory(allocation);
                device.destroy_image(image, None);
                engine_bail!("sirmetal::vulkan", "Failed to bind texture image memory: {:?}", e);
            }

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: mip_levels,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = match device.create_image_view(&view_create_info, None) {
                Ok(view) => view,
                Err(e) => {
                    self.ctx.free_memory(allocation);
                    device.destroy_image(image, None);
                    engine_bail!("sirmetal::vulkan", "Failed to create texture image view: {:?}", e);
                }
            };

            let texture = VulkanTexture::new(
                Arc::clone(&self.ctx),
                image,
                view,
                allocation,
                TextureInfo {
                    width: desc.width,
                    height: desc.height,
                    format: desc.format,
                    usage: desc.usage,
                    storage: desc.storage,
                    sample_count: desc.sample_count,
                    mip_levels,
                },
                desc.name.clone(),
            );

            if let Some(data) = desc.data {
                let final_layout = if desc.usage.contains(TextureUsage::SHADER_READ) {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                } else {
                    vk::ImageLayout::GENERAL
                };
                self.upload_texture_data(image, desc, data, final_layout)?;
            }

            engine_debug!("sirmetal::vulkan", "Created texture '{}' {}x{} {:?}",
                desc.name.as_deref().unwrap_or("unnamed"), desc.width, desc.height, desc.format);

            Ok(Arc::new(texture))
        }
    }

    fn create_shader_library(&mut self, desc: &ShaderLibraryDesc) -> Result<Arc<dyn ShaderLibrary>> {
        let words = spirv_words(desc.code)?;

        unsafe {
            let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
            let module = self.ctx.device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("sirmetal::vulkan",
                    "Failed to create shader module '{}': {:?}", desc.name, e))?;

            Ok(Arc::new(VulkanShaderLibrary::new(
                Arc::clone(&self.ctx),
                module,
                desc.name.to_string(),
            )))
        }
    }

    fn submit_copy(&mut self, copy: BufferCopy) -> Result<()> {
        let (source, destination) = match (
            copy.source.as_any().downcast_ref::<VulkanBuffer>(),
            copy.destination.as_any().downcast_ref::<VulkanBuffer>(),
        ) {
            (Some(source), Some(destination)) => (source.vk_buffer(), destination.vk_buffer()),
            _ => engine_bail!(InvalidOperation => "sirmetal::vulkan",
                "submit_copy requires buffers created by this device"),
        };

        let in_bounds = |offset: u64, size: u64| offset.checked_add(copy.size).is_some_and(|end| end <= size);
        if copy.size == 0
            || !in_bounds(copy.source_offset, copy.source.size())
            || !in_bounds(copy.destination_offset, copy.destination.size())
        {
            engine_bail!(InvalidOperation => "sirmetal::vulkan",
                "Invalid copy of {} bytes ({} -> {}, buffers of {} and {} bytes)",
                copy.size, copy.source_offset, copy.destination_offset,
                copy.source.size(), copy.destination.size());
        }

        self.reclaim_finished_copies();

        unsafe {
            let command_buffer = self.ctx.begin_one_shot()?;
            let region = vk::BufferCopy::default()
                .src_offset(copy.source_offset)
                .dst_offset(copy.destination_offset)
                .size(copy.size);
            self.ctx.device.cmd_copy_buffer(command_buffer, source, destination, &[region]);

            let fence = match self.ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    self.ctx.free_one_shot(command_buffer);
                    engine_bail!("sirmetal::vulkan", "Failed to create copy fence: {:?}", e);
                }
            };

            if let Err(e) = self.ctx.submit_one_shot(command_buffer, fence) {
                self.ctx.device.destroy_fence(fence, None);
                self.ctx.free_one_shot(command_buffer);
                return Err(e);
            }

            self.pending_copies.push(PendingCopy {
                fence,
                command_buffer,
                _source: copy.source,
                _destination: copy.destination,
            });
        }

        engine_trace!("sirmetal::vulkan",
            "Submitted {} byte copy ({} copies in flight)", copy.size, self.pending_copies.len());
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| engine_err!("sirmetal::vulkan", "Failed to wait idle: {:?}", e))?;
        }
        self.reclaim_finished_copies();
        Ok(())
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            // 1. Release finished copies and the buffers they kept alive
            self.reclaim_finished_copies();

            // 2. Every resource must be gone before the device is destroyed
            if Arc::strong_count(&self.ctx) > 1 {
                engine_warn!("sirmetal::vulkan",
                    "VulkanGraphicsDevice dropped while {} resource(s) are alive, leaking the device",
                    Arc::strong_count(&self.ctx) - 1);
                return;
            }
            let Some(ctx) = Arc::get_mut(&mut self.ctx) else {
                return;
            };

            // 3. Destroy upload command pool
            if let Ok(mut pool) = ctx.upload_command_pool.lock() {
                if *pool != vk::CommandPool::null() {
                    ctx.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // 4. Drop allocator: free VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut ctx.allocator);

            // 5. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 6. Destroy device and instance
            ctx.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

// ============================================================================
// Engine -> Vulkan conversions
// ============================================================================

pub(crate) fn texture_format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        TextureFormat::R32_UINT => vk::Format::R32_UINT,
        TextureFormat::D32_SFLOAT => vk::Format::D32_SFLOAT,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
    }
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

/// Image usage; uploads need TRANSFER_DST on every texture
pub(crate) fn texture_usage_to_vk(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::TRANSFER_DST;
    if usage.contains(TextureUsage::SHADER_READ) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::SHADER_WRITE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= if format.is_depth() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        };
    }
    flags
}

pub(crate) fn memory_location(storage: StorageMode) -> MemoryLocation {
    match storage {
        StorageMode::GpuOnly => MemoryLocation::GpuOnly,
        StorageMode::CpuVisible => MemoryLocation::CpuToGpu,
    }
}

pub(crate) fn sample_count_to_vk(sample_count: u32) -> Result<vk::SampleCountFlags> {
    match sample_count {
        1 => Ok(vk::SampleCountFlags::TYPE_1),
        2 => Ok(vk::SampleCountFlags::TYPE_2),
        4 => Ok(vk::SampleCountFlags::TYPE_4),
        8 => Ok(vk::SampleCountFlags::TYPE_8),
        other => Err(engine_err!(InvalidOperation => "sirmetal::vulkan",
            "Unsupported sample count {}", other)),
    }
}

/// Reinterpret SPIR-V bytes as words, checking size and magic number
pub(crate) fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    if code.is_empty() || code.len() % 4 != 0 {
        engine_bail!(InvalidResource => "sirmetal::vulkan",
            "SPIR-V code must be a non-empty multiple of 4 bytes (got {} bytes)", code.len());
    }
    let words: Vec<u32> = code
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        engine_bail!(InvalidResource => "sirmetal::vulkan",
            "Not a SPIR-V module (magic {:#010x})", words[0]);
    }
    Ok(words)
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
