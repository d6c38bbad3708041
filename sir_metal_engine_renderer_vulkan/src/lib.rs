/*!
# SirMetal Engine - Vulkan Backend

Headless Vulkan implementation of the `sir_metal_engine` graphics device.

Uses Ash for the Vulkan bindings and gpu-allocator for device memory. Build
with the `vulkan-validation` feature to have `VulkanGraphicsDevice::default_validation()`
request the Khronos validation layer.

```no_run
use std::sync::{Arc, Mutex};
use sir_metal_engine::sirmetal::{EngineConfig, EngineContext, GraphicsDevice};
use sir_metal_engine_renderer_vulkan::VulkanGraphicsDevice;

# fn main() -> sir_metal_engine::sirmetal::Result<()> {
let device = VulkanGraphicsDevice::new(VulkanGraphicsDevice::default_validation())?;
let device: Arc<Mutex<dyn GraphicsDevice>> = Arc::new(Mutex::new(device));
let _engine = EngineContext::new(device, EngineConfig::default())?;
# Ok(())
# }
```
*/

mod debug;
mod vulkan_context;
mod vulkan_device;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_shader;

pub use vulkan_context::GpuContext;
pub use vulkan_device::VulkanGraphicsDevice;
pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_texture::VulkanTexture;
pub use vulkan_shader::VulkanShaderLibrary;
