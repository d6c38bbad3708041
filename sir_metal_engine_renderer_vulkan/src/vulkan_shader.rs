/// VulkanShaderLibrary - Vulkan implementation of the ShaderLibrary trait

use sir_metal_engine::sirmetal::device::ShaderLibrary;
use ash::vk;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// One SPIR-V module; entry points are picked at pipeline creation
pub struct VulkanShaderLibrary {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    name: String,
}

impl VulkanShaderLibrary {
    pub(crate) fn new(ctx: Arc<GpuContext>, module: vk::ShaderModule, name: String) -> Self {
        Self { ctx, module, name }
    }

    pub fn vk_shader_module(&self) -> vk::ShaderModule {
        self.module
    }
}

impl ShaderLibrary for VulkanShaderLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShaderLibrary {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}
