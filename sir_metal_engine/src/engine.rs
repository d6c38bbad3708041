/// SirMetal engine context - explicit owner of every engine subsystem
///
/// The context is created once at startup and passed by reference to the
/// code that needs it. It owns the GPU memory allocator, the constant buffer
/// manager, the texture / shader / mesh registries, the frame admission gate
/// and the per-frame scratch arena. Nothing here is global: two contexts on
/// two devices are fully independent.

use std::sync::{Arc, Mutex};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::frame::{FrameGate, FrameTicket};
use crate::graphics_device::GraphicsDevice;
use crate::handle::{ConstantBufferHandle, MeshHandle, ShaderHandle, TextureHandle};
use crate::resource::{
    GpuMemoryAllocator, ConstantBufferManager, ConstantBufferFlags,
    TextureManager, AllocTextureRequest, ShaderManager, MeshManager, MeshData,
};
use crate::utils::StackAllocator;
use crate::{engine_debug, engine_info};

/// Engine subsystems bound to one graphics device
///
/// # Frame loop
///
/// ```no_run
/// use std::sync::{Arc, Mutex};
/// use sir_metal_engine::sirmetal::{EngineContext, EngineConfig, GraphicsDevice};
///
/// # fn run(device: Arc<Mutex<dyn GraphicsDevice>>) -> sir_metal_engine::sirmetal::Result<()> {
/// let mut context = EngineContext::new(device, EngineConfig::load("config.json")?)?;
/// context.flush_uploads()?; // startup uploads
///
/// loop {
///     let ticket = context.begin_frame()?; // blocks while N frames are in flight
///     // ... update constant buffers, record and submit GPU work ...
///     context.end_frame(ticket)?;          // from the GPU completion path
/// #   break;
/// }
/// # Ok(())
/// # }
/// ```
pub struct EngineContext {
    config: EngineConfig,
    graphics_device: Arc<Mutex<dyn GraphicsDevice>>,
    gpu_memory_allocator: GpuMemoryAllocator,
    constant_buffer_manager: ConstantBufferManager,
    texture_manager: TextureManager,
    shader_manager: ShaderManager,
    mesh_manager: MeshManager,
    frame_gate: Arc<FrameGate>,
    scratch_arena: StackAllocator,
}

impl EngineContext {
    /// Build every subsystem on `graphics_device`
    ///
    /// # Errors
    ///
    /// Currently always succeeds, but returns Result so backends with fallible
    /// startup work fit the same call.
    pub fn new(graphics_device: Arc<Mutex<dyn GraphicsDevice>>, config: EngineConfig) -> Result<Self> {
        let frame_gate = Arc::new(FrameGate::new(config.frame_buffering_count));
        let frames_in_flight = frame_gate.max_frames_in_flight();

        let context = Self {
            gpu_memory_allocator: GpuMemoryAllocator::new(graphics_device.clone()),
            constant_buffer_manager: ConstantBufferManager::new(
                config.constant_buffer_pool_size, frames_in_flight),
            texture_manager: TextureManager::new(),
            shader_manager: ShaderManager::new(),
            mesh_manager: MeshManager::new(),
            scratch_arena: StackAllocator::new(config.scratch_arena_size),
            frame_gate,
            graphics_device,
            config,
        };

        engine_info!("sirmetal::EngineContext",
            "Engine context ready: {} frames in flight, {} byte constant buffer pools, {} byte scratch arena",
            frames_in_flight, context.config.constant_buffer_pool_size, context.config.scratch_arena_size);

        Ok(context)
    }

    // ===== FRAME LOOP =====

    /// Start a frame
    ///
    /// Blocks until the GPU has retired enough frames, then resets the
    /// scratch arena and points buffered constant buffers at this frame's
    /// regions.
    pub fn begin_frame(&mut self) -> Result<FrameTicket> {
        let ticket = self.frame_gate.acquire()?;
        self.start_frame(&ticket);
        Ok(ticket)
    }

    /// Start a frame if one can be admitted without blocking
    pub fn try_begin_frame(&mut self) -> Result<Option<FrameTicket>> {
        let ticket = self.frame_gate.try_acquire()?;
        if let Some(ticket) = &ticket {
            self.start_frame(ticket);
        }
        Ok(ticket)
    }

    /// Hand a frame back once the GPU has finished it
    ///
    /// Completion callbacks running on another thread can use
    /// `frame_gate().complete(ticket)` instead.
    pub fn end_frame(&self, ticket: FrameTicket) -> Result<()> {
        self.frame_gate.complete(ticket)
    }

    /// Wait for the device and release the staging buffers of staged uploads
    pub fn flush_uploads(&mut self) -> Result<()> {
        self.gpu_memory_allocator.flush_uploads()
    }

    fn start_frame(&mut self, ticket: &FrameTicket) {
        self.scratch_arena.reset();
        self.constant_buffer_manager.begin_frame(ticket);
        engine_debug!("sirmetal::EngineContext",
            "Begin frame {} (slot {})", ticket.frame_index(), ticket.slot());
    }

    // ===== RESOURCE CREATION =====

    /// Allocate a constant buffer from the context's pools
    pub fn allocate_constant_buffer(&mut self, size: u64, flags: ConstantBufferFlags) -> Result<ConstantBufferHandle> {
        self.constant_buffer_manager.allocate(&mut self.gpu_memory_allocator, size, flags)
    }

    /// See `TextureManager::allocate`
    pub fn allocate_texture(&mut self, request: &AllocTextureRequest) -> TextureHandle {
        self.texture_manager.allocate(&self.graphics_device, request)
    }

    /// See `ShaderManager::load_library`
    pub fn load_shader_library(&mut self, name: &str, code: &[u8]) -> ShaderHandle {
        self.shader_manager.load_library(&self.graphics_device, name, code)
    }

    /// See `MeshManager::load_mesh`
    pub fn load_mesh(&mut self, mesh: &MeshData) -> MeshHandle {
        self.mesh_manager.load_mesh(&mut self.gpu_memory_allocator, mesh)
    }

    // ===== ACCESSORS =====

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graphics_device(&self) -> &Arc<Mutex<dyn GraphicsDevice>> {
        &self.graphics_device
    }

    pub fn gpu_memory_allocator(&self) -> &GpuMemoryAllocator {
        &self.gpu_memory_allocator
    }

    pub fn gpu_memory_allocator_mut(&mut self) -> &mut GpuMemoryAllocator {
        &mut self.gpu_memory_allocator
    }

    pub fn constant_buffer_manager(&self) -> &ConstantBufferManager {
        &self.constant_buffer_manager
    }

    pub fn texture_manager(&self) -> &TextureManager {
        &self.texture_manager
    }

    pub fn shader_manager(&self) -> &ShaderManager {
        &self.shader_manager
    }

    pub fn mesh_manager(&self) -> &MeshManager {
        &self.mesh_manager
    }

    /// Shared gate, for GPU completion handlers
    pub fn frame_gate(&self) -> Arc<FrameGate> {
        self.frame_gate.clone()
    }

    /// Per-frame scratch memory, reset by `begin_frame`
    pub fn scratch_arena(&mut self) -> &mut StackAllocator {
        &mut self.scratch_arena
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
