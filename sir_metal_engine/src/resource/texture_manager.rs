/// Texture manager - texture registry keyed by `TextureHandle` and by name.
///
/// Failed allocations are logged and yield `TextureHandle::INVALID`; callers
/// check `is_valid()` and fall back to a placeholder.

use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::graphics_device::{
    self, GraphicsDevice, StorageMode, Texture, TextureDesc, TextureFormat, TextureUsage,
};
use crate::handle::{TextureHandle, MAX_HANDLE_INDEX};
use crate::{engine_bail, engine_debug, engine_error, engine_warn};

/// Largest supported MSAA sample count
pub const MAX_SAMPLE_COUNT: u32 = 8;

/// Texture allocation request
///
/// `sample_count` and `mip_levels` default to 1.
#[derive(Debug, Clone)]
pub struct AllocTextureRequest<'a> {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub storage: StorageMode,
    pub sample_count: u32,
    pub mip_levels: u32,
    /// Tightly packed pixels for mip level 0
    pub data: Option<&'a [u8]>,
}

impl Default for AllocTextureRequest<'_> {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: 0,
            height: 0,
            format: TextureFormat::R8G8B8A8_UNORM,
            usage: TextureUsage::SHADER_READ,
            storage: StorageMode::GpuOnly,
            sample_count: 1,
            mip_levels: 1,
            data: None,
        }
    }
}

impl AllocTextureRequest<'_> {
    /// Length of the full mip chain for the requested size
    pub fn max_mip_levels(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            engine_bail!(InvalidOperation => "sirmetal::TextureManager",
                "Texture '{}' has zero size ({}x{})", self.name, self.width, self.height);
        }
        if !self.sample_count.is_power_of_two() || self.sample_count > MAX_SAMPLE_COUNT {
            engine_bail!(InvalidOperation => "sirmetal::TextureManager",
                "Texture '{}' sample count {} is not a power of two up to {}",
                self.name, self.sample_count, MAX_SAMPLE_COUNT);
        }
        if self.mip_levels == 0 || self.mip_levels > self.max_mip_levels() {
            engine_bail!(InvalidOperation => "sirmetal::TextureManager",
                "Texture '{}' requests {} mip levels, {}x{} allows 1..={}",
                self.name, self.mip_levels, self.width, self.height, self.max_mip_levels());
        }
        if self.sample_count > 1 && self.mip_levels > 1 {
            engine_bail!(InvalidOperation => "sirmetal::TextureManager",
                "Multisampled texture '{}' cannot have mip levels", self.name);
        }
        if let Some(data) = self.data {
            let expected = self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64;
            if data.len() as u64 != expected {
                engine_bail!(InvalidOperation => "sirmetal::TextureManager",
                    "Texture '{}' data is {} bytes, expected {}", self.name, data.len(), expected);
            }
        }
        Ok(())
    }
}

struct TextureRecord {
    name: String,
    texture: Arc<dyn Texture>,
}

#[derive(Default)]
pub struct TextureManager {
    /// Handle index `i` lives at `textures[i - 1]`
    textures: Vec<TextureRecord>,
    name_to_handle: FxHashMap<String, TextureHandle>,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a texture, `TextureHandle::INVALID` on failure
    pub fn allocate(
        &mut self,
        graphics_device: &Arc<Mutex<dyn GraphicsDevice>>,
        request: &AllocTextureRequest,
    ) -> TextureHandle {
        match self.try_allocate(graphics_device, request) {
            Ok(handle) => handle,
            Err(err) => {
                engine_error!("sirmetal::TextureManager",
                    "Failed to allocate texture '{}': {}", request.name, err);
                TextureHandle::INVALID
            }
        }
    }

    fn try_allocate(
        &mut self,
        graphics_device: &Arc<Mutex<dyn GraphicsDevice>>,
        request: &AllocTextureRequest,
    ) -> Result<TextureHandle> {
        request.validate()?;
        if self.textures.len() as u32 >= MAX_HANDLE_INDEX {
            engine_bail!(InvalidOperation => "sirmetal::TextureManager",
                "Texture registry is full ({} textures)", self.textures.len());
        }

        let texture = graphics_device::lock_device(graphics_device, "sirmetal::TextureManager")?
            .create_texture(&TextureDesc {
                width: request.width,
                height: request.height,
                format: request.format,
                usage: request.usage,
                storage: request.storage,
                sample_count: request.sample_count,
                mip_levels: request.mip_levels,
                name: (!request.name.is_empty()).then(|| request.name.clone()),
                data: request.data,
            })?;

        self.textures.push(TextureRecord {
            name: request.name.clone(),
            texture,
        });
        let handle = TextureHandle::new(self.textures.len() as u32);

        if !request.name.is_empty() {
            if let Some(previous) = self.name_to_handle.insert(request.name.clone(), handle) {
                engine_warn!("sirmetal::TextureManager",
                    "Texture name '{}' now refers to #{} (was #{})",
                    request.name, handle.index(), previous.index());
            }
        }

        engine_debug!("sirmetal::TextureManager",
            "Allocated texture '{}' #{} ({}x{} {:?}, {} mips, {}x MSAA)",
            request.name, handle.index(), request.width, request.height,
            request.format, request.mip_levels, request.sample_count);

        Ok(handle)
    }

    /// Texture behind `handle`, `None` (logged) if unknown
    pub fn texture(&self, handle: TextureHandle) -> Option<Arc<dyn Texture>> {
        let record = if handle.is_valid() {
            self.textures.get(handle.index() as usize - 1)
        } else {
            None
        };
        if record.is_none() {
            engine_error!("sirmetal::TextureManager",
                "Unknown texture handle {:#010x}", handle.raw());
        }
        record.map(|record| record.texture.clone())
    }

    /// Name given at allocation
    pub fn name(&self, handle: TextureHandle) -> Option<&str> {
        if !handle.is_valid() {
            return None;
        }
        self.textures.get(handle.index() as usize - 1).map(|record| record.name.as_str())
    }

    /// Handle registered under `name`, `TextureHandle::INVALID` (logged) if none
    pub fn handle_by_name(&self, name: &str) -> TextureHandle {
        match self.name_to_handle.get(name) {
            Some(&handle) => handle,
            None => {
                engine_error!("sirmetal::TextureManager", "No texture named '{}'", name);
                TextureHandle::INVALID
            }
        }
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
#[path = "texture_manager_tests.rs"]
mod tests;
