/// Texture trait and texture descriptor

use std::any::Any;
use bitflags::bitflags;
use super::StorageMode;

/// Pixel formats understood by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_SFLOAT,
    R32_UINT,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    /// Size of one pixel in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::R32_SFLOAT
            | TextureFormat::R32_UINT
            | TextureFormat::D32_SFLOAT
            | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::R16G16B16A16_SFLOAT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::D32_SFLOAT | TextureFormat::D24_UNORM_S8_UINT)
    }
}

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Sampled / read in shaders
        const SHADER_READ   = 1 << 0;
        /// Written from shaders (storage image)
        const SHADER_WRITE  = 1 << 1;
        /// Color or depth attachment
        const RENDER_TARGET = 1 << 2;
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub storage: StorageMode,
    /// MSAA sample count (power of two)
    pub sample_count: u32,
    pub mip_levels: u32,
    pub name: Option<String>,
    /// Tightly packed pixels for mip level 0
    pub data: Option<&'a [u8]>,
}

/// Immutable description of a created texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub storage: StorageMode,
    pub sample_count: u32,
    pub mip_levels: u32,
}

/// Texture resource trait
pub trait Texture: Send + Sync {
    fn info(&self) -> &TextureInfo;

    /// Debug label, if one was given at creation
    fn label(&self) -> Option<&str>;

    fn as_any(&self) -> &dyn Any;
}
