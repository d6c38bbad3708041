/// Buffer trait and buffer descriptor

use std::any::Any;
use bitflags::bitflags;
use crate::error::Result;

/// Where a buffer's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageMode {
    /// Device-local, not mappable; filled through staged copies
    GpuOnly,
    /// Host-visible and persistently mapped
    CpuVisible,
}

bitflags! {
    /// How a buffer may be bound
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX       = 1 << 0;
        const INDEX        = 1 << 1;
        const UNIFORM      = 1 << 2;
        const STORAGE      = 1 << 3;
        /// Source of a buffer copy (staging buffers)
        const TRANSFER_SRC = 1 << 4;
        /// Destination of a buffer copy (staged uploads)
        const TRANSFER_DST = 1 << 5;
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    /// Size in bytes
    pub size: u64,
    /// Allowed bindings
    pub usage: BufferUsage,
    /// Memory placement
    pub storage: StorageMode,
    /// Debug label
    pub name: Option<String>,
    /// Initial content, written at creation. Only honored for
    /// `StorageMode::CpuVisible`; GPU-only buffers are filled by a copy.
    pub data: Option<&'a [u8]>,
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// The buffer is automatically destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Write `data` at `offset` through the CPU mapping
    ///
    /// Fails for GPU-only buffers and for writes past the end.
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Size in bytes
    fn size(&self) -> u64;

    fn storage_mode(&self) -> StorageMode;

    /// Debug label, if one was given at creation
    fn label(&self) -> Option<&str>;

    /// Raw pointer to persistently mapped memory
    ///
    /// Returns None if the buffer is not CPU-accessible (device-local only).
    /// The pointer remains valid for the lifetime of the buffer.
    fn mapped_ptr(&self) -> Option<*mut u8>;

    /// Downcast hook for backends recording commands on their own buffers
    fn as_any(&self) -> &dyn Any;
}
