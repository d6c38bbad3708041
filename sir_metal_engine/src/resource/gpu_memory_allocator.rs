/// GPU memory allocator - owns every GPU buffer the engine creates.
///
/// Buffers are registered under a `BufferHandle` and stay alive until the
/// allocator itself is dropped (there is no per-buffer free).
///
/// Two placement paths:
///
/// - CPU-visible: a mapped buffer, optionally created with its content and
///   updated in place later with `update`.
/// - GPU-only: device-local memory. When initial data is given, it is written
///   into a temporary staging buffer and a staging -> destination copy is
///   submitted without waiting. The staging buffer is kept until
///   `flush_uploads` has waited for the device.

use std::sync::{Arc, Mutex};
use bitflags::bitflags;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::graphics_device::{
    self, GraphicsDevice, Buffer, BufferCopy, BufferDesc, BufferUsage, StorageMode,
};
use crate::handle::{BufferHandle, MAX_HANDLE_INDEX};
use crate::{engine_bail, engine_debug, engine_error};

/// Every allocation size is rounded up to this boundary
pub const GPU_BUFFER_ALIGNMENT: u64 = 256;

/// Bindings granted to every buffer the allocator creates
const GENERAL_BUFFER_USAGE: BufferUsage = BufferUsage::VERTEX
    .union(BufferUsage::INDEX)
    .union(BufferUsage::UNIFORM)
    .union(BufferUsage::STORAGE);

bitflags! {
    /// Allocation options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GpuAllocationFlags: u32 {
        /// Device-local memory, not writable from the CPU after creation
        const GPU_ONLY = 1 << 0;
    }
}

/// Round `size` up to `GPU_BUFFER_ALIGNMENT`, `None` if that overflows
#[inline]
pub fn align_size(size: u64) -> Option<u64> {
    size.checked_add(GPU_BUFFER_ALIGNMENT - 1)
        .map(|padded| padded & !(GPU_BUFFER_ALIGNMENT - 1))
}

/// Bookkeeping for one registered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBufferInfo {
    /// Size requested by the caller
    pub size: u64,
    /// Size actually allocated (aligned)
    pub allocated_size: u64,
    /// Start of the usable range inside the native buffer
    pub offset: u64,
    pub flags: GpuAllocationFlags,
}

struct GpuBufferRecord {
    buffer: Arc<dyn Buffer>,
    info: GpuBufferInfo,
}

pub struct GpuMemoryAllocator {
    graphics_device: Arc<Mutex<dyn GraphicsDevice>>,
    buffers: FxHashMap<u32, GpuBufferRecord>,
    /// Next registry index; 0 is the invalid handle
    next_index: u32,
    /// Staging buffers whose copies may still be in flight
    pending_staging: Vec<Arc<dyn Buffer>>,
}

impl GpuMemoryAllocator {
    /// Bind the allocator to the device (and its queue) used for every allocation
    pub fn new(graphics_device: Arc<Mutex<dyn GraphicsDevice>>) -> Self {
        Self {
            graphics_device,
            buffers: FxHashMap::default(),
            next_index: 1,
            pending_staging: Vec::new(),
        }
    }

    pub fn graphics_device(&self) -> &Arc<Mutex<dyn GraphicsDevice>> {
        &self.graphics_device
    }

    /// Allocate a buffer of at least `size` bytes
    ///
    /// `data`, when given, must fit in `size`. For GPU-only buffers the upload
    /// is only submitted; call `flush_uploads` (or otherwise order the work
    /// on the queue) before the GPU reads the buffer.
    pub fn allocate(
        &mut self,
        size: u64,
        name: &str,
        flags: GpuAllocationFlags,
        data: Option<&[u8]>,
    ) -> Result<BufferHandle> {
        if size == 0 {
            engine_bail!(InvalidOperation => "sirmetal::GpuMemoryAllocator",
                "Cannot allocate zero-sized buffer '{}'", name);
        }
        if let Some(data) = data {
            if data.len() as u64 > size {
                engine_bail!(InvalidOperation => "sirmetal::GpuMemoryAllocator",
                    "Initial data for '{}' is {} bytes, larger than the requested {} bytes",
                    name, data.len(), size);
            }
        }
        if self.next_index > MAX_HANDLE_INDEX {
            engine_bail!(InvalidOperation => "sirmetal::GpuMemoryAllocator",
                "Buffer registry is full ({} buffers)", self.buffers.len());
        }

        let allocated_size = self.checked_size(size, name)?;
        let label = (!name.is_empty()).then(|| name.to_string());
        let gpu_only = flags.contains(GpuAllocationFlags::GPU_ONLY);

        let device = self.graphics_device.clone();
        let mut device = graphics_device::lock_device(&device, "sirmetal::GpuMemoryAllocator")?;

        let buffer = match (gpu_only, data) {
            (false, data) => device.create_buffer(&BufferDesc {
                size: allocated_size,
                usage: GENERAL_BUFFER_USAGE,
                storage: StorageMode::CpuVisible,
                name: label,
                data,
            })?,
            (true, None) => device.create_buffer(&BufferDesc {
                size: allocated_size,
                usage: GENERAL_BUFFER_USAGE | BufferUsage::TRANSFER_DST,
                storage: StorageMode::GpuOnly,
                name: label,
                data: None,
            })?,
            (true, Some(data)) => {
                let staging = device.create_buffer(&BufferDesc {
                    size: data.len() as u64,
                    usage: BufferUsage::TRANSFER_SRC,
                    storage: StorageMode::CpuVisible,
                    name: Some(format!("{}_staging", name)),
                    data: Some(data),
                })?;
                let destination = device.create_buffer(&BufferDesc {
                    size: allocated_size,
                    usage: GENERAL_BUFFER_USAGE | BufferUsage::TRANSFER_DST,
                    storage: StorageMode::GpuOnly,
                    name: label,
                    data: None,
                })?;
                device.submit_copy(BufferCopy {
                    source: staging.clone(),
                    source_offset: 0,
                    destination: destination.clone(),
                    destination_offset: 0,
                    size: data.len() as u64,
                })?;
                self.pending_staging.push(staging);
                destination
            }
        };
        drop(device);

        let index = self.next_index;
        self.next_index += 1;
        self.buffers.insert(index, GpuBufferRecord {
            buffer,
            info: GpuBufferInfo {
                size,
                allocated_size,
                offset: 0,
                flags,
            },
        });

        engine_debug!("sirmetal::GpuMemoryAllocator",
            "Allocated buffer '{}' #{} ({} bytes, {} allocated, {:?})",
            name, index, size, allocated_size, flags);

        Ok(BufferHandle::new(index))
    }

    /// Aligned size a buffer of `size` bytes would take
    ///
    /// Fails without touching the device when the aligned size overflows or
    /// exceeds `DeviceLimits::max_buffer_size`, so callers creating several
    /// buffers at once can reject the whole set up front.
    pub fn checked_size(&self, size: u64, name: &str) -> Result<u64> {
        let Some(allocated_size) = align_size(size) else {
            engine_bail!(InvalidOperation => "sirmetal::GpuMemoryAllocator",
                "Buffer '{}' size {} overflows when aligned to {} bytes",
                name, size, GPU_BUFFER_ALIGNMENT);
        };
        let max_buffer_size = graphics_device::lock_device(
            &self.graphics_device, "sirmetal::GpuMemoryAllocator")?.limits().max_buffer_size;
        if allocated_size > max_buffer_size {
            engine_error!("sirmetal::GpuMemoryAllocator",
                "Buffer '{}' needs {} bytes, device maximum is {}",
                name, allocated_size, max_buffer_size);
            return Err(Error::OutOfMemory);
        }
        Ok(allocated_size)
    }

    /// Copy `data` into a CPU-visible buffer at `offset`
    pub fn update(&mut self, handle: BufferHandle, data: &[u8], offset: u64) -> Result<()> {
        let Some(record) = self.buffers.get(&handle.index()) else {
            engine_bail!(InvalidResource => "sirmetal::GpuMemoryAllocator",
                "Unknown buffer handle {:#010x}", handle.raw());
        };
        if record.info.flags.contains(GpuAllocationFlags::GPU_ONLY) {
            engine_bail!(InvalidOperation => "sirmetal::GpuMemoryAllocator",
                "Buffer #{} is GPU-only and cannot be updated from the CPU", handle.index());
        }
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > record.info.allocated_size) {
            engine_bail!(InvalidOperation => "sirmetal::GpuMemoryAllocator",
                "Update of {} bytes at offset {} overflows buffer #{} ({} bytes)",
                data.len(), offset, handle.index(), record.info.allocated_size);
        }
        record.buffer.update(record.info.offset + offset, data)
    }

    /// Native buffer behind `handle`, `None` (logged) if unknown
    pub fn get_buffer(&self, handle: BufferHandle) -> Option<Arc<dyn Buffer>> {
        self.record(handle).map(|record| record.buffer.clone())
    }

    pub fn buffer_info(&self, handle: BufferHandle) -> Option<GpuBufferInfo> {
        self.record(handle).map(|record| record.info)
    }

    /// Aligned size of the allocation behind `handle`
    pub fn allocated_size(&self, handle: BufferHandle) -> Option<u64> {
        self.buffer_info(handle).map(|info| info.allocated_size)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Staging buffers waiting for `flush_uploads`
    pub fn pending_upload_count(&self) -> usize {
        self.pending_staging.len()
    }

    /// Wait for the device to finish submitted copies and release staging buffers
    pub fn flush_uploads(&mut self) -> Result<()> {
        graphics_device::lock_device(&self.graphics_device, "sirmetal::GpuMemoryAllocator")?
            .wait_idle()?;
        let released = self.pending_staging.len();
        self.pending_staging.clear();
        if released > 0 {
            engine_debug!("sirmetal::GpuMemoryAllocator", "Released {} staging buffers", released);
        }
        Ok(())
    }

    fn record(&self, handle: BufferHandle) -> Option<&GpuBufferRecord> {
        let record = if handle.is_valid() { self.buffers.get(&handle.index()) } else { None };
        if record.is_none() {
            engine_error!("sirmetal::GpuMemoryAllocator",
                "Unknown buffer handle {:#010x}", handle.raw());
        }
        record
    }
}

#[cfg(test)]
#[path = "gpu_memory_allocator_tests.rs"]
mod tests;
