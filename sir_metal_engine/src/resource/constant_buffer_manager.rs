/// Constant buffer manager - logical constant buffers sub-allocated from pools.
///
/// Pools are CPU-visible buffers obtained from the `GpuMemoryAllocator`, each
/// `pool_size` bytes, created on first use and appended when the existing ones
/// are full. A logical constant buffer is a range inside one pool and keeps
/// that range for the manager's lifetime.
///
/// A `BUFFERED` constant buffer owns one region per frame in flight. The
/// region written by `update` and resolved by `get_bind_info` is selected by
/// the frame ticket passed to `begin_frame`:
///
/// ```text
/// pool buffer
/// [ ... | slot 0 | slot 1 | slot 2 | ... ]
///         ^ frame 0, 3, 6 ...
/// ```

use std::sync::Arc;
use bitflags::bitflags;
use crate::error::Result;
use crate::frame::{FrameTicket, MAX_FRAMES_IN_FLIGHT};
use crate::graphics_device::{self, Buffer};
use crate::handle::{BufferHandle, ConstantBufferHandle, MAX_HANDLE_INDEX};
use crate::resource::gpu_memory_allocator::{
    GpuMemoryAllocator, GpuAllocationFlags, GPU_BUFFER_ALIGNMENT,
};
use crate::{engine_bail, engine_debug, engine_error, engine_trace, engine_warn};

bitflags! {
    /// Constant buffer options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConstantBufferFlags: u32 {
        /// One region per frame in flight, rotated by `begin_frame`
        const BUFFERED = 1 << 0;
    }
}

/// Where to bind a constant buffer for the current frame
#[derive(Clone)]
pub struct ConstantBufferBindInfo {
    pub buffer: Arc<dyn Buffer>,
    /// Byte offset of the active region inside `buffer`
    pub offset: u64,
    /// Size requested at allocation
    pub size: u64,
}

struct ConstantBufferPool {
    handle: BufferHandle,
    buffer: Arc<dyn Buffer>,
    capacity: u64,
    /// Linear sub-allocator cursor
    used: u64,
}

struct ConstantBufferEntry {
    pool_index: usize,
    /// Offset of region 0
    offset: u64,
    /// Distance between consecutive regions (aligned size)
    stride: u64,
    size: u64,
    flags: ConstantBufferFlags,
}

pub struct ConstantBufferManager {
    pool_size: u64,
    frame_buffering_count: u32,
    current_slot: u32,
    pools: Vec<ConstantBufferPool>,
    /// Handle index `i` lives at `entries[i - 1]`
    entries: Vec<ConstantBufferEntry>,
}

impl ConstantBufferManager {
    /// Prepare a manager; no pool is created until the first `allocate`
    ///
    /// `frame_buffering_count` is the number of regions a buffered constant
    /// buffer reserves and must match the frame gate driving `begin_frame`.
    pub fn new(pool_size: u64, frame_buffering_count: u32) -> Self {
        let count = frame_buffering_count.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if count != frame_buffering_count {
            engine_warn!("sirmetal::ConstantBufferManager",
                "Frame buffering count {} out of range, using {}", frame_buffering_count, count);
        }
        Self {
            pool_size: pool_size.max(GPU_BUFFER_ALIGNMENT),
            frame_buffering_count: count,
            current_slot: 0,
            pools: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Reserve a constant buffer of `size` bytes
    pub fn allocate(
        &mut self,
        allocator: &mut GpuMemoryAllocator,
        size: u64,
        flags: ConstantBufferFlags,
    ) -> Result<ConstantBufferHandle> {
        if size == 0 {
            engine_bail!(InvalidOperation => "sirmetal::ConstantBufferManager",
                "Cannot allocate a zero-sized constant buffer");
        }
        if self.entries.len() as u32 >= MAX_HANDLE_INDEX {
            engine_bail!(InvalidOperation => "sirmetal::ConstantBufferManager",
                "Constant buffer registry is full ({} entries)", self.entries.len());
        }

        let alignment = {
            let device = graphics_device::lock_device(
                allocator.graphics_device(), "sirmetal::ConstantBufferManager")?;
            device.limits().min_uniform_buffer_offset_alignment.max(GPU_BUFFER_ALIGNMENT)
        };
        let region_count = if flags.contains(ConstantBufferFlags::BUFFERED) {
            self.frame_buffering_count as u64
        } else {
            1
        };
        let Some((stride, total)) = align_up(size, alignment)
            .and_then(|stride| Some((stride, stride.checked_mul(region_count)?)))
        else {
            engine_bail!(InvalidOperation => "sirmetal::ConstantBufferManager",
                "Constant buffer of {} bytes x{} regions overflows the address range",
                size, region_count);
        };

        let pool_index = match self.pools.iter().position(|pool| pool.capacity - pool.used >= total) {
            Some(index) => index,
            None => self.create_pool(allocator, total)?,
        };
        let pool = &mut self.pools[pool_index];
        let offset = pool.used;
        pool.used += total;

        self.entries.push(ConstantBufferEntry {
            pool_index,
            offset,
            stride,
            size,
            flags,
        });
        let handle = ConstantBufferHandle::new(self.entries.len() as u32);

        engine_debug!("sirmetal::ConstantBufferManager",
            "Constant buffer #{}: {} bytes x{} in pool {} at offset {}",
            handle.index(), size, region_count, pool_index, offset);

        Ok(handle)
    }

    /// Select the regions used by this frame
    ///
    /// Must be called once per frame, after the frame gate admitted it.
    pub fn begin_frame(&mut self, ticket: &FrameTicket) {
        self.current_slot = (ticket.frame_index() % self.frame_buffering_count as u64) as u32;
        engine_trace!("sirmetal::ConstantBufferManager",
            "Frame {} uses slot {}", ticket.frame_index(), self.current_slot);
    }

    /// Write `data` into the active region of `handle`
    pub fn update(&self, handle: ConstantBufferHandle, data: &[u8]) -> Result<()> {
        let Some(entry) = self.entry(handle) else {
            engine_bail!(InvalidResource => "sirmetal::ConstantBufferManager",
                "Unknown constant buffer handle {:#010x}", handle.raw());
        };
        if data.len() as u64 > entry.size {
            engine_bail!(InvalidOperation => "sirmetal::ConstantBufferManager",
                "Update of {} bytes exceeds constant buffer #{} ({} bytes)",
                data.len(), handle.index(), entry.size);
        }
        let pool = &self.pools[entry.pool_index];
        pool.buffer.update(self.active_offset(entry), data)
    }

    /// Buffer and offset to bind for `handle` in the current frame
    pub fn get_bind_info(&self, handle: ConstantBufferHandle) -> Option<ConstantBufferBindInfo> {
        let Some(entry) = self.entry(handle) else {
            engine_error!("sirmetal::ConstantBufferManager",
                "Unknown constant buffer handle {:#010x}", handle.raw());
            return None;
        };
        Some(ConstantBufferBindInfo {
            buffer: self.pools[entry.pool_index].buffer.clone(),
            offset: self.active_offset(entry),
            size: entry.size,
        })
    }

    pub fn frame_buffering_count(&self) -> u32 {
        self.frame_buffering_count
    }

    /// Region selected by the last `begin_frame`
    pub fn current_slot(&self) -> u32 {
        self.current_slot
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// GPU allocator handles of the pool buffers, in creation order
    pub fn pool_buffers(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.pools.iter().map(|pool| pool.handle)
    }

    pub fn constant_buffer_count(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, handle: ConstantBufferHandle) -> Option<&ConstantBufferEntry> {
        if !handle.is_valid() {
            return None;
        }
        self.entries.get(handle.index() as usize - 1)
    }

    fn active_offset(&self, entry: &ConstantBufferEntry) -> u64 {
        if entry.flags.contains(ConstantBufferFlags::BUFFERED) {
            entry.offset + entry.stride * self.current_slot as u64
        } else {
            entry.offset
        }
    }

    fn create_pool(&mut self, allocator: &mut GpuMemoryAllocator, min_size: u64) -> Result<usize> {
        let Some(capacity) = align_up(min_size.max(self.pool_size), GPU_BUFFER_ALIGNMENT) else {
            engine_bail!(InvalidOperation => "sirmetal::ConstantBufferManager",
                "Pool of {} bytes overflows the address range", min_size);
        };
        let name = format!("constant_buffer_pool_{}", self.pools.len());
        let handle = allocator.allocate(capacity, &name, GpuAllocationFlags::empty(), None)?;
        let Some(buffer) = allocator.get_buffer(handle) else {
            engine_bail!("sirmetal::ConstantBufferManager", "Pool buffer '{}' vanished", name);
        };
        self.pools.push(ConstantBufferPool {
            handle,
            buffer,
            capacity,
            used: 0,
        });
        engine_debug!("sirmetal::ConstantBufferManager",
            "Created constant buffer pool {} ({} bytes)", self.pools.len() - 1, capacity);
        Ok(self.pools.len() - 1)
    }
}

#[inline]
fn align_up(value: u64, alignment: u64) -> Option<u64> {
    value.div_ceil(alignment).checked_mul(alignment)
}

#[cfg(test)]
#[path = "constant_buffer_manager_tests.rs"]
mod tests;
