/// Mesh manager - uploads meshes as one merged vertex buffer plus an index buffer.
///
/// The vertex streams are not interleaved: each attribute occupies its own
/// contiguous range of the vertex buffer, in a fixed order:
///
/// ```text
/// vertex buffer
/// [ position | normal | uv | tangent | lightmap uv ]
///   ranges[0]  [1]      [2]  [3]       [4]
/// ```
///
/// Missing optional streams get a zero-sized range. Both buffers are GPU-only
/// and filled through staged uploads.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::handle::{BufferHandle, MeshHandle, MAX_HANDLE_INDEX};
use crate::resource::gpu_memory_allocator::{GpuMemoryAllocator, GpuAllocationFlags};
use crate::{engine_bail, engine_debug, engine_error, engine_warn};

/// Alignment of each attribute stream inside the vertex buffer
pub const VERTEX_STREAM_ALIGNMENT: usize = 16;

/// Byte sub-range of a buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct MemoryRange {
    pub offset: u32,
    pub size: u32,
}

/// Attribute streams, in vertex buffer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshAttribute {
    Position = 0,
    Normal = 1,
    Uv = 2,
    Tangent = 3,
    LightmapUv = 4,
}

pub const MESH_ATTRIBUTE_COUNT: usize = 5;

/// CPU-side mesh as produced by an asset loader
///
/// `positions` is required; every other non-empty stream must have one entry
/// per position. An empty `indices` makes a non-indexed mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub tangents: Vec<Vec4>,
    pub lightmap_uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

/// Registered mesh
#[derive(Debug, Clone)]
pub struct MeshRecord {
    pub name: String,
    pub vertex_buffer: BufferHandle,
    /// `BufferHandle::INVALID` for non-indexed meshes
    pub index_buffer: BufferHandle,
    pub ranges: [MemoryRange; MESH_ATTRIBUTE_COUNT],
    pub vertex_count: u32,
    pub index_count: u32,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

impl MeshRecord {
    pub fn range(&self, attribute: MeshAttribute) -> MemoryRange {
        self.ranges[attribute as usize]
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_valid()
    }
}

#[derive(Default)]
pub struct MeshManager {
    /// Handle index `i` lives at `meshes[i - 1]`
    meshes: Vec<MeshRecord>,
    name_to_handle: FxHashMap<String, MeshHandle>,
}

impl MeshManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `mesh`, `MeshHandle::INVALID` (logged) on failure
    pub fn load_mesh(&mut self, allocator: &mut GpuMemoryAllocator, mesh: &MeshData) -> MeshHandle {
        match self.try_load_mesh(allocator, mesh) {
            Ok(handle) => handle,
            Err(err) => {
                engine_error!("sirmetal::MeshManager", "Failed to load mesh '{}': {}", mesh.name, err);
                MeshHandle::INVALID
            }
        }
    }

    fn try_load_mesh(&mut self, allocator: &mut GpuMemoryAllocator, mesh: &MeshData) -> Result<MeshHandle> {
        validate(mesh)?;
        if self.meshes.len() as u32 >= MAX_HANDLE_INDEX {
            engine_bail!(InvalidOperation => "sirmetal::MeshManager",
                "Mesh registry is full ({} meshes)", self.meshes.len());
        }

        let streams: [&[u8]; MESH_ATTRIBUTE_COUNT] = [
            bytemuck::cast_slice(&mesh.positions),
            bytemuck::cast_slice(&mesh.normals),
            bytemuck::cast_slice(&mesh.uvs),
            bytemuck::cast_slice(&mesh.tangents),
            bytemuck::cast_slice(&mesh.lightmap_uvs),
        ];
        let (vertex_bytes, ranges) = merge_streams(&streams);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        let vertex_name = format!("{}_vertices", mesh.name);
        let index_name = format!("{}_indices", mesh.name);

        // Both buffers must fit before either is registered: the allocator
        // cannot give a buffer back once it holds it.
        allocator.checked_size(vertex_bytes.len() as u64, &vertex_name)?;
        if !index_bytes.is_empty() {
            allocator.checked_size(index_bytes.len() as u64, &index_name)?;
        }

        let vertex_buffer = allocator.allocate(
            vertex_bytes.len() as u64,
            &vertex_name,
            GpuAllocationFlags::GPU_ONLY,
            Some(&vertex_bytes),
        )?;
        let index_buffer = if index_bytes.is_empty() {
            BufferHandle::INVALID
        } else {
            allocator.allocate(
                index_bytes.len() as u64,
                &index_name,
                GpuAllocationFlags::GPU_ONLY,
                Some(index_bytes),
            )?
        };

        let (bounds_min, bounds_max) = mesh.positions.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), &p| (min.min(p), max.max(p)),
        );

        self.meshes.push(MeshRecord {
            name: mesh.name.clone(),
            vertex_buffer,
            index_buffer,
            ranges,
            vertex_count: mesh.positions.len() as u32,
            index_count: mesh.indices.len() as u32,
            bounds_min,
            bounds_max,
        });
        let handle = MeshHandle::new(self.meshes.len() as u32);

        if !mesh.name.is_empty() {
            if let Some(previous) = self.name_to_handle.insert(mesh.name.clone(), handle) {
                engine_warn!("sirmetal::MeshManager",
                    "Mesh name '{}' now refers to #{} (was #{})",
                    mesh.name, handle.index(), previous.index());
            }
        }

        engine_debug!("sirmetal::MeshManager",
            "Loaded mesh '{}' #{}: {} vertices, {} indices, {} vertex bytes",
            mesh.name, handle.index(), mesh.positions.len(), mesh.indices.len(), vertex_bytes.len());

        Ok(handle)
    }

    /// Mesh behind `handle`, `None` (logged) if unknown
    pub fn mesh(&self, handle: MeshHandle) -> Option<&MeshRecord> {
        let record = if handle.is_valid() {
            self.meshes.get(handle.index() as usize - 1)
        } else {
            None
        };
        if record.is_none() {
            engine_error!("sirmetal::MeshManager", "Unknown mesh handle {:#010x}", handle.raw());
        }
        record
    }

    /// Handle registered under `name`, `MeshHandle::INVALID` (logged) if none
    pub fn handle_by_name(&self, name: &str) -> MeshHandle {
        match self.name_to_handle.get(name) {
            Some(&handle) => handle,
            None => {
                engine_error!("sirmetal::MeshManager", "No mesh named '{}'", name);
                MeshHandle::INVALID
            }
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

fn validate(mesh: &MeshData) -> Result<()> {
    let vertex_count = mesh.positions.len();
    if vertex_count == 0 {
        engine_bail!(InvalidOperation => "sirmetal::MeshManager", "Mesh '{}' has no positions", mesh.name);
    }
    let optional = [
        ("normals", mesh.normals.len()),
        ("uvs", mesh.uvs.len()),
        ("tangents", mesh.tangents.len()),
        ("lightmap uvs", mesh.lightmap_uvs.len()),
    ];
    for (stream, len) in optional {
        if len != 0 && len != vertex_count {
            engine_bail!(InvalidOperation => "sirmetal::MeshManager",
                "Mesh '{}' has {} {} for {} positions", mesh.name, len, stream, vertex_count);
        }
    }
    if let Some(&index) = mesh.indices.iter().find(|&&index| index as usize >= vertex_count) {
        engine_bail!(InvalidOperation => "sirmetal::MeshManager",
            "Mesh '{}' index {} is out of range ({} vertices)", mesh.name, index, vertex_count);
    }
    Ok(())
}

/// Concatenate streams into one buffer, each starting on `VERTEX_STREAM_ALIGNMENT`
fn merge_streams(streams: &[&[u8]; MESH_ATTRIBUTE_COUNT]) -> (Vec<u8>, [MemoryRange; MESH_ATTRIBUTE_COUNT]) {
    let mut bytes = Vec::new();
    let mut ranges = [MemoryRange::default(); MESH_ATTRIBUTE_COUNT];
    for (range, stream) in ranges.iter_mut().zip(streams) {
        if stream.is_empty() {
            continue;
        }
        let offset = bytes.len().next_multiple_of(VERTEX_STREAM_ALIGNMENT);
        bytes.resize(offset, 0);
        bytes.extend_from_slice(stream);
        *range = MemoryRange {
            offset: offset as u32,
            size: stream.len() as u32,
        };
    }
    (bytes, ranges)
}

#[cfg(test)]
#[path = "mesh_manager_tests.rs"]
mod tests;
