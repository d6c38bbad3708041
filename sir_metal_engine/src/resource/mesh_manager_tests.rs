/// Tests for MeshManager

use super::*;
use std::sync::{Arc, Mutex};
use crate::graphics_device::StorageMode;
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::log::LogSeverity;
use crate::test_utils::CaptureLogger;
use serial_test::serial;

// ============================================================================
// Helper Functions
// ============================================================================

fn setup() -> (Arc<Mutex<MockGraphicsDevice>>, GpuMemoryAllocator, MeshManager) {
    let (mock, device) = MockGraphicsDevice::shared();
    (mock, GpuMemoryAllocator::new(device), MeshManager::new())
}

/// Unit quad in the XY plane, two triangles
fn quad(name: &str) -> MeshData {
    MeshData {
        name: name.to_string(),
        positions: vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ],
        normals: vec![Vec3::Z; 4],
        uvs: vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
        tangents: vec![Vec4::new(1.0, 0.0, 0.0, 1.0); 4],
        lightmap_uvs: Vec::new(),
        indices: vec![0, 1, 2, 2, 3, 0],
    }
}

fn buffer_bytes(allocator: &GpuMemoryAllocator, handle: BufferHandle) -> Vec<u8> {
    MockGraphicsDevice::downcast(&allocator.get_buffer(handle).unwrap()).contents()
}

// ============================================================================
// Stream Layout Tests
// ============================================================================

#[test]
fn test_merge_streams_aligns_each_stream() {
    let a = [1u8; 12];
    let b = [2u8; 8];
    let streams: [&[u8]; MESH_ATTRIBUTE_COUNT] = [&a, &[], &b, &[], &[3u8; 4]];

    let (bytes, ranges) = merge_streams(&streams);

    assert_eq!(ranges[0], MemoryRange { offset: 0, size: 12 });
    assert_eq!(ranges[1], MemoryRange { offset: 0, size: 0 });
    assert_eq!(ranges[2], MemoryRange { offset: 16, size: 8 });
    assert_eq!(ranges[3], MemoryRange { offset: 0, size: 0 });
    assert_eq!(ranges[4], MemoryRange { offset: 32, size: 4 });
    assert_eq!(bytes.len(), 36);
    assert_eq!(&bytes[12..16], &[0; 4]);
}

#[test]
fn test_load_quad_ranges() {
    let (_mock, mut allocator, mut manager) = setup();

    let handle = manager.load_mesh(&mut allocator, &quad("quad"));
    let mesh = manager.mesh(handle).unwrap();

    assert_eq!(mesh.range(MeshAttribute::Position), MemoryRange { offset: 0, size: 48 });
    assert_eq!(mesh.range(MeshAttribute::Normal), MemoryRange { offset: 48, size: 48 });
    assert_eq!(mesh.range(MeshAttribute::Uv), MemoryRange { offset: 96, size: 32 });
    assert_eq!(mesh.range(MeshAttribute::Tangent), MemoryRange { offset: 128, size: 64 });
    assert_eq!(mesh.range(MeshAttribute::LightmapUv).size, 0);
    assert_eq!(mesh.vertex_count, 4);
    assert_eq!(mesh.index_count, 6);
    assert!(mesh.is_indexed());
}

// ============================================================================
// Upload Tests
// ============================================================================

#[test]
fn test_load_uploads_through_staging() {
    let (mock, mut allocator, mut manager) = setup();
    let data = quad("quad");

    let handle = manager.load_mesh(&mut allocator, &data);
    let mesh = manager.mesh(handle).unwrap().clone();

    let vertex_info = allocator.buffer_info(mesh.vertex_buffer).unwrap();
    assert!(vertex_info.flags.contains(GpuAllocationFlags::GPU_ONLY));
    assert_eq!(
        allocator.get_buffer(mesh.vertex_buffer).unwrap().storage_mode(),
        StorageMode::GpuOnly
    );
    assert_eq!(mock.lock().unwrap().copies.len(), 2);
    assert_eq!(allocator.pending_upload_count(), 2);

    let vertices = buffer_bytes(&allocator, mesh.vertex_buffer);
    let uv = mesh.range(MeshAttribute::Uv);
    let uv_bytes = &vertices[uv.offset as usize..(uv.offset + uv.size) as usize];
    assert_eq!(uv_bytes, bytemuck::cast_slice::<Vec2, u8>(&data.uvs));

    let indices = buffer_bytes(&allocator, mesh.index_buffer);
    assert_eq!(&indices[..24], bytemuck::cast_slice::<u32, u8>(&data.indices));
}

#[test]
fn test_non_indexed_mesh() {
    let (_mock, mut allocator, mut manager) = setup();
    let mut data = quad("strip");
    data.indices.clear();

    let handle = manager.load_mesh(&mut allocator, &data);
    let mesh = manager.mesh(handle).unwrap();

    assert!(!mesh.is_indexed());
    assert_eq!(mesh.index_count, 0);
    assert_eq!(allocator.buffer_count(), 1);
}

#[test]
fn test_bounds() {
    let (_mock, mut allocator, mut manager) = setup();
    let mut data = quad("quad");
    data.positions[2] = Vec3::new(3.0, 2.0, -5.0);

    let handle = manager.load_mesh(&mut allocator, &data);
    let mesh = manager.mesh(handle).unwrap();

    assert_eq!(mesh.bounds_min, Vec3::new(-1.0, -1.0, -5.0));
    assert_eq!(mesh.bounds_max, Vec3::new(3.0, 2.0, 0.0));
}

#[test]
fn test_lookup_by_name() {
    let (_mock, mut allocator, mut manager) = setup();

    let a = manager.load_mesh(&mut allocator, &quad("floor"));
    let b = manager.load_mesh(&mut allocator, &quad("wall"));

    assert_eq!(manager.handle_by_name("floor"), a);
    assert_eq!(manager.handle_by_name("wall"), b);
    assert_eq!(b.index(), 2);
    assert_eq!(manager.mesh_count(), 2);
    assert_eq!(manager.mesh(a).unwrap().name, "floor");
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
#[serial]
fn test_invalid_meshes_return_invalid_handle() {
    let capture = CaptureLogger::install();
    let (mock, mut allocator, mut manager) = setup();

    let empty = MeshData { name: "empty".to_string(), ..Default::default() };
    let mut mismatched = quad("mismatched");
    mismatched.normals.pop();
    let mut out_of_range = quad("out_of_range");
    out_of_range.indices[4] = 4;

    for data in [empty, mismatched, out_of_range] {
        assert_eq!(manager.load_mesh(&mut allocator, &data), MeshHandle::INVALID);
    }

    assert_eq!(manager.mesh_count(), 0);
    assert!(mock.lock().unwrap().buffers.is_empty());
    assert!(capture.contains(LogSeverity::Error, "index 4 is out of range"));
    assert!(capture.contains(LogSeverity::Error, "3 normals for 4 positions"));
}

#[test]
#[serial]
fn test_oversized_index_buffer_allocates_nothing() {
    let capture = CaptureLogger::install();
    let (mock, mut allocator, mut manager) = setup();
    mock.lock().unwrap().limits.max_buffer_size = 256;

    let mut data = quad("dense");
    data.positions.truncate(3);
    data.normals.truncate(3);
    data.uvs.truncate(3);
    data.tangents.truncate(3);
    data.indices = (0..100).map(|i| i % 3).collect();

    assert_eq!(manager.load_mesh(&mut allocator, &data), MeshHandle::INVALID);

    assert_eq!(manager.mesh_count(), 0);
    assert_eq!(allocator.buffer_count(), 0);
    assert_eq!(allocator.pending_upload_count(), 0);
    assert!(mock.lock().unwrap().buffers.is_empty());
    assert!(capture.contains(LogSeverity::Error, "dense_indices"));
}

#[test]
#[serial]
fn test_unknown_lookups() {
    let capture = CaptureLogger::install();
    let manager = MeshManager::new();

    assert!(manager.mesh(MeshHandle::new(2)).is_none());
    assert_eq!(manager.handle_by_name("ghost"), MeshHandle::INVALID);
    assert!(capture.contains(LogSeverity::Error, "Unknown mesh handle"));
}
