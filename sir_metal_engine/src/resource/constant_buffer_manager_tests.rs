/// Tests for ConstantBufferManager
///
/// Uses MockGraphicsDevice; the mock keeps pool contents in CPU memory so the
/// tests can check which region each frame wrote.

use super::*;
use std::sync::Mutex;
use crate::error::Error;
use crate::frame::FrameGate;
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;
use crate::log::LogSeverity;
use crate::test_utils::CaptureLogger;
use serial_test::serial;

// ============================================================================
// Helper Functions
// ============================================================================

const POOL_SIZE: u64 = 4096;

fn setup(frames: u32) -> (Arc<Mutex<MockGraphicsDevice>>, GpuMemoryAllocator, ConstantBufferManager) {
    let (mock, device) = MockGraphicsDevice::shared();
    (mock, GpuMemoryAllocator::new(device), ConstantBufferManager::new(POOL_SIZE, frames))
}

fn region_bytes(info: &ConstantBufferBindInfo) -> Vec<u8> {
    let start = info.offset as usize;
    MockGraphicsDevice::downcast(&info.buffer).contents()[start..start + info.size as usize].to_vec()
}

// ============================================================================
// Allocation Tests
// ============================================================================

#[test]
fn test_no_pool_before_first_allocation() {
    let (mock, _allocator, manager) = setup(2);
    assert_eq!(manager.pool_count(), 0);
    assert!(mock.lock().unwrap().buffers.is_empty());
}

#[test]
fn test_allocations_share_a_pool_at_aligned_offsets() {
    let (_mock, mut allocator, mut manager) = setup(2);

    let a = manager.allocate(&mut allocator, 64, ConstantBufferFlags::empty()).unwrap();
    let b = manager.allocate(&mut allocator, 300, ConstantBufferFlags::empty()).unwrap();
    let c = manager.allocate(&mut allocator, 16, ConstantBufferFlags::empty()).unwrap();

    assert_eq!(manager.pool_count(), 1);
    assert_eq!(manager.get_bind_info(a).unwrap().offset, 0);
    assert_eq!(manager.get_bind_info(b).unwrap().offset, 256);
    assert_eq!(manager.get_bind_info(c).unwrap().offset, 768);
    assert_eq!(manager.get_bind_info(b).unwrap().size, 300);
    assert_eq!(a.index(), 1);
    assert_eq!(c.index(), 3);
}

#[test]
fn test_pools_are_cpu_visible_allocator_buffers() {
    let (_mock, mut allocator, mut manager) = setup(2);
    manager.allocate(&mut allocator, 64, ConstantBufferFlags::empty()).unwrap();

    let pool = manager.pool_buffers().next().unwrap();
    let info = allocator.buffer_info(pool).unwrap();
    assert_eq!(info.allocated_size, POOL_SIZE);
    assert!(!info.flags.contains(GpuAllocationFlags::GPU_ONLY));
}

#[test]
fn test_full_pool_grows_without_moving_existing_handles() {
    let (_mock, mut allocator, mut manager) = setup(2);

    let first = manager.allocate(&mut allocator, 4000, ConstantBufferFlags::empty()).unwrap();
    let first_info = manager.get_bind_info(first).unwrap();
    let second = manager.allocate(&mut allocator, 512, ConstantBufferFlags::empty()).unwrap();

    assert_eq!(manager.pool_count(), 2);
    let again = manager.get_bind_info(first).unwrap();
    assert!(Arc::ptr_eq(&again.buffer, &first_info.buffer));
    assert_eq!(again.offset, first_info.offset);

    let second_info = manager.get_bind_info(second).unwrap();
    assert!(!Arc::ptr_eq(&second_info.buffer, &first_info.buffer));
    assert_eq!(second_info.offset, 0);
}

#[test]
fn test_small_request_backfills_earlier_pool() {
    let (_mock, mut allocator, mut manager) = setup(1);

    let a = manager.allocate(&mut allocator, 3584, ConstantBufferFlags::empty()).unwrap();
    manager.allocate(&mut allocator, 1024, ConstantBufferFlags::empty()).unwrap();
    let c = manager.allocate(&mut allocator, 256, ConstantBufferFlags::empty()).unwrap();

    assert_eq!(manager.pool_count(), 2);
    let a_info = manager.get_bind_info(a).unwrap();
    let c_info = manager.get_bind_info(c).unwrap();
    assert!(Arc::ptr_eq(&a_info.buffer, &c_info.buffer));
    assert_eq!(c_info.offset, 3584);
}

#[test]
fn test_oversized_request_gets_dedicated_pool() {
    let (_mock, mut allocator, mut manager) = setup(2);

    let big = manager.allocate(&mut allocator, 10_000, ConstantBufferFlags::empty()).unwrap();

    let info = manager.get_bind_info(big).unwrap();
    assert_eq!(info.offset, 0);
    assert!(info.buffer.size() >= 10_000);
}

#[test]
#[serial]
fn test_zero_size_allocation_fails() {
    let _capture = CaptureLogger::install();
    let (_mock, mut allocator, mut manager) = setup(2);
    assert!(matches!(
        manager.allocate(&mut allocator, 0, ConstantBufferFlags::BUFFERED),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
#[serial]
fn test_huge_allocation_fails_instead_of_overflowing() {
    let capture = CaptureLogger::install();
    let (mock, mut allocator, mut manager) = setup(2);

    assert!(matches!(
        manager.allocate(&mut allocator, u64::MAX / 2, ConstantBufferFlags::BUFFERED),
        Err(Error::InvalidOperation(_))
    ));
    assert!(matches!(
        manager.allocate(&mut allocator, u64::MAX - 8, ConstantBufferFlags::empty()),
        Err(Error::InvalidOperation(_))
    ));
    assert_eq!(manager.constant_buffer_count(), 0);
    assert_eq!(manager.pool_count(), 0);
    assert!(mock.lock().unwrap().buffers.is_empty());
    assert!(capture.contains(LogSeverity::Error, "overflows the address range"));
}

// ============================================================================
// Frame Rotation Tests
// ============================================================================

#[test]
fn test_buffered_regions_rotate_with_period_n() {
    let (_mock, mut allocator, mut manager) = setup(3);
    let gate = FrameGate::new(3);
    let handle = manager.allocate(&mut allocator, 64, ConstantBufferFlags::BUFFERED).unwrap();

    let mut offsets = Vec::new();
    for frame in 0..4u8 {
        let ticket = gate.acquire().unwrap();
        manager.begin_frame(&ticket);
        manager.update(handle, &[frame + 1; 64]).unwrap();

        let info = manager.get_bind_info(handle).unwrap();
        assert_eq!(region_bytes(&info), vec![frame + 1; 64]);
        offsets.push(info.offset);

        gate.complete(ticket).unwrap();
    }

    // Frames F, F+1, F+2 land in distinct regions, F+3 wraps to F's region
    assert_ne!(offsets[0], offsets[1]);
    assert_ne!(offsets[1], offsets[2]);
    assert_ne!(offsets[0], offsets[2]);
    assert_eq!(offsets[3], offsets[0]);
    for pair in offsets[..3].windows(2) {
        assert!(pair[1].abs_diff(pair[0]) >= 64);
    }
}

#[test]
fn test_update_does_not_touch_in_flight_regions() {
    let (_mock, mut allocator, mut manager) = setup(3);
    let gate = FrameGate::new(3);
    let handle = manager.allocate(&mut allocator, 16, ConstantBufferFlags::BUFFERED).unwrap();

    let t0 = gate.acquire().unwrap();
    manager.begin_frame(&t0);
    manager.update(handle, &[0xA0; 16]).unwrap();
    let frame0 = manager.get_bind_info(handle).unwrap();

    let t1 = gate.acquire().unwrap();
    manager.begin_frame(&t1);
    manager.update(handle, &[0xA1; 16]).unwrap();

    // Frame 0 is still in flight: its region keeps the frame 0 payload
    assert_eq!(region_bytes(&frame0), vec![0xA0; 16]);

    gate.complete(t0).unwrap();
    gate.complete(t1).unwrap();
}

#[test]
fn test_unbuffered_region_ignores_frame() {
    let (_mock, mut allocator, mut manager) = setup(3);
    let gate = FrameGate::new(3);
    let handle = manager.allocate(&mut allocator, 32, ConstantBufferFlags::empty()).unwrap();

    let mut offsets = Vec::new();
    for _ in 0..3 {
        let ticket = gate.acquire().unwrap();
        manager.begin_frame(&ticket);
        offsets.push(manager.get_bind_info(handle).unwrap().offset);
        gate.complete(ticket).unwrap();
    }
    assert!(offsets.iter().all(|&offset| offset == offsets[0]));
}

#[test]
fn test_buffered_allocation_reserves_n_regions() {
    let (_mock, mut allocator, mut manager) = setup(3);

    manager.allocate(&mut allocator, 100, ConstantBufferFlags::BUFFERED).unwrap();
    let next = manager.allocate(&mut allocator, 100, ConstantBufferFlags::empty()).unwrap();

    assert_eq!(manager.get_bind_info(next).unwrap().offset, 3 * 256);
}

// ============================================================================
// Error Path Tests
// ============================================================================

#[test]
#[serial]
fn test_update_larger_than_allocation_fails() {
    let capture = CaptureLogger::install();
    let (_mock, mut allocator, mut manager) = setup(2);
    let handle = manager.allocate(&mut allocator, 16, ConstantBufferFlags::empty()).unwrap();

    assert!(matches!(manager.update(handle, &[0; 17]), Err(Error::InvalidOperation(_))));
    assert!(capture.contains(LogSeverity::Error, "exceeds constant buffer"));
}

#[test]
#[serial]
fn test_unknown_handle() {
    let capture = CaptureLogger::install();
    let (_mock, _allocator, manager) = setup(2);

    assert!(manager.get_bind_info(ConstantBufferHandle::new(5)).is_none());
    assert!(manager.get_bind_info(ConstantBufferHandle::INVALID).is_none());
    assert!(matches!(
        manager.update(ConstantBufferHandle::new(1), &[0]),
        Err(Error::InvalidResource(_))
    ));
    assert!(capture.contains(LogSeverity::Error, "Unknown constant buffer handle"));
}

#[test]
fn test_frame_buffering_count_is_clamped() {
    assert_eq!(ConstantBufferManager::new(POOL_SIZE, 0).frame_buffering_count(), 1);
    assert_eq!(ConstantBufferManager::new(POOL_SIZE, 9).frame_buffering_count(), 3);
}
