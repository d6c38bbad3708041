use super::*;
use crate::utils::pool_allocator::PoolAllocator;
use crate::log::LogSeverity;
use crate::test_utils::CaptureLogger;
use serial_test::serial;

// ============================================================================
// FIFO tests
// ============================================================================

#[test]
fn test_fifo_order_and_peek() {
    let mut ring: RingBuffer<u32> = RingBuffer::new(4);
    for value in [10, 12, 14, 17] {
        assert!(ring.push(value));
    }

    // front() is non-destructive
    assert_eq!(ring.front(), Some(10));
    assert_eq!(ring.front(), Some(10));
    assert_eq!(ring.used_element_count(), 4);

    let mut expected_count = 4;
    for expected in [10, 12, 14, 17] {
        assert_eq!(ring.pop(), Some(expected));
        expected_count -= 1;
        assert_eq!(ring.used_element_count(), expected_count);
    }
    assert!(ring.is_empty());
    assert_eq!(ring.pop(), None);
    assert_eq!(ring.front(), None);
}

#[test]
fn test_push_on_full_fails_without_mutation() {
    let mut ring: RingBuffer<u32> = RingBuffer::new(3);
    assert!(ring.push(1));
    assert!(ring.push(2));
    assert!(ring.push(3));
    assert!(!ring.push(4));
    assert!(ring.is_full());
    assert_eq!(ring.used_element_count(), 3);
    assert_eq!(ring.front(), Some(1));
}

#[test]
fn test_wraparound() {
    let mut ring: RingBuffer<u32> = RingBuffer::new(3);
    ring.push(1);
    ring.push(2);
    assert_eq!(ring.pop(), Some(1));
    ring.push(3);
    ring.push(4); // wraps to slot 0
    assert!(ring.is_full());
    assert_eq!(ring.pop(), Some(2));
    assert_eq!(ring.pop(), Some(3));
    assert_eq!(ring.pop(), Some(4));
    assert!(ring.is_empty());
}

#[test]
fn test_large_ring_wraparound_many_times() {
    let mut ring: RingBuffer<u64> = RingBuffer::new(17);
    let mut next_in = 0u64;
    let mut next_out = 0u64;
    for _ in 0..100 {
        while ring.push(next_in) {
            next_in += 1;
        }
        for _ in 0..5 {
            assert_eq!(ring.pop(), Some(next_out));
            next_out += 1;
        }
    }
    assert_eq!(ring.used_element_count() as u64, next_in - next_out);
}

#[test]
fn test_clear() {
    let mut ring: RingBuffer<u8> = RingBuffer::new(2);
    ring.push(1);
    ring.push(2);
    ring.clear();
    assert!(ring.is_empty());
    assert!(ring.push(3));
    assert_eq!(ring.front(), Some(3));
}

#[test]
fn test_zero_capacity() {
    let mut ring: RingBuffer<u8> = RingBuffer::new(0);
    assert!(ring.is_empty());
    assert!(ring.is_full());
    assert!(!ring.push(1));
    assert_eq!(ring.pop(), None);
}

// ============================================================================
// Storage mode tests
// ============================================================================

#[test]
fn test_small_capacity_is_inline() {
    let ring: RingBuffer<u32> = RingBuffer::new(9);
    assert!(ring.uses_small_size_optimization());
    let at_limit: RingBuffer<u32> = RingBuffer::new(RING_BUFFER_INLINE_CAPACITY);
    assert!(at_limit.uses_small_size_optimization());
}

#[test]
fn test_large_capacity_is_not_inline() {
    let ring: RingBuffer<u32> = RingBuffer::new(15);
    assert!(!ring.uses_small_size_optimization());
    assert_eq!(ring.capacity(), 15);
}

#[test]
fn test_mode_selection_with_pool() {
    let pool = PoolAllocator::<u32>::shared();
    let small = RingBuffer::with_pool(9, &pool);
    let large = RingBuffer::with_pool(15, &pool);
    assert!(small.uses_small_size_optimization());
    assert!(!large.uses_small_size_optimization());
    // Only the large ring took a block
    assert_eq!(pool.lock().unwrap().outstanding_count(), 1);
}

#[test]
fn test_pooled_block_returned_on_drop_and_reused() {
    let pool = PoolAllocator::<u32>::shared();
    {
        let mut ring = RingBuffer::with_pool(20, &pool);
        ring.push(5);
        assert_eq!(pool.lock().unwrap().outstanding_count(), 1);
    }
    {
        let guard = pool.lock().unwrap();
        assert_eq!(guard.outstanding_count(), 0);
        assert_eq!(guard.cached_block_count(20), 1);
    }

    // Same size class (32) is served from the cache
    let ring = RingBuffer::with_pool(30, &pool);
    assert!(ring.is_empty());
    assert_eq!(pool.lock().unwrap().cached_block_count(20), 0);
}

#[test]
fn test_pooled_ring_behaves_like_plain_ring() {
    let pool = PoolAllocator::<u32>::shared();
    let mut ring = RingBuffer::with_pool(12, &pool);
    for value in 0..12 {
        assert!(ring.push(value));
    }
    assert!(!ring.push(99));
    for value in 0..12 {
        assert_eq!(ring.pop(), Some(value));
    }
}

#[test]
#[serial]
fn test_pooled_ring_dropped_after_pool_poisoned() {
    let capture = CaptureLogger::install();
    let pool = PoolAllocator::<u32>::shared();
    let mut ring = RingBuffer::with_pool(20, &pool);
    ring.push(1);

    let poisoner = pool.clone();
    let _ = std::thread::spawn(move || {
        let _guard = poisoner.lock().unwrap();
        panic!("pool owner panicked");
    })
    .join();
    assert!(pool.is_poisoned());

    drop(ring);
    assert!(capture.contains(LogSeverity::Warn, "dropping 32 element block"));
}

// ============================================================================
// PoolAllocator tests
// ============================================================================

#[test]
fn test_pool_size_classes() {
    assert_eq!(PoolAllocator::<u8>::size_class(0), 1);
    assert_eq!(PoolAllocator::<u8>::size_class(11), 16);
    assert_eq!(PoolAllocator::<u8>::size_class(16), 16);
    assert_eq!(PoolAllocator::<u8>::size_class(17), 32);
}

#[test]
fn test_pool_acquire_release_counts() {
    let mut pool = PoolAllocator::<u16>::new();
    let a = pool.acquire(100);
    assert_eq!(a.len(), 128);
    let b = pool.acquire(100);
    assert_eq!(pool.outstanding_count(), 2);
    pool.release(a);
    pool.release(b);
    assert_eq!(pool.outstanding_count(), 0);
    assert_eq!(pool.cached_block_count(128), 2);
}
