use std::ops::{Deref, DerefMut};

/// LIFO byte arena for per-frame scratch data.
///
/// `allocate` bumps the stack pointer, `free` moves it back down by the same
/// size, `reset` drops everything at once. Allocations are returned as byte
/// offsets from the start of the arena (the start is offset 0).
///
/// `free` is by size, not by allocation: callers must free in the exact
/// reverse order and with the exact sizes they allocated. Prefer `scope()`,
/// which restores the stack pointer automatically.
///
/// # Example
///
/// ```ignore
/// let mut arena = StackAllocator::new(1024);
/// let a = arena.allocate(16).unwrap(); // 0
/// let b = arena.allocate(16).unwrap(); // 16
/// arena.free(16);                      // back to 16
/// arena.free(16);                      // back to 0
/// ```
pub struct StackAllocator {
    memory: Box<[u8]>,
    stack_pointer: usize,
}

impl StackAllocator {
    /// Create an arena of `capacity` bytes with the stack pointer at the start
    pub fn new(capacity: usize) -> Self {
        Self {
            memory: vec![0u8; capacity].into_boxed_slice(),
            stack_pointer: 0,
        }
    }

    /// Reserve `size` bytes and return their offset
    ///
    /// Returns `None` (and logs) when the remaining capacity is too small;
    /// the stack pointer is left untouched in that case.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if size > self.remaining() {
            crate::engine_error!("sirmetal::StackAllocator",
                "Out of stack memory: requested {} bytes, {} of {} remaining",
                size, self.remaining(), self.capacity());
            return None;
        }
        let offset = self.stack_pointer;
        self.stack_pointer += size;
        Some(offset)
    }

    /// Release the `size` most recently allocated bytes
    ///
    /// Returns the new stack pointer.
    pub fn free(&mut self, size: usize) -> usize {
        if size > self.stack_pointer {
            crate::engine_error!("sirmetal::StackAllocator",
                "Freeing {} bytes with only {} allocated (LIFO order violated)",
                size, self.stack_pointer);
            self.stack_pointer = 0;
        } else {
            self.stack_pointer -= size;
        }
        self.stack_pointer
    }

    /// Drop every allocation at once
    pub fn reset(&mut self) {
        self.stack_pointer = 0;
    }

    /// Current stack pointer (bytes in use)
    pub fn position(&self) -> usize {
        self.stack_pointer
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn remaining(&self) -> usize {
        self.memory.len() - self.stack_pointer
    }

    /// Read access to an allocated range
    ///
    /// Returns `None` if the range reaches past the stack pointer.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.stack_pointer {
            return None;
        }
        Some(&self.memory[offset..end])
    }

    /// Write access to an allocated range
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.stack_pointer {
            return None;
        }
        Some(&mut self.memory[offset..end])
    }

    /// Open a scope; every allocation made through it is released on drop
    pub fn scope(&mut self) -> StackScope<'_> {
        let marker = self.stack_pointer;
        StackScope { allocator: self, marker }
    }
}

/// Guard restoring the stack pointer of a `StackAllocator` when dropped.
///
/// Dereferences to the allocator, so nested scopes and plain allocations
/// work through it.
pub struct StackScope<'a> {
    allocator: &'a mut StackAllocator,
    marker: usize,
}

impl StackScope<'_> {
    /// Stack pointer at the time the scope was opened
    pub fn marker(&self) -> usize {
        self.marker
    }
}

impl Deref for StackScope<'_> {
    type Target = StackAllocator;

    fn deref(&self) -> &StackAllocator {
        self.allocator
    }
}

impl DerefMut for StackScope<'_> {
    fn deref_mut(&mut self) -> &mut StackAllocator {
        self.allocator
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        // A free or reset below the marker inside the scope stays in effect
        self.allocator.stack_pointer = self.allocator.stack_pointer.min(self.marker);
    }
}

#[cfg(test)]
#[path = "stack_allocator_tests.rs"]
mod tests;
