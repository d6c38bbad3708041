//! Typed opaque resource handles
//!
//! A handle is a 32-bit key into the registry that issued it:
//!
//! ```text
//!  31        24 23                                0
//! +------------+-----------------------------------+
//! |  type tag  |               index               |
//! +------------+-----------------------------------+
//! ```
//!
//! The raw value 0 is reserved as "invalid"; registries hand out indices
//! starting at 1. Every flavor (texture, shader library, mesh, buffer,
//! constant buffer) shares the layout and carries its own type tag, so a raw
//! value can be checked against the flavor it is being turned back into.

/// Number of bits used by the index part of a handle
pub const HANDLE_INDEX_BITS: u32 = 24;

/// Mask selecting the index part of a handle
pub const HANDLE_INDEX_MASK: u32 = (1 << HANDLE_INDEX_BITS) - 1;

/// Largest index a handle can carry
pub const MAX_HANDLE_INDEX: u32 = HANDLE_INDEX_MASK;

/// Reserved raw value for "no resource"
pub const INVALID_HANDLE: u32 = 0;

/// Type tag stored in the high byte of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandleType {
    Texture = 1,
    ShaderLibrary = 2,
    Mesh = 3,
    Buffer = 4,
    ConstantBuffer = 5,
}

impl HandleType {
    /// Decode a tag byte, `None` for unknown tags
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(HandleType::Texture),
            2 => Some(HandleType::ShaderLibrary),
            3 => Some(HandleType::Mesh),
            4 => Some(HandleType::Buffer),
            5 => Some(HandleType::ConstantBuffer),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Pack a type tag and an index into a raw handle
///
/// # Panics
///
/// Panics if `index` does not fit in 24 bits: the overflow would silently
/// alias another resource's handle.
#[inline]
pub fn encode(handle_type: HandleType, index: u32) -> u32 {
    assert!(
        index <= MAX_HANDLE_INDEX,
        "handle index {} exceeds the 24-bit limit ({})",
        index,
        MAX_HANDLE_INDEX
    );
    ((handle_type.tag() as u32) << HANDLE_INDEX_BITS) | index
}

/// Index part of a raw handle
#[inline]
pub fn decode_index(handle: u32) -> u32 {
    handle & HANDLE_INDEX_MASK
}

/// Type tag byte of a raw handle
#[inline]
pub fn decode_type(handle: u32) -> u8 {
    ((handle >> HANDLE_INDEX_BITS) & 0xFF) as u8
}

/// Whether a raw handle refers to anything at all
#[inline]
pub fn is_handle_valid(handle: u32) -> bool {
    handle != INVALID_HANDLE
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident, $handle_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// The reserved "no resource" handle
            pub const INVALID: Self = Self(INVALID_HANDLE);

            /// Type tag carried by this flavor
            pub const TYPE: HandleType = $handle_type;

            /// Encode a registry index (must be >= 1 and fit in 24 bits)
            pub fn new(index: u32) -> Self {
                debug_assert!(index != 0, "index 0 is reserved for the invalid handle");
                Self(encode(Self::TYPE, index))
            }

            /// Rebuild a handle from its raw value
            ///
            /// Returns `None` for the invalid value and for raw values tagged
            /// with another flavor.
            pub fn from_raw(raw: u32) -> Option<Self> {
                if !is_handle_valid(raw) || decode_type(raw) != Self::TYPE.tag() {
                    return None;
                }
                Some(Self(raw))
            }

            /// Raw 32-bit value, for crossing API boundaries
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Registry index
            pub fn index(self) -> u32 {
                decode_index(self.0)
            }

            pub fn is_valid(self) -> bool {
                is_handle_valid(self.0)
            }
        }

        impl From<$name> for u32 {
            fn from(handle: $name) -> u32 {
                handle.0
            }
        }
    };
}

typed_handle!(
    /// Handle to a texture owned by the `TextureManager`
    TextureHandle, HandleType::Texture
);
typed_handle!(
    /// Handle to a shader library owned by the `ShaderManager`
    ShaderHandle, HandleType::ShaderLibrary
);
typed_handle!(
    /// Handle to a mesh owned by the `MeshManager`
    MeshHandle, HandleType::Mesh
);
typed_handle!(
    /// Handle to a GPU buffer owned by the `GpuMemoryAllocator`
    BufferHandle, HandleType::Buffer
);
typed_handle!(
    /// Handle to a logical constant buffer owned by the `ConstantBufferManager`
    ConstantBufferHandle, HandleType::ConstantBuffer
);

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
