use super::*;

// ============================================================================
// Encode / decode tests
// ============================================================================

#[test]
fn test_encode_layout() {
    let raw = encode(HandleType::Buffer, 0x00_12_34_56);
    assert_eq!(raw, 0x04_12_34_56);
}

#[test]
fn test_roundtrip_all_types_edge_indices() {
    let types = [
        HandleType::Texture,
        HandleType::ShaderLibrary,
        HandleType::Mesh,
        HandleType::Buffer,
        HandleType::ConstantBuffer,
    ];
    let indices = [1, 2, 255, 256, 65_535, 65_536, MAX_HANDLE_INDEX - 1, MAX_HANDLE_INDEX];
    for &t in &types {
        for &index in &indices {
            let raw = encode(t, index);
            assert_eq!(decode_type(raw), t.tag());
            assert_eq!(decode_index(raw), index);
            assert_eq!(HandleType::from_tag(decode_type(raw)), Some(t));
        }
    }
}

#[test]
#[should_panic(expected = "24-bit limit")]
fn test_encode_index_overflow_panics() {
    encode(HandleType::Mesh, MAX_HANDLE_INDEX + 1);
}

#[test]
fn test_zero_is_invalid() {
    assert!(!is_handle_valid(0));
    assert!(is_handle_valid(encode(HandleType::Texture, 1)));
}

#[test]
fn test_unknown_tag() {
    assert_eq!(HandleType::from_tag(0), None);
    assert_eq!(HandleType::from_tag(6), None);
    assert_eq!(HandleType::from_tag(0xFF), None);
}

// ============================================================================
// Typed handle tests
// ============================================================================

#[test]
fn test_typed_handle_new_and_index() {
    let h = BufferHandle::new(42);
    assert!(h.is_valid());
    assert_eq!(h.index(), 42);
    assert_eq!(decode_type(h.raw()), HandleType::Buffer.tag());
}

#[test]
fn test_typed_handle_invalid_default() {
    assert_eq!(TextureHandle::default(), TextureHandle::INVALID);
    assert!(!TextureHandle::INVALID.is_valid());
    assert_eq!(TextureHandle::INVALID.raw(), 0);
}

#[test]
fn test_from_raw_accepts_matching_flavor() {
    let raw = MeshHandle::new(9).raw();
    let back = MeshHandle::from_raw(raw).unwrap();
    assert_eq!(back.index(), 9);
}

#[test]
fn test_from_raw_rejects_other_flavor() {
    let raw = TextureHandle::new(3).raw();
    assert!(BufferHandle::from_raw(raw).is_none());
    assert!(ShaderHandle::from_raw(raw).is_none());
    assert!(ConstantBufferHandle::from_raw(raw).is_none());
}

#[test]
fn test_from_raw_rejects_invalid() {
    assert!(ConstantBufferHandle::from_raw(0).is_none());
}

#[test]
fn test_same_index_different_flavors_differ() {
    let a = TextureHandle::new(5).raw();
    let b = MeshHandle::new(5).raw();
    assert_ne!(a, b);
    assert_eq!(decode_index(a), decode_index(b));
}

#[test]
fn test_handle_into_u32() {
    let h = ShaderHandle::new(11);
    let raw: u32 = h.into();
    assert_eq!(raw, h.raw());
}
