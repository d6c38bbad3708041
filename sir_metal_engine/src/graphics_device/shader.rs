/// Shader library trait and descriptor

use std::any::Any;

/// Descriptor for creating a shader library
///
/// `code` is backend bytecode (SPIR-V words for Vulkan).
#[derive(Debug, Clone)]
pub struct ShaderLibraryDesc<'a> {
    pub name: &'a str,
    pub code: &'a [u8],
}

/// Compiled shader library
pub trait ShaderLibrary: Send + Sync {
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}
