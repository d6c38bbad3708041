/// Shader manager - shader library registry keyed by `ShaderHandle` and by name.
///
/// Loading a library under a name that is already registered replaces the
/// library in place: the handle stays the same, so materials holding it pick
/// up the new code (shader hot-reload).

use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::graphics_device::{self, GraphicsDevice, ShaderLibrary, ShaderLibraryDesc};
use crate::handle::{ShaderHandle, MAX_HANDLE_INDEX};
use crate::{engine_bail, engine_error, engine_info};

#[derive(Default)]
pub struct ShaderManager {
    /// Handle index `i` lives at `libraries[i - 1]`
    libraries: Vec<Arc<dyn ShaderLibrary>>,
    name_to_handle: FxHashMap<String, ShaderHandle>,
}

impl ShaderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `code` into a library named `name`
    ///
    /// Returns `ShaderHandle::INVALID` (logged) when the device rejects the
    /// code. A failed reload keeps the previous library.
    pub fn load_library(
        &mut self,
        graphics_device: &Arc<Mutex<dyn GraphicsDevice>>,
        name: &str,
        code: &[u8],
    ) -> ShaderHandle {
        match self.try_load_library(graphics_device, name, code) {
            Ok(handle) => handle,
            Err(err) => {
                engine_error!("sirmetal::ShaderManager",
                    "Failed to load shader library '{}': {}", name, err);
                ShaderHandle::INVALID
            }
        }
    }

    fn try_load_library(
        &mut self,
        graphics_device: &Arc<Mutex<dyn GraphicsDevice>>,
        name: &str,
        code: &[u8],
    ) -> Result<ShaderHandle> {
        if name.is_empty() {
            engine_bail!(InvalidOperation => "sirmetal::ShaderManager", "Shader library name is empty");
        }
        let existing = self.name_to_handle.get(name).copied();
        if existing.is_none() && self.libraries.len() as u32 >= MAX_HANDLE_INDEX {
            engine_bail!(InvalidOperation => "sirmetal::ShaderManager",
                "Shader registry is full ({} libraries)", self.libraries.len());
        }

        let library = graphics_device::lock_device(graphics_device, "sirmetal::ShaderManager")?
            .create_shader_library(&ShaderLibraryDesc { name, code })?;

        let handle = match existing {
            Some(handle) => {
                self.libraries[handle.index() as usize - 1] = library;
                engine_info!("sirmetal::ShaderManager", "Reloaded shader library '{}'", name);
                handle
            }
            None => {
                self.libraries.push(library);
                let handle = ShaderHandle::new(self.libraries.len() as u32);
                self.name_to_handle.insert(name.to_string(), handle);
                engine_info!("sirmetal::ShaderManager",
                    "Loaded shader library '{}' #{} ({} bytes)", name, handle.index(), code.len());
                handle
            }
        };
        Ok(handle)
    }

    /// Library behind `handle`, `None` (logged) if unknown
    pub fn library(&self, handle: ShaderHandle) -> Option<Arc<dyn ShaderLibrary>> {
        let library = if handle.is_valid() {
            self.libraries.get(handle.index() as usize - 1)
        } else {
            None
        };
        if library.is_none() {
            engine_error!("sirmetal::ShaderManager", "Unknown shader handle {:#010x}", handle.raw());
        }
        library.cloned()
    }

    /// Handle registered under `name`, `ShaderHandle::INVALID` (logged) if none
    pub fn handle_by_name(&self, name: &str) -> ShaderHandle {
        match self.name_to_handle.get(name) {
            Some(&handle) => handle,
            None => {
                engine_error!("sirmetal::ShaderManager", "No shader library named '{}'", name);
                ShaderHandle::INVALID
            }
        }
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }
}

#[cfg(test)]
#[path = "shader_manager_tests.rs"]
mod tests;
