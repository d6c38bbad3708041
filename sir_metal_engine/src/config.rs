/// Engine configuration, read from a JSON file at startup.
///
/// ```json
/// {
///     "dataSource": "assets/sponza",
///     "startFullScreen": false,
///     "windowTitle": "SirMetal",
///     "windowWidth": 1280,
///     "windowHeight": 720,
///     "frameBufferingCount": 2
/// }
/// ```
///
/// Every key is optional. A missing file yields the defaults; a file that is
/// not valid JSON is an error.

use std::io::ErrorKind;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::frame::MAX_FRAMES_IN_FLIGHT;
use crate::{engine_bail, engine_info, engine_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Project or asset directory to load
    pub data_source: String,
    pub start_full_screen: bool,
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Frames the GPU may have in flight (1..=MAX_FRAMES_IN_FLIGHT)
    pub frame_buffering_count: u32,
    /// Size of each constant buffer pool, in bytes
    pub constant_buffer_pool_size: u64,
    /// Size of the per-frame scratch arena, in bytes
    pub scratch_arena_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_source: String::new(),
            start_full_screen: false,
            window_title: "SirMetal".to_string(),
            window_width: 1280,
            window_height: 720,
            frame_buffering_count: 2,
            constant_buffer_pool_size: 4 * 1024 * 1024,
            scratch_arena_size: 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to the defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                engine_warn!("sirmetal::EngineConfig",
                    "Config file '{}' not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                engine_bail!(InitializationFailed => "sirmetal::EngineConfig",
                    "Cannot read config file '{}': {}", path.display(), err);
            }
        };
        let config = Self::parse(&text, &path.display().to_string())?;
        engine_info!("sirmetal::EngineConfig", "Loaded config from '{}'", path.display());
        Ok(config)
    }

    /// Parse an in-memory JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::parse(json, "<memory>")
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            crate::engine_err!(InvalidOperation => "sirmetal::EngineConfig",
                "Cannot serialize config: {}", err)
        })
    }

    fn parse(json: &str, origin: &str) -> Result<Self> {
        let mut config: Self = match serde_json::from_str(json) {
            Ok(config) => config,
            Err(err) => {
                engine_bail!(InitializationFailed => "sirmetal::EngineConfig",
                    "Malformed config '{}': {}", origin, err);
            }
        };
        config.clamp_frame_buffering_count();
        Ok(config)
    }

    fn clamp_frame_buffering_count(&mut self) {
        let clamped = self.frame_buffering_count.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if clamped != self.frame_buffering_count {
            engine_warn!("sirmetal::EngineConfig",
                "frameBufferingCount {} out of range, using {}", self.frame_buffering_count, clamped);
            self.frame_buffering_count = clamped;
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
