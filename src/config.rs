//! Configuration loading and saving.
//!
//! Runtime options for capture sessions live in a TOML file: the default
//! resolution and rate, an optional preferred device, and the surface
//! pool depth.

use crate::errors::CaptureError;
use crate::surface::DEFAULT_POOL_SURFACES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramegrabConfig {
    pub capture: CaptureConfig,
    pub pool: PoolConfig,
}

/// Capture session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Requested resolution [width, height]; the backend negotiates the
    /// nearest mode the device offers.
    pub default_resolution: [u32; 2],
    /// Requested frames per second.
    pub default_fps: u32,
    /// Substring of the preferred device name; empty means the default
    /// device choice.
    pub preferred_device: String,
    /// Re-enumerate devices on session creation instead of trusting the
    /// cached list.
    pub force_refresh_on_start: bool,
}

/// Surface pool tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pre-allocated frame buffers per session.
    pub surfaces: usize,
}

impl Default for FramegrabConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                default_resolution: [640, 480],
                default_fps: 30,
                preferred_device: String::new(),
                force_refresh_on_start: false,
            },
            pool: PoolConfig {
                surfaces: DEFAULT_POOL_SURFACES,
            },
        }
    }
}

impl FramegrabConfig {
    /// Load configuration from a TOML file. A missing file is not an
    /// error; defaults are returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CaptureError::InitFailed(format!("reading config file: {}", e)))?;

        let config: FramegrabConfig = toml::from_str(&contents)
            .map_err(|e| CaptureError::InitFailed(format!("parsing config file: {}", e)))?;

        log::info!("loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::InitFailed(format!("creating config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CaptureError::InitFailed(format!("serializing config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CaptureError::InitFailed(format!("writing config file: {}", e)))?;

        log::info!("saved configuration to {:?}", path);
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("framegrab.toml")
    }

    /// Load from the default location, falling back to defaults on any
    /// failure.
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.capture.default_resolution[0] == 0 || self.capture.default_resolution[1] == 0 {
            return Err("invalid default resolution".to_string());
        }
        if self.capture.default_fps == 0 || self.capture.default_fps > 240 {
            return Err("invalid default FPS (must be 1-240)".to_string());
        }
        if self.pool.surfaces == 0 || self.pool.surfaces > 64 {
            return Err("pool surfaces must be between 1 and 64".to_string());
        }
        Ok(())
    }
}
