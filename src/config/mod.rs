//! Configuration management for Lumen
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files: the application id announced to the compositor, the
//! initial window geometry, buffer retention and the cursor size.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::geometry::Size;

/// Main configuration struct containing all Lumen settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LumenConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Initial window geometry
    #[serde(default)]
    pub window: WindowConfig,

    /// Shared-memory buffer pooling
    #[serde(default)]
    pub buffers: BufferConfig,

    /// Cursor theme
    #[serde(default)]
    pub cursor: CursorConfig,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Application id set on every toplevel (`xdg_toplevel.set_app_id`)
    pub app_id: String,
}

/// Window settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Width of a new window before the compositor configures it (pixels)
    pub default_width: u32,

    /// Height of a new window before the compositor configures it (pixels)
    pub default_height: u32,

    /// Device pixels per toolkit unit
    pub scale: u32,
}

/// Buffer pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    /// Released buffers kept per window for reuse
    pub max_free_buffers: usize,
}

/// Cursor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CursorConfig {
    /// Cursor image edge length (pixels)
    pub size: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_id: "org.lumen.demo".to_string(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_width: 640,
            default_height: 480,
            scale: 1,
        }
    }
}

impl WindowConfig {
    pub fn default_size(&self) -> Size {
        Size::new(self.default_width, self.default_height)
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_free_buffers: crate::shm::pool::DEFAULT_MAX_FREE_BUFFERS,
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self { size: 24 }
    }
}

impl LumenConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = match path.strip_prefix("~") {
            Ok(rest) => {
                let home =
                    std::env::var("HOME").context("Failed to get HOME environment variable")?;
                Path::new(&home).join(rest)
            }
            Err(_) => path.to_path_buf(),
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: LumenConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.general.app_id.trim().is_empty() {
            anyhow::bail!("Invalid app_id: must not be empty");
        }

        let size = self.window.default_size();
        if size.is_empty() {
            anyhow::bail!("Invalid default window size {}: must be non-zero", size);
        }
        if size.byte_len() > i32::MAX as u64 {
            anyhow::bail!("Invalid default window size {}: too large for shared memory", size);
        }

        if !(1..=8).contains(&self.window.scale) {
            anyhow::bail!("Invalid scale: must be an integer between 1 and 8");
        }

        if !(1..=64).contains(&self.buffers.max_free_buffers) {
            anyhow::bail!("Invalid max_free_buffers: must be between 1 and 64");
        }

        if !(1..=256).contains(&self.cursor.size) {
            anyhow::bail!("Invalid cursor size: must be between 1 and 256");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
