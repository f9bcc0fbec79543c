//! Configuration management for altairx-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`AXEMU_ROM_KIB`, `AXEMU_WRAM_KIB`, `AXEMU_ENTRY`)
//! 2. Project-local config file (`./altairx-emu.toml`)
//! 3. User config file (`~/.config/altairx-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # altairx-emu.toml
//!
//! # Kernel ROM size in KiB
//! rom_kib = 64
//!
//! # Working RAM size in KiB (holds the program image)
//! wram_kib = 16384
//!
//! # Default entry point (byte address) for raw program images
//! entry_point = 0
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// altairx-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Kernel ROM size in KiB.
    pub rom_kib: Option<u64>,

    /// Working RAM size in KiB.
    pub wram_kib: Option<u64>,

    /// Default entry point (byte address) for raw program images.
    pub entry_point: Option<u64>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `altairx-emu.toml`
    /// 3. User config `~/.config/altairx-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("loaded configuration: {:?}", config);
            config
        })
    }

    /// ROM size in bytes (default 64 KiB).
    pub fn rom_bytes(&self) -> usize {
        (self.rom_kib.unwrap_or(64) * 1024) as usize
    }

    /// WRAM size in bytes (default 16 MiB).
    pub fn wram_bytes(&self) -> usize {
        (self.wram_kib.unwrap_or(16 * 1024) * 1024) as usize
    }

    /// Default entry point byte address (default 0).
    pub fn entry_point(&self) -> u64 {
        self.entry_point.unwrap_or(0)
    }

    /// Load user configuration from ~/.config/altairx-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("altairx-emu").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./altairx-emu.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("altairx-emu.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("loaded config from {}", path.display());
                    Some(config)
                }
                Err(err) => {
                    log::warn!("failed to parse {}: {}", path.display(), err);
                    None
                }
            },
            Err(err) => {
                log::warn!("failed to read {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.rom_kib.is_some() {
            self.rom_kib = other.rom_kib;
        }
        if other.wram_kib.is_some() {
            self.wram_kib = other.wram_kib;
        }
        if other.entry_point.is_some() {
            self.entry_point = other.entry_point;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(value) = env_u64("AXEMU_ROM_KIB") {
            self.rom_kib = Some(value);
        }
        if let Some(value) = env_u64("AXEMU_WRAM_KIB") {
            self.wram_kib = Some(value);
        }
        if let Some(value) = env_u64("AXEMU_ENTRY") {
            self.entry_point = Some(value);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("altairx-emu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# altairx-emu configuration
# Place this file at ~/.config/altairx-emu/config.toml or ./altairx-emu.toml

# Kernel ROM size in KiB
# rom_kib = 64

# Working RAM size in KiB (holds the program image)
# wram_kib = 16384

# Default entry point (byte address) for raw program images
# entry_point = 0
"#
        .to_string()
    }
}

/// Parse an environment variable as a decimal or 0x-prefixed integer.
fn env_u64(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    match parsed {
        Ok(parsed) => {
            log::info!("using {name}={value} from environment");
            Some(parsed)
        }
        Err(_) => {
            log::warn!("ignoring unparseable {name}={value}");
            None
        }
    }
}
