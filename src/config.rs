//! Configuration for loading and saving EDMX documents
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (edmx.toml)
//! - Environment variables (EDMX__*)
//!
//! ## Example config file (edmx.toml):
//! ```toml
//! [load]
//! diagram_side_file = true
//!
//! [save]
//! indent = 2
//! update_marker = true
//! diagram_side_file = true
//!
//! [events]
//! journal = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::xml::WriteOptions;

/// Main configuration for document I/O
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Load settings
    #[serde(default)]
    pub load: LoadConfig,

    /// Save settings
    #[serde(default)]
    pub save: SaveConfig,

    /// Change event settings
    #[serde(default)]
    pub events: EventConfig,
}

/// Load configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Read the layout from `<file>.diagram` when it exists next to the document
    #[serde(default = "default_true")]
    pub diagram_side_file: bool,
}

/// Save configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Spaces per nesting level (0 = single line)
    #[serde(default = "default_indent")]
    pub indent: usize,

    /// Replace the "Last updated" comment before the root element on every save
    #[serde(default = "default_true")]
    pub update_marker: bool,

    /// Write a diagram that came from a side file back to that side file
    #[serde(default = "default_true")]
    pub diagram_side_file: bool,
}

/// Change event configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Keep every event until `take_events`; listeners are called either way
    #[serde(default = "default_true")]
    pub journal: bool,
}

fn default_true() -> bool {
    true
}

fn default_indent() -> usize {
    2
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            diagram_side_file: true,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { journal: true }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            update_marker: true,
            diagram_side_file: true,
        }
    }
}

impl ModelConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["edmx.toml", ".edmx.toml", "config/edmx.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "edmx") {
            let xdg_config = config_dir.config_dir().join("edmx.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // EDMX__SAVE__INDENT=4 and friends
        builder = builder.add_source(
            Environment::with_prefix("EDMX")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            indent: self.save.indent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert!(config.load.diagram_side_file);
        assert_eq!(config.save.indent, 2);
        assert!(config.save.update_marker);
        assert!(config.events.journal);
    }

    #[test]
    fn test_serialize_config() {
        let config = ModelConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[load]"));
        assert!(toml_str.contains("[save]"));
        assert!(toml_str.contains("[events]"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[save]\nindent = 4\nupdate_marker = false\n").unwrap();

        let config = ModelConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.save.indent, 4);
        assert!(!config.save.update_marker);
        assert!(config.save.diagram_side_file);
        assert_eq!(config.write_options().indent, 4);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = ModelConfig::default();
        config.load.diagram_side_file = false;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded: ModelConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }
}
