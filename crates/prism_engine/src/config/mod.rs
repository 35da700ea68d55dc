//! Configuration system
//!
//! Settings structs are plain serde types; [`Config`] adds file loading and
//! saving in TOML or RON, picked by file extension.
//!
//! Structs mark themselves `#[serde(default)]`, so a file only needs the
//! keys it changes:
//!
//! ```no_run
//! use prism_engine::config::{Config, RendererConfig};
//!
//! # fn main() -> Result<(), prism_engine::config::ConfigError> {
//! let config = RendererConfig::load_from_file("renderer.toml")?;
//! config.save_to_file("renderer.ron")?;
//! # Ok(())
//! # }
//! ```

pub use serde::{Deserialize, Serialize};

mod renderer;

pub use renderer::{RendererConfig, ShaderConfig, ShaderSet, ShadowConfig, WindowConfig};

/// File persistence for settings structs
///
/// Both methods dispatch on the `.toml` / `.ron` suffix of `path`; any other
/// suffix is [`ConfigError::UnsupportedFormat`] and touches no file.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Read and parse `path`
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Serialize pretty-printed and write `path`, replacing any existing file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents are not valid for the target struct
    #[error("Parse error: {0}")]
    Parse(String),

    /// The struct could not be encoded
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Path has neither a `.toml` nor a `.ron` suffix
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        count: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "sample".to_string(),
                count: 3,
            }
        }
    }

    impl Config for Sample {}

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("prism_config_{}_{}", std::process::id(), name))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_unknown_extension_is_rejected_without_writing() {
        let path = temp_path("settings.json");
        let result = Sample::default().save_to_file(&path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
        assert!(!std::path::Path::new(&path).exists());
    }

    #[test]
    fn test_ron_round_trip() {
        let path = temp_path("settings.ron");
        let sample = Sample {
            name: "ron".to_string(),
            count: 9,
        };
        sample.save_to_file(&path).expect("save ron");
        let loaded = Sample::load_from_file(&path).expect("load ron");
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Sample::load_from_file(&temp_path("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let path = temp_path("broken.toml");
        std::fs::write(&path, "count = \"three\"").expect("write file");
        let result = Sample::load_from_file(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
