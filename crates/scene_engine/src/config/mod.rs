//! Configuration file support
//!
//! Display and engine settings load from TOML or RON; the format is chosen
//! by file extension.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format for a file path
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.to_string())),
        }
    }

    fn parse<T: for<'de> Deserialize<'de>>(self, contents: &str) -> Result<T, ConfigError> {
        let parsed = match self {
            Self::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
            Self::Ron => ron::from_str(contents).map_err(|e| e.to_string()),
        };
        parsed.map_err(ConfigError::Parse)
    }

    fn write<T: Serialize>(self, value: &T) -> Result<String, ConfigError> {
        let written = match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default()).map_err(|e| e.to_string()),
        };
        written.map_err(ConfigError::Serialize)
    }
}

/// Configuration that can be loaded from and saved to disk
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        format.parse(&contents)
    }

    /// Parse configuration text in the format implied by `path`
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        ConfigFormat::from_path(path)?.parse(contents)
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = ConfigFormat::from_path(path)?.write(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or RON for the target type
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Extension other than `.toml` or `.ron`
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path("display.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("dir.v2/display.ron").unwrap(), ConfigFormat::Ron);
        assert!(matches!(
            ConfigFormat::from_path("display.toml.bak"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(ConfigFormat::from_path("display").is_err());
    }
}
