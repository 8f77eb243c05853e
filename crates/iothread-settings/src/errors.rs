//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON.
    #[error("malformed JSON in {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser failure with line and column.
        #[source]
        source: serde_json::Error,
    },

    /// The merged document does not fit the settings schema.
    #[error("settings do not match schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// A value parsed but is out of range (e.g. a zero channel capacity).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/iothread.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("cannot read /etc/iothread.json"));
        assert!(err.source().is_some());
    }

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        assert!(err.to_string().contains("malformed JSON in settings.json"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("channels.inboundCapacity must be > 0".into());
        assert_eq!(
            err.to_string(),
            "invalid settings value: channels.inboundCapacity must be > 0"
        );
    }
}
