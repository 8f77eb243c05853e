//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the fields it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "channels": { "inboundCapacity": 64 },
///   "transport": { "codec": "length_delimited" },
///   "server": { "port": 7000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IoThreadSettings {
    /// Queue capacities between a connection and its downstream processor.
    pub channels: ChannelSettings,
    /// Stream transport framing.
    pub transport: TransportSettings,
    /// Reference server listener.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Upper bound on `server.maxConnections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 1_000_000;

impl IoThreadSettings {
    /// Reject values that would make a connection unusable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.channels.inbound_capacity, "channels.inboundCapacity"),
            (self.channels.outbound_capacity, "channels.outboundCapacity"),
            (self.channels.error_capacity, "channels.errorCapacity"),
            (self.transport.max_frame_size, "transport.maxFrameSize"),
            (self.transport.read_buffer_size, "transport.readBufferSize"),
            (self.server.max_connections, "server.maxConnections"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
            }
        }
        if self.server.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(SettingsError::InvalidValue(format!(
                "server.maxConnections must be <= {MAX_CONNECTIONS_LIMIT}"
            )));
        }
        if self.transport.read_buffer_size > self.transport.max_frame_size {
            return Err(SettingsError::InvalidValue(
                "transport.readBufferSize must not exceed transport.maxFrameSize".into(),
            ));
        }
        Ok(())
    }
}

/// Queue capacities. Every queue is bounded; a full inbound queue throttles
/// reads from the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Inbound payloads awaiting the downstream processor.
    pub inbound_capacity: usize,
    /// Outbound responses awaiting a transport write.
    pub outbound_capacity: usize,
    /// Terminal read errors awaiting the downstream processor.
    pub error_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            inbound_capacity: 256,
            outbound_capacity: 256,
            error_capacity: 1,
        }
    }
}

/// Wire framing used by the stream transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameCodec {
    /// Each read yields whatever bytes are available.
    #[default]
    Raw,
    /// Payloads are prefixed with a 4-byte big-endian length.
    LengthDelimited,
}

/// Stream transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Framing codec.
    pub codec: FrameCodec,
    /// Largest inbound payload accepted, in bytes.
    pub max_frame_size: usize,
    /// Initial read buffer capacity, in bytes.
    pub read_buffer_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            codec: FrameCodec::Raw,
            max_frame_size: 512 * 1024,
            read_buffer_size: 16 * 1024,
        }
    }
}

/// Reference server listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent connections; further accepts are closed at once.
    pub max_connections: usize,
    /// How long shutdown waits for connections to finish.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7379,
            max_connections: 1024,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        IoThreadSettings::default().validate().unwrap();
    }

    #[test]
    fn default_values() {
        let s = IoThreadSettings::default();
        assert_eq!(s.channels.inbound_capacity, 256);
        assert_eq!(s.channels.error_capacity, 1);
        assert_eq!(s.transport.codec, FrameCodec::Raw);
        assert_eq!(s.transport.max_frame_size, 512 * 1024);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 7379);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn empty_json_produces_defaults() {
        let s: IoThreadSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, IoThreadSettings::default());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let s: IoThreadSettings =
            serde_json::from_str(r#"{"channels":{"inboundCapacity":8}}"#).unwrap();
        assert_eq!(s.channels.inbound_capacity, 8);
        assert_eq!(s.channels.outbound_capacity, 256);
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(IoThreadSettings::default()).unwrap();
        assert!(json["channels"].get("inboundCapacity").is_some());
        assert!(json["transport"].get("maxFrameSize").is_some());
        assert!(json["server"].get("shutdownTimeoutSecs").is_some());
    }

    #[test]
    fn codec_uses_snake_case() {
        let json = serde_json::to_string(&FrameCodec::LengthDelimited).unwrap();
        assert_eq!(json, "\"length_delimited\"");
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut s = IoThreadSettings::default();
        s.channels.outbound_capacity = 0;
        let err = s.validate().unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(msg) if msg.contains("outboundCapacity"));
    }

    #[test]
    fn huge_connection_limit_rejected() {
        let mut s = IoThreadSettings::default();
        s.server.max_connections = usize::MAX;
        let err = s.validate().unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(msg) if msg.contains("maxConnections"));

        s.server.max_connections = MAX_CONNECTIONS_LIMIT;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn read_buffer_larger_than_frame_rejected() {
        let mut s = IoThreadSettings::default();
        s.transport.max_frame_size = 1024;
        s.transport.read_buffer_size = 4096;
        assert!(s.validate().is_err());
    }
}
