//! JSON messages exchanged between agents and the server.
//!
//! Every frame is one JSON object with a `type` discriminator.

use crate::error::{Error, Result};
use crate::shell::{ExecutionResult, ShellVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;

/// Default remote execution budget when a message carries none
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A command addressed to one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_id: String,
    pub command: String,
    #[serde(rename = "timeout", default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Host description sent with `register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub system: String,
    pub version: String,
}

impl HostInfo {
    /// Describe the local host
    #[must_use]
    pub fn detect() -> Self {
        Self {
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
            system: sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            version: sysinfo::System::long_os_version().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Register {
        platform: ShellVariant,
        #[serde(flatten)]
        host: HostInfo,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    Registered {
        platform: ShellVariant,
        server_time: DateTime<Utc>,
    },
    Execute {
        #[serde(flatten)]
        envelope: CommandEnvelope,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "result")]
    CommandResult {
        command_id: String,
        result: ExecutionResult,
    },
    Heartbeat {
        platform: ShellVariant,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    Status {
        #[serde(default)]
        platform: Option<ShellVariant>,
        status: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    Ping {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    Pong {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    Shutdown,
}

impl Message {
    #[must_use]
    pub fn ping() -> Self {
        Message::Ping { timestamp: Utc::now() }
    }

    #[must_use]
    pub fn pong() -> Self {
        Message::Pong { timestamp: Utc::now() }
    }

    #[must_use]
    pub fn heartbeat(platform: ShellVariant) -> Self {
        Message::Heartbeat {
            platform,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn execute(envelope: CommandEnvelope) -> Self {
        Message::Execute {
            envelope,
            timestamp: Utc::now(),
        }
    }

    /// The `type` tag, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Register { .. } => "register",
            Message::Registered { .. } => "registered",
            Message::Execute { .. } => "execute",
            Message::CommandResult { .. } => "result",
            Message::Heartbeat { .. } => "heartbeat",
            Message::Status { .. } => "status",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Shutdown => "shutdown",
        }
    }

    /// Parse one text frame
    ///
    /// # Errors
    /// Returns [`Error::Json`] for malformed or unknown messages
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a WebSocket text frame
    ///
    /// # Errors
    /// Returns [`Error::Json`] if serialization fails
    pub fn to_frame(&self) -> Result<tungstenite::Message> {
        Ok(tungstenite::Message::Text(serde_json::to_string(self)?))
    }

    /// Decode a WebSocket frame.
    ///
    /// Returns `Ok(None)` for control frames that carry no message.
    ///
    /// # Errors
    /// Returns [`Error::TransportClosed`] for a close frame and
    /// [`Error::Protocol`] or [`Error::Json`] for undecodable payloads
    pub fn from_frame(frame: tungstenite::Message) -> Result<Option<Self>> {
        match frame {
            tungstenite::Message::Text(text) => Self::parse(&text).map(Some),
            tungstenite::Message::Binary(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| Error::Protocol(e.to_string()))?;
                Self::parse(&text).map(Some)
            }
            tungstenite::Message::Close(_) => Err(Error::TransportClosed),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_wire_shape() {
        let msg = Message::execute(CommandEnvelope {
            command_id: "linux_1".into(),
            command: "uptime".into(),
            timeout_seconds: 12,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "execute");
        assert_eq!(value["command_id"], "linux_1");
        assert_eq!(value["command"], "uptime");
        assert_eq!(value["timeout"], 12);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_execute_without_timeout_uses_default() {
        let text = json!({"type": "execute", "command_id": "a", "command": "ls"}).to_string();
        match Message::parse(&text).unwrap() {
            Message::Execute { envelope, .. } => assert_eq!(envelope.timeout_seconds, DEFAULT_TIMEOUT_SECS),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_register_flattens_host_metadata() {
        let text = json!({
            "type": "register",
            "platform": "ios",
            "hostname": "phone",
            "system": "Darwin",
            "version": "17.0",
            "timestamp": "2025-01-01T00:00:00Z"
        })
        .to_string();
        match Message::parse(&text).unwrap() {
            Message::Register { platform, host, .. } => {
                assert_eq!(platform, ShellVariant::Mobile);
                assert_eq!(host.hostname, "phone");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_result_message() {
        let text = json!({
            "type": "result",
            "command_id": "macos_7",
            "result": {
                "success": true,
                "output": "hi\n",
                "error": "",
                "exit_code": 0,
                "platform": "macos",
                "timestamp": "2025-01-01T00:00:00Z"
            }
        })
        .to_string();
        let msg = Message::parse(&text).unwrap();
        assert_eq!(msg.kind(), "result");
        match msg {
            Message::CommandResult { command_id, result } => {
                assert_eq!(command_id, "macos_7");
                assert_eq!(result.variant, ShellVariant::MacOs);
                assert!(result.success);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_shutdown_and_unknown() {
        assert_eq!(Message::parse(r#"{"type":"shutdown"}"#).unwrap(), Message::Shutdown);
        assert!(Message::parse(r#"{"type":"reboot"}"#).is_err());
        assert!(Message::parse("not json").is_err());
    }

    #[test]
    fn test_frames() {
        let frame = Message::ping().to_frame().unwrap();
        assert!(matches!(Message::from_frame(frame).unwrap(), Some(Message::Ping { .. })));
        assert!(Message::from_frame(tungstenite::Message::Ping(vec![1])).unwrap().is_none());
        assert!(matches!(
            Message::from_frame(tungstenite::Message::Close(None)),
            Err(Error::TransportClosed)
        ));
    }
}
