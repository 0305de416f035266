use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Lock manager availability as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockServiceState {
    Up,
    Down,
}

/// Every message exchanged with the control-plane bus.
///
/// Wire form is one JSON object per line, tagged by `command`:
/// `{"command":"PING","site":"http://example.com/"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    Register {
        service: String,
        version: String,
    },
    Unregister {
        service: String,
    },
    Ready,
    StorageStatus,
    StorageReady,
    StorageLost,
    LockServiceStatus {
        status: LockServiceState,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site: Option<String>,
    },
    Stop,
    Quitting,
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Help,
    Commands {
        list: Vec<String>,
    },
    /// Reply to a command we do not handle; `name` on the wire since
    /// `command` is the tag.
    Unknown {
        #[serde(rename = "name")]
        command: String,
    },
    Status {
        service: String,
        status: String,
    },
}

/// Result of decoding one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(ControlMessage),
    /// Well-formed frame naming a command we do not know.
    Unrecognized(String),
}

const ALL_COMMANDS: &[&str] = &[
    "REGISTER",
    "UNREGISTER",
    "READY",
    "STORAGE_STATUS",
    "STORAGE_READY",
    "STORAGE_LOST",
    "LOCK_SERVICE_STATUS",
    "PING",
    "STOP",
    "QUITTING",
    "LOG",
    "HELP",
    "COMMANDS",
    "UNKNOWN",
    "STATUS",
];

impl ControlMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::Register { .. } => "REGISTER",
            ControlMessage::Unregister { .. } => "UNREGISTER",
            ControlMessage::Ready => "READY",
            ControlMessage::StorageStatus => "STORAGE_STATUS",
            ControlMessage::StorageReady => "STORAGE_READY",
            ControlMessage::StorageLost => "STORAGE_LOST",
            ControlMessage::LockServiceStatus { .. } => "LOCK_SERVICE_STATUS",
            ControlMessage::Ping { .. } => "PING",
            ControlMessage::Stop => "STOP",
            ControlMessage::Quitting => "QUITTING",
            ControlMessage::Log { .. } => "LOG",
            ControlMessage::Help => "HELP",
            ControlMessage::Commands { .. } => "COMMANDS",
            ControlMessage::Unknown { .. } => "UNKNOWN",
            ControlMessage::Status { .. } => "STATUS",
        }
    }

    /// Commands this daemon acts on when received; sent in reply to HELP.
    pub fn accepted() -> Vec<String> {
        [
            "COMMANDS",
            "HELP",
            "LOCK_SERVICE_STATUS",
            "LOG",
            "PING",
            "QUITTING",
            "READY",
            "STOP",
            "STORAGE_LOST",
            "STORAGE_READY",
            "UNKNOWN",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }

    pub fn parse(line: &str) -> Result<Inbound> {
        let value: Value = serde_json::from_str(line)?;
        let command = value
            .get("command")
            .and_then(Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<ControlMessage>(value) {
            Ok(message) => Ok(Inbound::Message(message)),
            Err(e) => match command {
                Some(command) if !ALL_COMMANDS.contains(&command.as_str()) => {
                    Ok(Inbound::Unrecognized(command))
                }
                _ => Err(e.into()),
            },
        }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
