//! Wire messages accepted by the robot API.
//!
//! Only the `text` message type is implemented. The serializer is chosen
//! once at construction from [`MessageType`] and applied to every event.

mod text;

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, SerializationError};
use crate::event::Event;

pub use text::{At, MentionTargets, TEXT_MSG_TYPE, Text, TextMessage, serialise_text};

/// Message envelope selected by `send_msg_type`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageType {
    #[default]
    Text,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => TEXT_MSG_TYPE,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            TEXT_MSG_TYPE => Ok(Self::Text),
            other => Err(ConfigError::UnsupportedMessageType(other.to_owned())),
        }
    }
}

/// Serializer bound to a message type and static mention targets.
#[derive(Clone, Debug)]
pub struct MessageSerializer {
    kind: MessageType,
    mentions: MentionTargets,
}

impl MessageSerializer {
    pub fn new(kind: MessageType, mentions: MentionTargets) -> Self {
        Self { kind, mentions }
    }

    /// Encode `event` as the configured wire message.
    pub fn serialise(&self, event: &Event) -> Result<Vec<u8>, SerializationError> {
        match self.kind {
            MessageType::Text => serialise_text(event, &self.mentions),
        }
    }
}
