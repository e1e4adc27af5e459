//! `text` message envelope.

use serde::Serialize;

use crate::error::SerializationError;
use crate::event::{Event, FieldValue, MESSAGE_FIELD};

/// `msgtype` value of a text message.
pub const TEXT_MSG_TYPE: &str = "text";

/// Static mention configuration applied to every outgoing message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MentionTargets {
    pub mobiles: Vec<String>,
    pub user_ids: Vec<String>,
    pub all: bool,
}

impl MentionTargets {
    /// Whether any mobile or user id is configured.
    ///
    /// `all` alone does not count: without explicit targets the mention block
    /// is sent zeroed.
    pub fn is_configured(&self) -> bool {
        !self.mobiles.is_empty() || !self.user_ids.is_empty()
    }
}

/// Wire form of the `at` block. Unset lists serialise as `null`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct At<'a> {
    pub at_mobiles: Option<&'a [String]>,
    pub at_user_ids: Option<&'a [String]>,
    pub is_at_all: bool,
}

impl<'a> From<&'a MentionTargets> for At<'a> {
    fn from(targets: &'a MentionTargets) -> Self {
        if !targets.is_configured() {
            return Self::default();
        }
        let non_empty = |list: &'a Vec<String>| (!list.is_empty()).then_some(list.as_slice());
        Self {
            at_mobiles: non_empty(&targets.mobiles),
            at_user_ids: non_empty(&targets.user_ids),
            is_at_all: targets.all,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Text<'a> {
    pub content: &'a FieldValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TextMessage<'a> {
    pub msgtype: &'static str,
    pub at: At<'a>,
    pub text: Text<'a>,
}

/// Encode the event's [`MESSAGE_FIELD`] as a text message.
///
/// The field value is embedded verbatim as `text.content`, whatever its JSON
/// type.
///
/// # Errors
///
/// Returns [`SerializationError::MissingField`] when the event carries no
/// message field.
pub fn serialise_text(
    event: &Event,
    mentions: &MentionTargets,
) -> Result<Vec<u8>, SerializationError> {
    let content = event
        .get_value(MESSAGE_FIELD)
        .ok_or_else(|| SerializationError::MissingField(MESSAGE_FIELD.to_owned()))?;
    let message = TextMessage {
        msgtype: TEXT_MSG_TYPE,
        at: At::from(mentions),
        text: Text { content },
    };
    Ok(serde_json::to_vec(&message)?)
}
