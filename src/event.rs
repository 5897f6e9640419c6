//! Live channel messages.
//!
//! The server tags every frame with a `type` string. We decode into a closed
//! [`LiveEvent`] enum; a frame without a `type`, or with one we do not know,
//! is a chat message.

use serde::{Deserialize, Serialize};

use crate::model::Poll;

/// A message pushed by the server over the live channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Chat { sender: String, text: String },
    System { text: String },
    ParticipantRemoved { id: String, notice: String },
    PollCreated(Poll),
    PollVoted(Poll),
}

/// Loose wire shape; every field is optional so we can classify first.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    removed_id: Option<String>,
    #[serde(default)]
    poll: Option<Poll>,
}

impl LiveEvent {
    /// Decode one text frame.
    ///
    /// Fails only when the frame is not a JSON object, or a poll event does
    /// not carry a well-formed poll.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_str(text)?;
        Ok(match raw.kind.as_deref() {
            Some("system") => LiveEvent::System {
                text: raw.message.unwrap_or_default(),
            },
            Some("participant_removed") => LiveEvent::ParticipantRemoved {
                id: raw.removed_id.unwrap_or_default(),
                notice: raw.message.unwrap_or_default(),
            },
            Some("poll_created") => LiveEvent::PollCreated(require_poll(raw.poll)?),
            Some("poll_voted") => LiveEvent::PollVoted(require_poll(raw.poll)?),
            _ => LiveEvent::Chat {
                sender: raw.sender.unwrap_or_default(),
                text: raw.message.unwrap_or_default(),
            },
        })
    }

    /// Wire tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Chat { .. } => "chat",
            LiveEvent::System { .. } => "system",
            LiveEvent::ParticipantRemoved { .. } => "participant_removed",
            LiveEvent::PollCreated(_) => "poll_created",
            LiveEvent::PollVoted(_) => "poll_voted",
        }
    }
}

fn require_poll(poll: Option<Poll>) -> Result<Poll, serde_json::Error> {
    use serde::de::Error;
    poll.ok_or_else(|| serde_json::Error::missing_field("poll"))
}

/// A chat line sent by this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message: String,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message: text.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
