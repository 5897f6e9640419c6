//! Room, participant and poll snapshots as the backend serves them, plus the
//! request bodies the client sends.
//!
//! Everything here is plain data. Fields the backend may omit default to
//! empty values so that older or newer servers still decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A gift-exchange room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exchange_date: Option<String>,
    #[serde(default)]
    pub is_started: bool,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub polls: Vec<Poll>,
}

impl Room {
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    /// Display name, falling back to the generic title for unnamed rooms.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Secret Santa Room"
        } else {
            &self.name
        }
    }
}

/// A member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub secret_message: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub giftee_id: Option<String>,
}

/// An in-room micro-vote.
///
/// `votes` maps voter id to the chosen option, so a voter can hold at most
/// one vote; voting again replaces the earlier choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub votes: BTreeMap<String, String>,
}

/// Per-option vote counts for one poll, as a poll card shows them.
#[derive(Debug, Clone, PartialEq)]
pub struct PollTally {
    /// `(option, votes)` in the poll's option order.
    pub counts: Vec<(String, usize)>,
    pub total: usize,
    /// The option the viewing participant picked, if any.
    pub my_vote: Option<String>,
}

impl PollTally {
    /// Share of all votes that went to `option`, in percent.
    pub fn percentage(&self, option: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let votes = self
            .counts
            .iter()
            .find(|(o, _)| o == option)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        votes as f64 / self.total as f64 * 100.0
    }
}

impl Poll {
    /// Count votes per option from the point of view of `viewer_id`.
    ///
    /// Votes for an option that is not listed still count toward the total.
    pub fn tally(&self, viewer_id: Option<&str>) -> PollTally {
        let counts = self
            .options
            .iter()
            .map(|opt| {
                let n = self.votes.values().filter(|v| *v == opt).count();
                (opt.clone(), n)
            })
            .collect();
        PollTally {
            counts,
            total: self.votes.len(),
            my_vote: viewer_id.and_then(|id| self.votes.get(id).cloned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /rooms`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub exchange_date: Option<String>,
    pub host_name: String,
    pub host_preferences: String,
    pub host_secret_message: String,
}

/// Body of `POST /rooms/join`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    pub room_code: String,
    pub name: String,
    pub preferences: String,
    pub secret_message: String,
}

/// Body of `POST /rooms/{code}/polls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    pub creator_name: String,
}

/// Body of `POST /rooms/{code}/polls/{id}/vote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub option: String,
    pub voter_id: String,
}

/// Reply to `POST /rooms/{code}/start`: the participants with giftees set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameResponse {
    #[serde(default)]
    pub message: String,
    pub participants: Vec<Participant>,
}

/// Plain acknowledgement returned by delete / remove / vote.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: String,
}

/// Reply to `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

// ---------------------------------------------------------------------------
// Room codes and share links
// ---------------------------------------------------------------------------

/// Trim and upper-case a user-typed room code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Link that opens the join view with the code pre-filled.
pub fn share_link(web_base: &str, code: &str) -> String {
    format!("{}/?room={}", web_base.trim_end_matches('/'), code)
}

/// Extract a room code from a share link, or accept a bare code.
///
/// Returns `None` when the input is empty or the link has no `room` parameter.
pub fn code_from_link(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.contains("://") && !input.contains('?') {
        return Some(normalize_code(input));
    }
    let url = reqwest::Url::parse(input).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "room")
        .map(|(_, v)| normalize_code(&v))
        .filter(|c| !c.is_empty())
}
