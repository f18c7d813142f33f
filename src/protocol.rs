//! Wire schema for the client-facing event channel. Each websocket
//! text frame carries one `{"event": ..., ...}` value in either
//! direction; serde's externally tagged representation gives us that
//! shape for free.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type RoomId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    NotSpecified,
}

impl Default for Gender {
    fn default() -> Self {
        Gender::NotSpecified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBucket {
    #[serde(rename = "18-25")]
    R18To25,
    #[serde(rename = "26-35")]
    R26To35,
    #[serde(rename = "36-45")]
    R36To45,
    #[serde(rename = "46+")]
    R46Plus,
    NotSpecified,
}

impl Default for AgeBucket {
    fn default() -> Self {
        AgeBucket::NotSpecified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Text,
    Video,
}

impl Default for ChatType {
    fn default() -> Self {
        ChatType::Text
    }
}

/// A preference attribute that may also be left unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPreference {
    Male,
    Female,
    Other,
    Any,
}

impl Default for GenderPreference {
    fn default() -> Self {
        GenderPreference::Any
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgePreference {
    #[serde(rename = "18-25")]
    R18To25,
    #[serde(rename = "26-35")]
    R26To35,
    #[serde(rename = "36-45")]
    R36To45,
    #[serde(rename = "46+")]
    R46Plus,
    Any,
}

impl Default for AgePreference {
    fn default() -> Self {
        AgePreference::Any
    }
}

/// Redacted peer attributes sent alongside `match_found`, the subset
/// of `Profile` a client is allowed to see about its stranger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    pub gender: Gender,
    pub age: AgeBucket,
    pub location: String,
    pub keywords: Vec<String>,
}

/// Raw, untrusted attributes as received from a client. Every field is
/// optional and free-form; `crate::state::profile` is responsible for
/// turning this into a canonical `Profile`/`Preferences` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProfile {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub pref_gender: Option<String>,
    #[serde(default)]
    pub pref_age: Option<String>,
    #[serde(default)]
    pub chat_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    Register { profile: RawProfile },
    FindMatch { profile: RawProfile },
    ChatMessage { text: String },
    WebrtcOffer { sdp: serde_json::Value },
    WebrtcAnswer { sdp: serde_json::Value },
    IceCandidate { candidate: serde_json::Value },
    TypingStart,
    TypingStop,
    EndChat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    Registered {
        user_id: UserId,
        online_count: u64,
    },
    Queued {
        position: u64,
        online_count: u64,
    },
    MatchFound {
        room_id: RoomId,
        chat_type: ChatType,
        peer: PeerProfile,
    },
    ChatMessage {
        message_id: Uuid,
        sequence: u64,
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    MessageSent {
        message_id: Uuid,
        sequence: u64,
    },
    PeerTyping {
        typing: bool,
    },
    WebrtcOffer {
        sdp: serde_json::Value,
        sender_id: UserId,
    },
    WebrtcAnswer {
        sdp: serde_json::Value,
        sender_id: UserId,
    },
    IceCandidate {
        candidate: serde_json::Value,
        sender_id: UserId,
    },
    Ended {
        reason: String,
    },
    Stats {
        online_users: u64,
        active_rooms: u64,
    },
    Error {
        code: String,
        message: String,
    },
}
