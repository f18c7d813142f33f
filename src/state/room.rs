//! Chat room data model: messages, analytics, and termination state.

use crate::protocol::{ChatType, RoomId, UserId};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

pub const MAX_MESSAGES: usize = 1000;
const ANALYTICS_WINDOW: usize = 50;
const SILENT_GAP_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    User,
    System,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sequence: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    WebrtcConnected,
    WebrtcDisconnected,
    QualityIssue,
}

#[derive(Debug, Default, Clone)]
pub struct Analytics {
    response_time_samples_ms: VecDeque<i64>,
    pub silent_periods: u32,
    pub active_time_ms: i64,
    webrtc_connected_at: Option<DateTime<Utc>>,
    pub webrtc_duration_ms: i64,
    pub quality_issues: Vec<String>,
}

impl Analytics {
    fn record_gap(&mut self, gap: chrono::Duration) {
        let gap_ms = gap.num_milliseconds();
        if self.response_time_samples_ms.len() >= ANALYTICS_WINDOW {
            self.response_time_samples_ms.pop_front();
        }
        self.response_time_samples_ms.push_back(gap_ms);
        if gap.num_seconds() < SILENT_GAP_SECS {
            self.active_time_ms += gap_ms;
        } else {
            self.silent_periods += 1;
        }
    }

    pub fn messages_per_minute(&self, duration_ms: i64) -> f64 {
        if duration_ms <= 0 {
            return 0.0;
        }
        let sample_count = self.response_time_samples_ms.len() as f64;
        sample_count / (duration_ms as f64 / 60_000.0)
    }
}

#[derive(Debug, Clone)]
pub struct EndSummary {
    pub room_id: RoomId,
    pub reason: String,
    pub ended_by: Option<UserId>,
    pub duration_ms: i64,
    pub message_count: usize,
    pub engagement_score: f64,
}

#[derive(Debug, Clone)]
pub struct ChatRoom {
    pub room_id: RoomId,
    pub participants: [UserId; 2],
    pub chat_type: ChatType,
    pub state: RoomState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
    pub analytics: Analytics,
    pub end_reason: Option<String>,
    pub ended_by: Option<UserId>,
    next_sequence: u64,
}

impl ChatRoom {
    pub fn new(room_id: RoomId, a: UserId, b: UserId, chat_type: ChatType) -> Self {
        let now = Utc::now();
        Self {
            room_id,
            participants: [a, b],
            chat_type,
            state: RoomState::Active,
            created_at: now,
            last_activity_at: now,
            ended_at: None,
            messages: Vec::new(),
            analytics: Analytics::default(),
            end_reason: None,
            ended_by: None,
            next_sequence: 1,
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn peer_of(&self, user_id: UserId) -> Option<UserId> {
        self.participants.iter().copied().find(|&p| p != user_id)
    }

    pub fn append_message(&mut self, sender_id: UserId, text: String) -> Message {
        let now = Utc::now();
        let gap = now - self.last_activity_at;
        self.analytics.record_gap(gap);

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.last_activity_at = now;

        let message = Message {
            message_id: Uuid::new_v4(),
            room_id: self.room_id,
            sender_id,
            sequence,
            text,
            timestamp: now,
            kind: MessageKind::User,
        };
        self.messages.push(message.clone());
        message
    }

    pub fn record_activity(&mut self, kind: ActivityKind, detail: Option<String>) {
        self.last_activity_at = Utc::now();
        match kind {
            ActivityKind::WebrtcConnected => {
                self.analytics.webrtc_connected_at = Some(self.last_activity_at);
            }
            ActivityKind::WebrtcDisconnected => {
                if let Some(connected_at) = self.analytics.webrtc_connected_at.take() {
                    self.analytics.webrtc_duration_ms +=
                        (self.last_activity_at - connected_at).num_milliseconds();
                }
            }
            ActivityKind::QualityIssue => {
                if let Some(detail) = detail {
                    self.analytics.quality_issues.push(detail);
                }
            }
        }
    }

    /// Ends the room and computes the final summary. Idempotent: a
    /// second call returns the summary already recorded and performs
    /// no further mutation.
    pub fn end(&mut self, reason: &str, ended_by: Option<UserId>) -> EndSummary {
        if self.state == RoomState::Ended {
            return self.summary();
        }
        self.state = RoomState::Ended;
        self.ended_at = Some(Utc::now());
        self.end_reason = Some(reason.to_string());
        self.ended_by = ended_by;
        self.summary()
    }

    fn summary(&self) -> EndSummary {
        let duration_ms = self
            .ended_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.created_at)
            .num_milliseconds()
            .max(0);
        EndSummary {
            room_id: self.room_id,
            reason: self.end_reason.clone().unwrap_or_else(|| "active".to_string()),
            ended_by: self.ended_by,
            duration_ms,
            message_count: self.messages.len(),
            engagement_score: engagement_score(&self.analytics, duration_ms),
        }
    }
}

/// `min(50, messages_per_minute * 10) + 30 * active_time/duration -
/// min(20, 5 * silent_periods)`, clamped to `[0, 100]`.
fn engagement_score(analytics: &Analytics, duration_ms: i64) -> f64 {
    if duration_ms <= 0 {
        return 0.0;
    }
    let mpm_component = (analytics.messages_per_minute(duration_ms) * 10.0).min(50.0);
    let active_component = 30.0 * (analytics.active_time_ms as f64 / duration_ms as f64);
    let silence_penalty = (5.0 * analytics.silent_periods as f64).min(20.0);
    (mpm_component + active_component - silence_penalty).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_room() -> ChatRoom {
        ChatRoom::new(
            RoomId::new_v4(),
            UserId::new_v4(),
            UserId::new_v4(),
            ChatType::Text,
        )
    }

    #[test]
    fn message_sequence_is_monotonic_from_one() {
        let mut room = new_room();
        let sender = room.participants[0];
        let m1 = room.append_message(sender, "hi".into());
        let m2 = room.append_message(sender, "there".into());
        assert_eq!(m1.sequence, 1);
        assert_eq!(m2.sequence, 2);
    }

    #[test]
    fn peer_of_returns_the_other_participant() {
        let room = new_room();
        let [a, b] = room.participants;
        assert_eq!(room.peer_of(a), Some(b));
        assert_eq!(room.peer_of(b), Some(a));
    }

    #[test]
    fn end_is_idempotent() {
        let mut room = new_room();
        let summary1 = room.end("user_action", Some(room.participants[0]));
        let summary2 = room.end("stranger_disconnected", Some(room.participants[1]));
        assert_eq!(summary1.reason, summary2.reason);
        assert_eq!(summary1.duration_ms, summary2.duration_ms);
    }

    #[test]
    fn engagement_score_stays_within_bounds() {
        let mut room = new_room();
        let sender = room.participants[0];
        for _ in 0..20 {
            room.append_message(sender, "hi".into());
        }
        let summary = room.end("user_action", None);
        assert!(summary.engagement_score >= 0.0 && summary.engagement_score <= 100.0);
    }
}
