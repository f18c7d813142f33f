//! Chat room lifecycle manager, grounded on `Matrix::disconnect_user_session`'s
//! decomposition into small private helpers that each release a lock
//! before the next await, and on the channel manager's DashMap-indexed
//! directory shape.

use crate::error::RoomError;
use crate::protocol::{ChatType, RoomId, UserId};
use crate::state::room::{ActivityKind, ChatRoom, EndSummary, Message};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

pub const DEFAULT_INACTIVE_TIMEOUT_SECS: i64 = 30 * 60;

pub struct RoomManager {
    by_room: DashMap<RoomId, Arc<RwLock<ChatRoom>>>,
    by_user: DashMap<UserId, RoomId>,
    absolute_timeout: Duration,
}

impl RoomManager {
    pub fn new(absolute_timeout_ms: i64) -> Self {
        Self {
            by_room: DashMap::new(),
            by_user: DashMap::new(),
            absolute_timeout: Duration::milliseconds(absolute_timeout_ms),
        }
    }

    pub fn active_count(&self) -> usize {
        self.by_room.len()
    }

    pub fn create(&self, a: UserId, b: UserId, chat_type: ChatType) -> Result<Arc<RwLock<ChatRoom>>, RoomError> {
        if self.by_user.contains_key(&a) || self.by_user.contains_key(&b) {
            return Err(RoomError::AlreadyInRoom);
        }
        let room_id = RoomId::new_v4();
        let room = Arc::new(RwLock::new(ChatRoom::new(room_id, a, b, chat_type)));
        self.by_room.insert(room_id, room.clone());
        self.by_user.insert(a, room_id);
        self.by_user.insert(b, room_id);
        Ok(room)
    }

    pub fn get_by_room(&self, room_id: RoomId) -> Option<Arc<RwLock<ChatRoom>>> {
        self.by_room.get(&room_id).map(|e| e.clone())
    }

    pub fn get_by_user(&self, user_id: UserId) -> Option<Arc<RwLock<ChatRoom>>> {
        let room_id = *self.by_user.get(&user_id)?;
        self.get_by_room(room_id)
    }

    pub fn append_message(
        &self,
        user_id: UserId,
        text: String,
    ) -> Result<(Arc<RwLock<ChatRoom>>, Message), RoomError> {
        let room = self.get_by_user(user_id).ok_or(RoomError::NotFound)?;
        let message = {
            let mut guard = room.write();
            if guard.state != crate::state::room::RoomState::Active {
                return Err(RoomError::Closed);
            }
            if !guard.is_participant(user_id) {
                return Err(RoomError::NotParticipant);
            }
            if guard.messages.len() >= crate::state::room::MAX_MESSAGES {
                return Err(RoomError::MessageLimitReached);
            }
            guard.append_message(user_id, text)
        };
        Ok((room, message))
    }

    pub fn record_activity(
        &self,
        room_id: RoomId,
        kind: ActivityKind,
        detail: Option<String>,
    ) -> Result<(), RoomError> {
        let room = self.get_by_room(room_id).ok_or(RoomError::NotFound)?;
        room.write().record_activity(kind, detail);
        Ok(())
    }

    /// Ends a room by user id, releasing both participants from the
    /// user→room index. Idempotent: a second call on an already-ended
    /// room returns the original summary without mutating the index
    /// twice (the second lookup will simply miss).
    pub fn end_by_user(
        &self,
        user_id: UserId,
        reason: &str,
        ended_by: Option<UserId>,
    ) -> Result<EndSummary, RoomError> {
        let room = self.get_by_user(user_id).ok_or(RoomError::NotFound)?;
        Ok(self.end_room(room, reason, ended_by))
    }

    pub fn end_by_room(
        &self,
        room_id: RoomId,
        reason: &str,
        ended_by: Option<UserId>,
    ) -> Result<EndSummary, RoomError> {
        let room = self.get_by_room(room_id).ok_or(RoomError::NotFound)?;
        Ok(self.end_room(room, reason, ended_by))
    }

    fn end_room(&self, room: Arc<RwLock<ChatRoom>>, reason: &str, ended_by: Option<UserId>) -> EndSummary {
        let (summary, participants) = {
            let mut guard = room.write();
            let summary = guard.end(reason, ended_by);
            (summary, guard.participants)
        };
        self.by_room.remove(&summary.room_id);
        for participant in participants {
            self.by_user.remove(&participant);
        }
        summary
    }

    /// Rooms whose last activity predates `threshold`, for the
    /// periodic inactivity sweep.
    pub fn sweep_inactive(&self, threshold: Duration) -> Vec<RoomId> {
        let now = Utc::now();
        self.by_room
            .iter()
            .filter(|entry| now - entry.value().read().last_activity_at > threshold)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Rooms past the absolute lifetime cap.
    pub fn sweep_absolute_timeout(&self) -> Vec<RoomId> {
        let now = Utc::now();
        self.by_room
            .iter()
            .filter(|entry| now - entry.value().read().created_at > self.absolute_timeout)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RoomManager {
        RoomManager::new(3_600_000)
    }

    #[test]
    fn create_then_lookup_both_participants() {
        let manager = manager();
        let (a, b) = (UserId::new_v4(), UserId::new_v4());
        manager.create(a, b, ChatType::Text).unwrap();
        assert!(manager.get_by_user(a).is_some());
        assert!(manager.get_by_user(b).is_some());
    }

    #[test]
    fn cannot_create_second_room_for_same_user() {
        let manager = manager();
        let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
        manager.create(a, b, ChatType::Text).unwrap();
        let err = manager.create(a, c, ChatType::Text);
        assert_eq!(err.unwrap_err(), RoomError::AlreadyInRoom);
    }

    #[test]
    fn append_message_rejects_non_participant() {
        let manager = manager();
        let (a, b, stranger) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
        manager.create(a, b, ChatType::Text).unwrap();
        let err = manager.append_message(stranger, "hi".into());
        assert_eq!(err.unwrap_err(), RoomError::NotFound);
    }

    #[test]
    fn end_clears_user_index() {
        let manager = manager();
        let (a, b) = (UserId::new_v4(), UserId::new_v4());
        manager.create(a, b, ChatType::Text).unwrap();
        manager.end_by_user(a, "user_action", Some(a)).unwrap();
        assert!(manager.get_by_user(a).is_none());
        assert!(manager.get_by_user(b).is_none());
    }

    #[test]
    fn message_cap_terminates_append() {
        let manager = manager();
        let (a, b) = (UserId::new_v4(), UserId::new_v4());
        let room = manager.create(a, b, ChatType::Text).unwrap();
        {
            let mut guard = room.write();
            for _ in 0..crate::state::room::MAX_MESSAGES {
                guard.append_message(a, "x".into());
            }
        }
        let err = manager.append_message(a, "overflow".into());
        assert_eq!(err.unwrap_err(), RoomError::MessageLimitReached);
    }
}
