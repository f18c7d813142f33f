//! The registry's per-connection record.

use crate::protocol::{RoomId, UserId};
use crate::state::profile::{Preferences, Profile};
use chrono::{DateTime, Utc};

pub type TransportId = uuid::Uuid;

/// Kind of violation recorded against a session, used to drive
/// `trust_score` decay and auto-ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Spam,
    Harassment,
    Inappropriate,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub transport_id: TransportId,
    pub profile: Profile,
    pub preferences: Preferences,
    pub connected_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub current_room_id: Option<RoomId>,
    pub trust_score: f64,
    pub violation_count: u32,
    pub banned: bool,
    pub reported: bool,
}

impl Session {
    pub fn new(user_id: UserId, transport_id: TransportId, profile: Profile, preferences: Preferences) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            transport_id,
            profile,
            preferences,
            connected_at: now,
            last_active_at: now,
            current_room_id: None,
            trust_score: 1.0,
            violation_count: 0,
            banned: false,
            reported: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    pub fn is_idle(&self, timeout: chrono::Duration) -> bool {
        Utc::now() - self.last_active_at > timeout
    }

    /// Applies a violation, decaying `trust_score` and auto-banning
    /// past the configured thresholds. `trust_score` never increases.
    pub fn flag(&mut self, _kind: Violation) {
        self.violation_count += 1;
        self.trust_score = (self.trust_score - 0.1).max(0.0);
        if self.violation_count >= 5 || self.trust_score <= 0.3 {
            self.banned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::profile::{Preferences, Profile};

    fn make_session() -> Session {
        Session::new(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
            Profile::default(),
            Preferences::default(),
        )
    }

    #[test]
    fn flag_decreases_trust_monotonically() {
        let mut session = make_session();
        let mut last = session.trust_score;
        for _ in 0..3 {
            session.flag(Violation::Spam);
            assert!(session.trust_score <= last);
            last = session.trust_score;
        }
    }

    #[test]
    fn auto_bans_after_five_violations() {
        let mut session = make_session();
        for _ in 0..5 {
            session.flag(Violation::Spam);
        }
        assert!(session.banned);
    }

    #[test]
    fn auto_bans_when_trust_floor_reached() {
        let mut session = make_session();
        session.trust_score = 0.35;
        session.flag(Violation::Harassment);
        assert!(session.banned);
    }
}
