//! User session registry: the two-way transport↔user index plus
//! per-session timers, grounded on `UserManager`'s `DashMap`-based
//! directory and its "clone the sender out of the map, drop the
//! guard, then await" discipline.

use crate::error::RegistryError;
use crate::protocol::{RoomId, UserId};
use crate::state::profile;
use crate::state::session::{Session, TransportId, Violation};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 30 * 60;

/// Redacted view of a session for the `/debug` admin endpoint — no
/// profile text, location, or keywords, just enough to see the queue
/// and room state of each connection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    pub in_room: bool,
    pub trust_score: f64,
    pub violation_count: u32,
    pub banned: bool,
}

pub struct UserRegistry {
    by_transport: DashMap<TransportId, UserId>,
    by_user: DashMap<UserId, Arc<RwLock<Session>>>,
    idle_timeout: Duration,
}

impl UserRegistry {
    pub fn new(idle_timeout_secs: i64) -> Self {
        Self {
            by_transport: DashMap::new(),
            by_user: DashMap::new(),
            idle_timeout: Duration::seconds(idle_timeout_secs),
        }
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn create(
        &self,
        transport_id: TransportId,
        raw: &crate::protocol::RawProfile,
    ) -> Result<Arc<RwLock<Session>>, RegistryError> {
        if self.by_transport.contains_key(&transport_id) {
            return Err(RegistryError::AlreadyRegistered);
        }
        let (profile, preferences) = profile::normalize(raw);
        let user_id = UserId::new_v4();
        let session = Arc::new(RwLock::new(Session::new(
            user_id,
            transport_id,
            profile,
            preferences,
        )));
        self.by_transport.insert(transport_id, user_id);
        self.by_user.insert(user_id, session.clone());
        Ok(session)
    }

    pub fn get_by_transport(&self, transport_id: TransportId) -> Option<Arc<RwLock<Session>>> {
        let user_id = *self.by_transport.get(&transport_id)?;
        self.by_user.get(&user_id).map(|e| e.clone())
    }

    pub fn get_by_user(&self, user_id: UserId) -> Option<Arc<RwLock<Session>>> {
        self.by_user.get(&user_id).map(|e| e.clone())
    }

    pub fn touch(&self, transport_id: TransportId) -> Result<(), RegistryError> {
        let session = self
            .get_by_transport(transport_id)
            .ok_or(RegistryError::NotRegistered)?;
        session.write().touch();
        Ok(())
    }

    pub fn update_profile(
        &self,
        transport_id: TransportId,
        raw: &crate::protocol::RawProfile,
    ) -> Result<(), RegistryError> {
        let session = self
            .get_by_transport(transport_id)
            .ok_or(RegistryError::NotRegistered)?;
        let (profile, preferences) = profile::normalize(raw);
        let mut guard = session.write();
        guard.profile = profile;
        guard.preferences = preferences;
        guard.touch();
        Ok(())
    }

    pub fn bind_room(&self, user_id: UserId, room_id: RoomId) -> Result<(), RegistryError> {
        let session = self.get_by_user(user_id).ok_or(RegistryError::UserNotFound)?;
        session.write().current_room_id = Some(room_id);
        Ok(())
    }

    pub fn unbind_room(&self, user_id: UserId) -> Result<(), RegistryError> {
        let session = self.get_by_user(user_id).ok_or(RegistryError::UserNotFound)?;
        session.write().current_room_id = None;
        Ok(())
    }

    pub fn flag(&self, user_id: UserId, kind: Violation) -> Result<bool, RegistryError> {
        let session = self.get_by_user(user_id).ok_or(RegistryError::UserNotFound)?;
        let mut guard = session.write();
        guard.flag(kind);
        Ok(guard.banned)
    }

    /// Removes the session from both indices and returns it so the
    /// dispatcher can tear down any room it was in.
    pub fn remove(&self, transport_id: TransportId) -> Option<Session> {
        let (_, user_id) = self.by_transport.remove(&transport_id)?;
        let (_, session) = self.by_user.remove(&user_id)?;
        Some(Arc::try_unwrap(session).map(|l| l.into_inner()).unwrap_or_else(|arc| arc.read().clone()))
    }

    /// Redacted snapshot of every connected session, for the admin
    /// `/debug` endpoint.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.by_user
            .iter()
            .map(|entry| {
                let guard = entry.value().read();
                SessionSnapshot {
                    user_id: guard.user_id,
                    connected_at: guard.connected_at,
                    in_room: guard.current_room_id.is_some(),
                    trust_score: guard.trust_score,
                    violation_count: guard.violation_count,
                    banned: guard.banned,
                }
            })
            .collect()
    }

    /// Transport ids of sessions idle past the configured timeout.
    pub fn sweep_idle_transports(&self) -> Vec<TransportId> {
        self.by_transport
            .iter()
            .filter_map(|entry| {
                let transport_id = *entry.key();
                let session = self.by_user.get(entry.value())?;
                if session.read().is_idle(self.idle_timeout) {
                    Some(transport_id)
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RawProfile;

    fn registry() -> UserRegistry {
        UserRegistry::new(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    #[test]
    fn create_then_lookup_by_both_indices() {
        let registry = registry();
        let transport_id = TransportId::new_v4();
        let session = registry.create(transport_id, &RawProfile::default()).unwrap();
        let user_id = session.read().user_id;

        assert!(registry.get_by_transport(transport_id).is_some());
        assert!(registry.get_by_user(user_id).is_some());
    }

    #[test]
    fn create_twice_on_same_transport_fails() {
        let registry = registry();
        let transport_id = TransportId::new_v4();
        registry.create(transport_id, &RawProfile::default()).unwrap();
        let err = registry.create(transport_id, &RawProfile::default());
        assert_eq!(err.unwrap_err(), RegistryError::AlreadyRegistered);
    }

    #[test]
    fn remove_clears_both_indices() {
        let registry = registry();
        let transport_id = TransportId::new_v4();
        let session = registry.create(transport_id, &RawProfile::default()).unwrap();
        let user_id = session.read().user_id;

        let removed = registry.remove(transport_id).unwrap();
        assert_eq!(removed.user_id, user_id);
        assert!(registry.get_by_transport(transport_id).is_none());
        assert!(registry.get_by_user(user_id).is_none());
    }

    #[test]
    fn flag_five_times_bans() {
        let registry = registry();
        let transport_id = TransportId::new_v4();
        let session = registry.create(transport_id, &RawProfile::default()).unwrap();
        let user_id = session.read().user_id;

        let mut banned = false;
        for _ in 0..5 {
            banned = registry.flag(user_id, Violation::Spam).unwrap();
        }
        assert!(banned);
    }

    #[test]
    fn bind_and_unbind_room() {
        let registry = registry();
        let transport_id = TransportId::new_v4();
        let session = registry.create(transport_id, &RawProfile::default()).unwrap();
        let user_id = session.read().user_id;
        let room_id = RoomId::new_v4();

        registry.bind_room(user_id, room_id).unwrap();
        assert_eq!(session.read().current_room_id, Some(room_id));
        registry.unbind_room(user_id).unwrap();
        assert_eq!(session.read().current_room_id, None);
    }
}
