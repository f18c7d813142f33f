//! Translates inbound transport events into core operations and fans
//! outbound events back to one or both peers of a room. This is the
//! single place that knows the full inbound/outbound event table.

use crate::content_filter;
use crate::error::{DispatchError, RegistryError};
use crate::protocol::{ChatType, InboundEvent, OutboundEvent, RawProfile, RoomId, UserId};
use crate::state::{ActivityKind, Core, TransportId, Violation};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_MESSAGE_LEN_HARD_CAP: usize = 10_000;

pub struct Dispatcher {
    core: Arc<Core>,
}

impl Dispatcher {
    pub fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Syncs the three live-count gauges exposed on `/metrics` with
    /// `Core`'s current state. Cheap enough to call on every path that
    /// changes one of the three counts.
    fn refresh_gauges(&self) {
        crate::metrics::ONLINE_USERS.set(self.core.online_count() as i64);
        crate::metrics::ACTIVE_ROOMS.set(self.core.active_room_count() as i64);
        crate::metrics::QUEUE_DEPTH.set(self.core.queue_depth() as i64);
    }

    /// Entry point called by the connection event loop for every
    /// inbound frame. Returns the reply event for the sender, if any;
    /// peer-directed events are sent internally via `Core`'s sender
    /// registry.
    pub fn handle(&self, transport_id: TransportId, event: InboundEvent) -> Option<OutboundEvent> {
        self.core.registry.touch(transport_id).ok();
        let result = match event {
            InboundEvent::Register { profile } => self.handle_register(transport_id, profile),
            InboundEvent::FindMatch { profile } => self.handle_find_match(transport_id, profile),
            InboundEvent::ChatMessage { text } => self.handle_chat_message(transport_id, text),
            InboundEvent::WebrtcOffer { sdp } => self.forward_signal(
                transport_id,
                "webrtc_offer",
                |peer_sdp, sender_id| OutboundEvent::WebrtcOffer { sdp: peer_sdp, sender_id },
                sdp,
                None,
            ),
            InboundEvent::WebrtcAnswer { sdp } => self.forward_signal(
                transport_id,
                "webrtc_answer",
                |peer_sdp, sender_id| OutboundEvent::WebrtcAnswer { sdp: peer_sdp, sender_id },
                sdp,
                Some(ActivityKind::WebrtcConnected),
            ),
            InboundEvent::IceCandidate { candidate } => self.forward_signal(
                transport_id,
                "ice_candidate",
                |c, sender_id| OutboundEvent::IceCandidate { candidate: c, sender_id },
                candidate,
                None,
            ),
            InboundEvent::TypingStart => self.handle_typing(transport_id, true),
            InboundEvent::TypingStop => self.handle_typing(transport_id, false),
            InboundEvent::EndChat => self.handle_end_chat(transport_id),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                crate::metrics::DISPATCH_ERRORS_TOTAL
                    .with_label_values(&[e.code()])
                    .inc();
                Some(e.to_event())
            }
        }
    }

    /// Called by the connection task when the transport closes, or
    /// when an outbound write fails (`TransportError` is handled the
    /// same way).
    pub fn handle_disconnect(&self, transport_id: TransportId) {
        let Some(session) = self.core.registry.remove(transport_id) else {
            return;
        };
        self.core.matching.cancel(session.user_id);
        self.core.remove_sender(session.user_id);

        if let Some(room_id) = session.current_room_id {
            self.end_room_and_notify_peer(room_id, "stranger_disconnected", Some(session.user_id));
        }

        self.refresh_gauges();
        self.core.broadcast(OutboundEvent::Stats {
            online_users: self.core.online_count(),
            active_rooms: self.core.active_room_count(),
        });
        info!(user_id = %session.user_id, "session disconnected");
    }

    fn handle_register(
        &self,
        transport_id: TransportId,
        profile: RawProfile,
    ) -> Result<Option<OutboundEvent>, DispatchError> {
        let session = self
            .core
            .registry
            .create(transport_id, &profile)
            .map_err(DispatchError::from)?;
        let user_id = session.read().user_id;
        self.core.record_connection();
        self.refresh_gauges();
        self.core.broadcast(OutboundEvent::Stats {
            online_users: self.core.online_count(),
            active_rooms: self.core.active_room_count(),
        });
        Ok(Some(OutboundEvent::Registered {
            user_id,
            online_count: self.core.online_count(),
        }))
    }

    fn handle_find_match(
        &self,
        transport_id: TransportId,
        profile: RawProfile,
    ) -> Result<Option<OutboundEvent>, DispatchError> {
        let session = self
            .core
            .registry
            .get_by_transport(transport_id)
            .ok_or(DispatchError::Precondition("not registered".into()))?;

        let (user_id, preferences, trust_score, violation_count, session_age_secs, profile_snapshot) = {
            let mut guard = session.write();
            if guard.banned {
                return Err(DispatchError::from(RegistryError::Banned));
            }
            if guard.current_room_id.is_some() {
                return Err(DispatchError::Precondition("already in a chat".into()));
            }
            let (normalized_profile, normalized_prefs) = crate::state::profile::normalize(&profile);
            guard.profile = normalized_profile.clone();
            guard.preferences = normalized_prefs.clone();
            let age = (chrono::Utc::now() - guard.connected_at).num_seconds();
            (
                guard.user_id,
                normalized_prefs,
                guard.trust_score,
                guard.violation_count,
                age,
                normalized_profile,
            )
        };

        self.core
            .matching
            .enqueue(user_id, preferences.clone(), trust_score, violation_count, session_age_secs)
            .map_err(DispatchError::from)?;
        self.refresh_gauges();

        let requester_compat = crate::state::CompatInput {
            profile: profile_snapshot,
            preferences,
            trust_score,
        };

        let candidate = self.core.matching.try_match_now(user_id, &requester_compat, |other_id| {
            let other_session = self.core.registry.get_by_user(other_id)?;
            let guard = other_session.read();
            Some(crate::state::CompatInput {
                profile: guard.profile.clone(),
                preferences: guard.preferences.clone(),
                trust_score: guard.trust_score,
            })
        });

        if let Some(peer_id) = candidate {
            let avg_wait_ms = self.core.matching.remove_pair(user_id, peer_id);
            self.core.record_match_wait(avg_wait_ms);
            return Ok(Some(self.create_room_and_notify(user_id, peer_id, requester_compat.preferences.chat_type)));
        }

        Ok(Some(OutboundEvent::Queued {
            position: self.core.matching.position(user_id).max(0) as u64,
            online_count: self.core.online_count(),
        }))
    }

    fn create_room_and_notify(&self, a: UserId, b: UserId, chat_type: ChatType) -> OutboundEvent {
        let Some(room_id) = self.create_room(a, b, chat_type) else {
            return DispatchError::Internal("failed to create room after a successful match".into())
                .to_event();
        };
        let (peer_for_a, peer_for_b) = self.peer_profiles_for(a, b);
        if let Some(peer_for_a) = peer_for_a {
            self.core.try_send_to_user(
                b,
                OutboundEvent::MatchFound { room_id, chat_type, peer: peer_for_a },
            );
        }
        match peer_for_b {
            Some(peer_for_b) => OutboundEvent::MatchFound { room_id, chat_type, peer: peer_for_b },
            None => DispatchError::Internal("peer profile missing after match".into()).to_event(),
        }
    }

    /// Looks up each side's profile and returns them cross-wise: the
    /// first element is `a`'s profile (shown to `b`), the second is
    /// `b`'s profile (shown to `a`).
    fn peer_profiles_for(
        &self,
        a: UserId,
        b: UserId,
    ) -> (Option<crate::protocol::PeerProfile>, Option<crate::protocol::PeerProfile>) {
        let profile_a = self
            .core
            .registry
            .get_by_user(a)
            .map(|s| crate::protocol::PeerProfile::from(&s.read().profile));
        let profile_b = self
            .core
            .registry
            .get_by_user(b)
            .map(|s| crate::protocol::PeerProfile::from(&s.read().profile));
        (profile_a, profile_b)
    }

    fn create_room(&self, a: UserId, b: UserId, chat_type: ChatType) -> Option<RoomId> {
        let room = match self.core.rooms.create(a, b, chat_type) {
            Ok(room) => room,
            Err(e) => {
                warn!(error = %e, "failed to create room after a successful match");
                return None;
            }
        };
        let room_id = room.read().room_id;
        let _ = self.core.registry.bind_room(a, room_id);
        let _ = self.core.registry.bind_room(b, room_id);
        crate::metrics::MATCHES_TOTAL.inc();
        self.refresh_gauges();
        Some(room_id)
    }

    /// Invoked by the 2-second background match-loop ticker. Neither
    /// side initiated this pairing synchronously, so both peers get
    /// an explicit `match_found` notification.
    pub fn run_match_tick(&self) {
        let pairs = self.core.matching.match_tick(10, |user_id| {
            let session = self.core.registry.get_by_user(user_id)?;
            let guard = session.read();
            Some(crate::state::CompatInput {
                profile: guard.profile.clone(),
                preferences: guard.preferences.clone(),
                trust_score: guard.trust_score,
            })
        });

        for pair in pairs {
            let Some(room_id) = self.create_room(pair.a, pair.b, pair.chat_type) else {
                continue;
            };
            self.core.record_match_wait(pair.avg_wait_ms);
            let (peer_for_a, peer_for_b) = self.peer_profiles_for(pair.a, pair.b);
            if let Some(peer_for_b) = peer_for_b {
                self.core.try_send_to_user(
                    pair.a,
                    OutboundEvent::MatchFound { room_id, chat_type: pair.chat_type, peer: peer_for_b },
                );
            }
            if let Some(peer_for_a) = peer_for_a {
                self.core.try_send_to_user(
                    pair.b,
                    OutboundEvent::MatchFound { room_id, chat_type: pair.chat_type, peer: peer_for_a },
                );
            }
        }
    }

    fn handle_chat_message(
        &self,
        transport_id: TransportId,
        text: String,
    ) -> Result<Option<OutboundEvent>, DispatchError> {
        let session = self
            .core
            .registry
            .get_by_transport(transport_id)
            .ok_or(DispatchError::Precondition("not registered".into()))?;
        let user_id = session.read().user_id;

        if let Err(e) = validate_message(&text) {
            let banned = self.core.registry.flag(user_id, Violation::Spam).unwrap_or(false);
            if banned {
                self.end_current_room_if_any(user_id, "reported_spam");
            }
            return Err(e);
        }

        let (filtered, hit) = content_filter::filter_and_truncate(
            &text,
            &self.core.config.content_filter,
            self.core.config.chat.max_message_length,
        );
        if hit {
            crate::metrics::CONTENT_FILTER_HITS_TOTAL.inc();
        }

        let (room, message) = match self.core.rooms.append_message(user_id, filtered) {
            Ok(ok) => ok,
            Err(crate::error::RoomError::MessageLimitReached) => {
                if let Some(room) = self.core.rooms.get_by_user(user_id) {
                    let room_id = room.read().room_id;
                    self.end_room_and_notify_peer(room_id, "message_limit_reached", None);
                }
                return Err(DispatchError::from(crate::error::RoomError::MessageLimitReached));
            }
            Err(e) => return Err(DispatchError::from(e)),
        };

        crate::metrics::MESSAGES_RELAYED_TOTAL.inc();

        let peer_id = room.read().peer_of(user_id);
        if let Some(peer_id) = peer_id {
            self.core.try_send_to_user(
                peer_id,
                OutboundEvent::ChatMessage {
                    message_id: message.message_id,
                    sequence: message.sequence,
                    text: message.text.clone(),
                    timestamp: message.timestamp,
                },
            );
        }

        Ok(Some(OutboundEvent::MessageSent {
            message_id: message.message_id,
            sequence: message.sequence,
        }))
    }

    /// Shared path for the three opaque WebRTC signaling forwards. Each
    /// carries the sender's id so the peer can tell offer/answer/ICE
    /// frames from different connection attempts apart.
    fn forward_signal(
        &self,
        transport_id: TransportId,
        label: &str,
        wrap: impl Fn(serde_json::Value, UserId) -> OutboundEvent,
        payload: serde_json::Value,
        on_success: Option<ActivityKind>,
    ) -> Result<Option<OutboundEvent>, DispatchError> {
        let session = self
            .core
            .registry
            .get_by_transport(transport_id)
            .ok_or(DispatchError::Precondition("not registered".into()))?;
        let user_id = session.read().user_id;
        let room = self
            .core
            .rooms
            .get_by_user(user_id)
            .ok_or(DispatchError::Precondition("no active chat".into()))?;
        let room_id = room.read().room_id;
        let peer_id = room
            .read()
            .peer_of(user_id)
            .ok_or(DispatchError::Internal("room missing peer".into()))?;

        let delivered = self.core.try_send_to_user(peer_id, wrap(payload, user_id));
        if delivered {
            if let Some(kind) = on_success {
                self.core.rooms.record_activity(room_id, kind, None).ok();
            }
        } else {
            self.core
                .rooms
                .record_activity(room_id, ActivityKind::QualityIssue, Some(format!("{label} delivery failed")))
                .ok();
        }
        Ok(None)
    }

    fn handle_typing(&self, transport_id: TransportId, typing: bool) -> Result<Option<OutboundEvent>, DispatchError> {
        let session = self
            .core
            .registry
            .get_by_transport(transport_id)
            .ok_or(DispatchError::Precondition("not registered".into()))?;
        let user_id = session.read().user_id;
        let room = self
            .core
            .rooms
            .get_by_user(user_id)
            .ok_or(DispatchError::Precondition("no active chat".into()))?;
        let peer_id = room
            .read()
            .peer_of(user_id)
            .ok_or(DispatchError::Internal("room missing peer".into()))?;
        self.core
            .try_send_to_user(peer_id, OutboundEvent::PeerTyping { typing });
        Ok(None)
    }

    fn handle_end_chat(&self, transport_id: TransportId) -> Result<Option<OutboundEvent>, DispatchError> {
        let session = self
            .core
            .registry
            .get_by_transport(transport_id)
            .ok_or(DispatchError::Precondition("not registered".into()))?;
        let user_id = session.read().user_id;
        let room_id = session
            .read()
            .current_room_id
            .ok_or(DispatchError::Precondition("no active chat".into()))?;

        self.end_room_and_notify_peer(room_id, "user_action", Some(user_id));
        Ok(Some(OutboundEvent::Ended {
            reason: "user_action".to_string(),
        }))
    }

    /// 5-minute ticker: end any room whose participants have gone
    /// quiet for too long.
    pub fn sweep_inactive_rooms(&self) {
        let threshold = chrono::Duration::seconds(30 * 60);
        for room_id in self.core.rooms.sweep_inactive(threshold) {
            self.end_room_and_notify_peer(room_id, "inactive_timeout", None);
        }
        for room_id in self.core.rooms.sweep_absolute_timeout() {
            self.end_room_and_notify_peer(room_id, "timeout", None);
        }
    }

    /// 1-minute ticker: drop queue entries that have waited past the
    /// configured cap.
    pub fn sweep_stale_queue(&self) {
        let max_wait = chrono::Duration::seconds(self.core.config.matching.max_wait_secs as i64);
        let dropped = self.core.matching.sweep_stale(max_wait);
        self.refresh_gauges();
        for user_id in dropped {
            self.core.try_send_to_user(
                user_id,
                OutboundEvent::Error {
                    code: "capacity_error".to_string(),
                    message: "no match found in time".to_string(),
                },
            );
        }
    }

    /// 30-second ticker: broadcast current counts to every connected
    /// session.
    pub fn broadcast_stats(&self) {
        self.core.broadcast(OutboundEvent::Stats {
            online_users: self.core.online_count(),
            active_rooms: self.core.active_room_count(),
        });
    }

    /// 30-second-ticker companion: tear down sessions that have been
    /// idle past the registry's timeout.
    pub fn sweep_idle_sessions(&self) {
        for transport_id in self.core.registry.sweep_idle_transports() {
            self.handle_disconnect(transport_id);
        }
    }

    /// Auto-ban fallout: a user who just tripped the violation
    /// threshold loses their active chat, if any, as a `reported_*`
    /// termination rather than a silent drop.
    fn end_current_room_if_any(&self, user_id: UserId, reason: &str) {
        if let Some(room) = self.core.rooms.get_by_user(user_id) {
            let room_id = room.read().room_id;
            self.end_room_and_notify_peer(room_id, reason, Some(user_id));
        }
    }

    fn end_room_and_notify_peer(&self, room_id: RoomId, reason: &str, ended_by: Option<UserId>) {
        let Some(room) = self.core.rooms.get_by_room(room_id) else {
            return;
        };
        let participants = room.read().participants;
        self.core
            .rooms
            .record_activity(room_id, ActivityKind::WebrtcDisconnected, None)
            .ok();
        let Ok(summary) = self.core.rooms.end_by_room(room_id, reason, ended_by) else {
            return;
        };
        crate::metrics::ROOMS_ENDED_TOTAL
            .with_label_values(&[summary.reason.as_str()])
            .inc();

        for participant in participants {
            let _ = self.core.registry.unbind_room(participant);
            if Some(participant) != ended_by {
                self.core.try_send_to_user(
                    participant,
                    OutboundEvent::Ended {
                        reason: summary.reason.clone(),
                    },
                );
            }
        }
        self.refresh_gauges();
    }
}

fn validate_message(text: &str) -> Result<(), DispatchError> {
    if text.is_empty() || text.len() > MAX_MESSAGE_LEN_HARD_CAP {
        return Err(DispatchError::Validation("message length out of range".into()));
    }
    if has_suspicious_repetition(text) {
        return Err(DispatchError::Validation("message looks like spam".into()));
    }
    Ok(())
}

/// Catches runs of 10+ identical characters, 10+ consecutive
/// uppercase letters, 10+ consecutive digits, or 5+ consecutive
/// symbols — crude heuristics for flooding/spam-bot traffic.
fn has_suspicious_repetition(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut run_char = 0usize;
    let mut run_upper = 0usize;
    let mut run_digit = 0usize;
    let mut run_symbol = 0usize;
    let mut prev: Option<char> = None;

    for &c in &chars {
        run_char = if prev == Some(c) { run_char + 1 } else { 1 };
        run_upper = if c.is_uppercase() { run_upper + 1 } else { 0 };
        run_digit = if c.is_ascii_digit() { run_digit + 1 } else { 0 };
        run_symbol = if !c.is_alphanumeric() && !c.is_whitespace() {
            run_symbol + 1
        } else {
            0
        };
        if run_char >= 10 || run_upper >= 10 || run_digit >= 10 || run_symbol >= 5 {
            return true;
        }
        prev = Some(c);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::Core;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Core::new(Config::default())))
    }

    #[test]
    fn register_then_find_match_queues_alone() {
        let d = dispatcher();
        let transport = TransportId::new_v4();
        d.handle(transport, InboundEvent::Register { profile: RawProfile::default() });
        let reply = d.handle(transport, InboundEvent::FindMatch { profile: RawProfile::default() });
        matches!(reply, Some(OutboundEvent::Queued { .. }));
    }

    #[test]
    fn two_compatible_users_are_matched() {
        let d = dispatcher();
        let t1 = TransportId::new_v4();
        let t2 = TransportId::new_v4();
        d.handle(t1, InboundEvent::Register { profile: RawProfile::default() });
        d.handle(t2, InboundEvent::Register { profile: RawProfile::default() });
        d.handle(t1, InboundEvent::FindMatch { profile: RawProfile::default() });
        let reply = d.handle(t2, InboundEvent::FindMatch { profile: RawProfile::default() });
        assert!(matches!(reply, Some(OutboundEvent::MatchFound { .. })));
    }

    #[test]
    fn chat_message_without_room_is_a_precondition_error() {
        let d = dispatcher();
        let transport = TransportId::new_v4();
        d.handle(transport, InboundEvent::Register { profile: RawProfile::default() });
        let reply = d.handle(transport, InboundEvent::ChatMessage { text: "hi".into() });
        match reply {
            Some(OutboundEvent::Error { code, .. }) => assert_eq!(code, "precondition_error"),
            other => panic!("expected precondition error, got {other:?}"),
        }
    }

    #[test]
    fn spammy_message_is_rejected() {
        let d = dispatcher();
        let t1 = TransportId::new_v4();
        let t2 = TransportId::new_v4();
        d.handle(t1, InboundEvent::Register { profile: RawProfile::default() });
        d.handle(t2, InboundEvent::Register { profile: RawProfile::default() });
        d.handle(t1, InboundEvent::FindMatch { profile: RawProfile::default() });
        d.handle(t2, InboundEvent::FindMatch { profile: RawProfile::default() });

        let reply = d.handle(t1, InboundEvent::ChatMessage { text: "aaaaaaaaaaaa".into() });
        match reply {
            Some(OutboundEvent::Error { code, .. }) => assert_eq!(code, "validation_error"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_ends_the_room_and_frees_both_users() {
        let d = dispatcher();
        let t1 = TransportId::new_v4();
        let t2 = TransportId::new_v4();
        d.handle(t1, InboundEvent::Register { profile: RawProfile::default() });
        d.handle(t2, InboundEvent::Register { profile: RawProfile::default() });
        d.handle(t1, InboundEvent::FindMatch { profile: RawProfile::default() });
        d.handle(t2, InboundEvent::FindMatch { profile: RawProfile::default() });

        d.handle_disconnect(t1);
        assert_eq!(d.core().active_room_count(), 0);
        assert_eq!(d.core().online_count(), 1);
    }
}
