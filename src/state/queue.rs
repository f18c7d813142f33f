//! Matching queue entry and priority computation.

use crate::protocol::UserId;
use crate::state::profile::Preferences;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub preferences: Preferences,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
    pub priority: f64,
}

impl QueueEntry {
    pub fn new(user_id: UserId, preferences: Preferences, trust_score: f64, violation_count: u32, session_age_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            preferences,
            queued_at: now,
            attempts: 0,
            last_attempt_at: now,
            priority: compute_priority(trust_score, violation_count, session_age_secs),
        }
    }

    pub fn wait_time(&self) -> chrono::Duration {
        Utc::now() - self.queued_at
    }
}

/// `clamp(0.1, 2.0, 1.0 + (trust_score - 0.5) * 0.5 - 0.1 * violations
/// + (session_age < 1h ? 0.2 : 0))`.
pub fn compute_priority(trust_score: f64, violation_count: u32, session_age_secs: i64) -> f64 {
    let freshness_bonus = if session_age_secs < 3600 { 0.2 } else { 0.0 };
    let raw = 1.0 + (trust_score - 0.5) * 0.5 - 0.1 * violation_count as f64 + freshness_bonus;
    raw.clamp(0.1, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_stays_within_bounds() {
        assert!((0.1..=2.0).contains(&compute_priority(1.0, 0, 10)));
        assert!((0.1..=2.0).contains(&compute_priority(0.0, 20, 100_000)));
    }

    #[test]
    fn fresh_sessions_get_a_bonus() {
        let fresh = compute_priority(1.0, 0, 10);
        let old = compute_priority(1.0, 0, 100_000);
        assert!(fresh > old);
    }

    #[test]
    fn violations_reduce_priority() {
        let clean = compute_priority(1.0, 0, 10);
        let violated = compute_priority(1.0, 3, 10);
        assert!(violated < clean);
    }
}
