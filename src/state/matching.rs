//! Weighted compatibility scoring and the matchmaking queue.
//!
//! There is no direct teacher analogue for matchmaking — an IRC
//! daemon has nothing to pair. The queue/sender-registry shape below
//! is grounded on the periodic-maintenance task pattern used
//! throughout the teacher's startup sequence (`tokio::time::interval`
//! racing a shutdown signal) and cross-checked against
//! `other_examples/...fish-server.../src-server.rs.rs`'s
//! `InMemoryMessageCoordinator`, which shows the same non-blocking,
//! warn-on-failure sender registry idiom this module's callers use.

use crate::error::MatchError;
use crate::protocol::{AgePreference, AgeBucket, ChatType, GenderPreference, Gender, UserId};
use crate::state::profile::{Preferences, Profile};
use crate::state::queue::QueueEntry;
use chrono::Duration;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

const WEIGHT_GENDER: f64 = 0.30;
const WEIGHT_AGE: f64 = 0.20;
const WEIGHT_LOCATION: f64 = 0.15;
const WEIGHT_INTERESTS: f64 = 0.25;
const WEIGHT_TRUST: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct CompatInput {
    pub profile: Profile,
    pub preferences: Preferences,
    pub trust_score: f64,
}

fn gender_satisfied(pref: GenderPreference, actual: Gender) -> bool {
    match pref {
        GenderPreference::Any => true,
        GenderPreference::Male => actual == Gender::Male,
        GenderPreference::Female => actual == Gender::Female,
        GenderPreference::Other => actual == Gender::Other,
    }
}

fn gender_score(a: &CompatInput, b: &CompatInput) -> f64 {
    if a.preferences.gender == GenderPreference::Any && b.preferences.gender == GenderPreference::Any {
        return 1.0;
    }
    let a_satisfied = gender_satisfied(a.preferences.gender, b.profile.gender);
    let b_satisfied = gender_satisfied(b.preferences.gender, a.profile.gender);
    (a_satisfied as u8 as f64) * 0.5 + (b_satisfied as u8 as f64) * 0.5
}

fn age_pref_satisfied(pref: AgePreference, actual: AgeBucket) -> bool {
    match pref {
        AgePreference::Any => true,
        AgePreference::R18To25 => actual == AgeBucket::R18To25,
        AgePreference::R26To35 => actual == AgeBucket::R26To35,
        AgePreference::R36To45 => actual == AgeBucket::R36To45,
        AgePreference::R46Plus => actual == AgeBucket::R46Plus,
    }
}

fn age_score(a: &CompatInput, b: &CompatInput) -> f64 {
    if a.profile.age == AgeBucket::NotSpecified || b.profile.age == AgeBucket::NotSpecified {
        return 0.5;
    }
    if a.profile.age == b.profile.age {
        return 1.0;
    }
    let a_satisfied = age_pref_satisfied(a.preferences.age, b.profile.age);
    let b_satisfied = age_pref_satisfied(b.preferences.age, a.profile.age);
    (a_satisfied as u8 as f64) * 0.5 + (b_satisfied as u8 as f64) * 0.5
}

fn location_score(a: &CompatInput, b: &CompatInput) -> f64 {
    if a.profile.location.is_empty() || b.profile.location.is_empty() {
        return 0.5;
    }
    let la = a.profile.location.to_lowercase();
    let lb = b.profile.location.to_lowercase();
    if la == lb {
        return 1.0;
    }
    let country_a = la.split(',').next().unwrap_or(&la).trim();
    let country_b = lb.split(',').next().unwrap_or(&lb).trim();
    if country_a == country_b {
        return 0.8;
    }
    if la.contains(&lb) || lb.contains(&la) {
        return 0.6;
    }
    0.3
}

fn interests_score(a: &CompatInput, b: &CompatInput) -> f64 {
    if a.profile.keywords.is_empty() && b.profile.keywords.is_empty() {
        return 0.5;
    }
    if a.profile.keywords.is_empty() || b.profile.keywords.is_empty() {
        return 0.4;
    }
    let set_a: std::collections::HashSet<&str> = a.profile.keywords.iter().map(|s| s.as_str()).collect();
    let set_b: std::collections::HashSet<&str> = b.profile.keywords.iter().map(|s| s.as_str()).collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count().max(1);
    let jaccard = intersection as f64 / union as f64;
    let bonus = (0.1 * intersection as f64).min(0.3);
    (jaccard + bonus).min(1.0)
}

fn trust_score(a: &CompatInput, b: &CompatInput) -> f64 {
    let mean = (a.trust_score + b.trust_score) / 2.0;
    let delta = (a.trust_score - b.trust_score).abs();
    mean * (1.0 - 0.5 * delta)
}

/// Weighted sum of the five attribute scores. Symmetric in its
/// arguments.
pub fn compatibility(a: &CompatInput, b: &CompatInput) -> f64 {
    WEIGHT_GENDER * gender_score(a, b)
        + WEIGHT_AGE * age_score(a, b)
        + WEIGHT_LOCATION * location_score(a, b)
        + WEIGHT_INTERESTS * interests_score(a, b)
        + WEIGHT_TRUST * trust_score(a, b)
}

/// `max(0.1, 0.3 - 0.02 * wait_minutes)`.
pub fn dynamic_threshold(wait: Duration) -> f64 {
    let wait_minutes = wait.num_seconds() as f64 / 60.0;
    (0.3 - 0.02 * wait_minutes).max(0.1)
}

pub struct MatchPair {
    pub a: UserId,
    pub b: UserId,
    pub chat_type: ChatType,
    pub avg_wait_ms: i64,
}

/// The priority queue itself. Enqueue/cancel/sweep are all taken
/// through the same mutex so a sweep can never race a concurrent
/// enqueue into double-placing a user.
pub struct MatchingEngine {
    entries: Mutex<HashMap<UserId, QueueEntry>>,
    max_queue: usize,
}

impl MatchingEngine {
    pub fn new(max_queue: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_queue,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn enqueue(
        &self,
        user_id: UserId,
        preferences: Preferences,
        trust_score: f64,
        violation_count: u32,
        session_age_secs: i64,
    ) -> Result<QueueEntry, MatchError> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&user_id) {
            return Ok(existing.clone());
        }
        if entries.len() >= self.max_queue {
            return Err(MatchError::QueueFull);
        }
        let entry = QueueEntry::new(user_id, preferences, trust_score, violation_count, session_age_secs);
        entries.insert(user_id, entry.clone());
        Ok(entry)
    }

    pub fn cancel(&self, user_id: UserId) {
        self.entries.lock().remove(&user_id);
    }

    /// Ranked position, 1-based; `-1` if the user isn't queued.
    pub fn position(&self, user_id: UserId) -> i64 {
        let entries = self.entries.lock();
        let Some(target) = entries.get(&user_id) else {
            return -1;
        };
        let mut rank = 1i64;
        for entry in entries.values() {
            if entry.user_id == user_id {
                continue;
            }
            let ahead = entry.priority > target.priority
                || (entry.priority == target.priority && entry.queued_at < target.queued_at);
            if ahead {
                rank += 1;
            }
        }
        rank
    }

    pub fn sweep_stale(&self, max_wait: Duration) -> Vec<UserId> {
        let mut entries = self.entries.lock();
        let stale: Vec<UserId> = entries
            .values()
            .filter(|e| e.wait_time() > max_wait)
            .map(|e| e.user_id)
            .collect();
        for user_id in &stale {
            entries.remove(user_id);
        }
        stale
    }

    /// Attempts to find a partner for `requester` right now, scanning
    /// the rest of the queue for the highest scorer above the dynamic
    /// threshold. Returns the matched peer's inputs without removing
    /// either entry — callers remove both atomically via `remove_pair`.
    pub fn try_match_now(
        &self,
        requester: UserId,
        requester_compat: &CompatInput,
        candidates: impl Fn(UserId) -> Option<CompatInput>,
    ) -> Option<UserId> {
        let entries = self.entries.lock();
        let requester_entry = entries.get(&requester)?;
        let threshold = dynamic_threshold(requester_entry.wait_time());

        let mut best: Option<(UserId, f64)> = None;
        for entry in entries.values() {
            if entry.user_id == requester {
                continue;
            }
            let Some(candidate_compat) = candidates(entry.user_id) else {
                continue;
            };
            let score = compatibility(requester_compat, &candidate_compat);
            if score < threshold {
                continue;
            }
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((entry.user_id, score));
            }
        }
        best.map(|(user_id, _)| user_id)
    }

    /// Removes both matched entries and returns their average queue
    /// wait time in milliseconds, for the `/stats` rolling average.
    pub fn remove_pair(&self, a: UserId, b: UserId) -> i64 {
        let mut entries = self.entries.lock();
        let wait_a = entries.get(&a).map(|e| e.wait_time().num_milliseconds());
        let wait_b = entries.get(&b).map(|e| e.wait_time().num_milliseconds());
        entries.remove(&a);
        entries.remove(&b);
        match (wait_a, wait_b) {
            (Some(x), Some(y)) => (x + y) / 2,
            (Some(x), None) | (None, Some(x)) => x,
            (None, None) => 0,
        }
    }

    /// Top `limit` entries by `wait_time + 10000 * priority`,
    /// descending — the candidates the background match loop examines
    /// each tick.
    pub fn top_by_urgency(&self, limit: usize) -> Vec<UserId> {
        let entries = self.entries.lock();
        let mut scored: Vec<(UserId, f64)> = entries
            .values()
            .map(|e| {
                let urgency = e.wait_time().num_seconds() as f64 + 10_000.0 * e.priority;
                (e.user_id, urgency)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored.into_iter().map(|(u, _)| u).collect()
    }

    /// One iteration of the background match loop: examines the top
    /// `limit` most urgent entries and pairs each against the rest of
    /// the queue, skipping anyone already paired earlier in this same
    /// tick.
    pub fn match_tick(
        &self,
        limit: usize,
        candidates: impl Fn(UserId) -> Option<CompatInput>,
    ) -> Vec<MatchPair> {
        let top = self.top_by_urgency(limit);
        let mut matched = HashSet::new();
        let mut pairs = Vec::new();

        for user_id in top {
            if matched.contains(&user_id) {
                continue;
            }
            let Some(requester_compat) = candidates(user_id) else {
                continue;
            };
            let chat_type = requester_compat.preferences.chat_type;
            let found = self.try_match_now(user_id, &requester_compat, |other_id| {
                if matched.contains(&other_id) {
                    None
                } else {
                    candidates(other_id)
                }
            });
            if let Some(peer_id) = found {
                let avg_wait_ms = self.remove_pair(user_id, peer_id);
                matched.insert(user_id);
                matched.insert(peer_id);
                pairs.push(MatchPair {
                    a: user_id,
                    b: peer_id,
                    chat_type,
                    avg_wait_ms,
                });
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::profile::Profile;

    fn compat(gender: Gender, pref_gender: GenderPreference, trust: f64) -> CompatInput {
        CompatInput {
            profile: Profile {
                gender,
                ..Default::default()
            },
            preferences: Preferences {
                gender: pref_gender,
                ..Default::default()
            },
            trust_score: trust,
        }
    }

    #[test]
    fn compatibility_is_symmetric() {
        let a = compat(Gender::Male, GenderPreference::Female, 0.9);
        let b = compat(Gender::Female, GenderPreference::Male, 0.7);
        assert!((compatibility(&a, &b) - compatibility(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn mutual_any_gender_preference_scores_perfectly() {
        let a = compat(Gender::Male, GenderPreference::Any, 1.0);
        let b = compat(Gender::Female, GenderPreference::Any, 1.0);
        assert_eq!(gender_score(&a, &b), 1.0);
    }

    #[test]
    fn threshold_relaxes_as_wait_grows() {
        let short = dynamic_threshold(Duration::seconds(0));
        let long = dynamic_threshold(Duration::minutes(20));
        assert!(long < short);
        assert!(long >= 0.1);
    }

    #[test]
    fn enqueue_is_idempotent() {
        let engine = MatchingEngine::new(10);
        let user = UserId::new_v4();
        let first = engine
            .enqueue(user, Preferences::default(), 1.0, 0, 0)
            .unwrap();
        let second = engine
            .enqueue(user, Preferences::default(), 1.0, 0, 0)
            .unwrap();
        assert_eq!(first.queued_at, second.queued_at);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn queue_full_rejects_new_entries() {
        let engine = MatchingEngine::new(1);
        engine
            .enqueue(UserId::new_v4(), Preferences::default(), 1.0, 0, 0)
            .unwrap();
        let err = engine.enqueue(UserId::new_v4(), Preferences::default(), 1.0, 0, 0);
        assert_eq!(err.unwrap_err(), MatchError::QueueFull);
    }

    #[test]
    fn cancel_removes_from_position_tracking() {
        let engine = MatchingEngine::new(10);
        let user = UserId::new_v4();
        engine
            .enqueue(user, Preferences::default(), 1.0, 0, 0)
            .unwrap();
        engine.cancel(user);
        assert_eq!(engine.position(user), -1);
    }

    #[test]
    fn sweep_stale_evicts_overdue_entries() {
        let engine = MatchingEngine::new(10);
        let user = UserId::new_v4();
        engine
            .enqueue(user, Preferences::default(), 1.0, 0, 0)
            .unwrap();
        let evicted = engine.sweep_stale(Duration::seconds(-1));
        assert_eq!(evicted, vec![user]);
        assert_eq!(engine.len(), 0);
    }
}
