//! The process-wide state struct, grounded on `Matrix`: one object
//! that owns the three subsystems instead of ambient singletons, plus
//! the outbound-sender registry used to reach a connected client
//! without holding any subsystem lock across the send.

use crate::config::Config;
use crate::protocol::{OutboundEvent, UserId};
use crate::state::matching::MatchingEngine;
use crate::state::registry::UserRegistry;
use crate::state::rooms::RoomManager;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub type OutboundSender = mpsc::Sender<OutboundEvent>;

pub struct Core {
    pub registry: UserRegistry,
    pub rooms: RoomManager,
    pub matching: MatchingEngine,
    pub config: Config,
    senders: DashMap<UserId, OutboundSender>,
    total_connections: AtomicU64,
    total_wait_ms: AtomicU64,
    matches_completed: AtomicU64,
}

impl Core {
    pub fn new(config: Config) -> Self {
        Self {
            registry: UserRegistry::new(crate::state::registry::DEFAULT_IDLE_TIMEOUT_SECS),
            rooms: RoomManager::new(config.chat.max_chat_duration_ms),
            matching: MatchingEngine::new(config.matching.max_queue),
            config,
            senders: DashMap::new(),
            total_connections: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
            matches_completed: AtomicU64::new(0),
        }
    }

    /// Bumps the lifetime connection counter; unlike `online_count`
    /// this never decreases.
    pub fn record_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Folds a completed match's queue wait time into the running
    /// average reported by `/stats`.
    pub fn record_match_wait(&self, wait_ms: i64) {
        self.total_wait_ms
            .fetch_add(wait_ms.max(0) as u64, Ordering::Relaxed);
        self.matches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average_wait_time_ms(&self) -> u64 {
        let matches = self.matches_completed.load(Ordering::Relaxed);
        if matches == 0 {
            return 0;
        }
        self.total_wait_ms.load(Ordering::Relaxed) / matches
    }

    pub fn register_sender(&self, user_id: UserId, sender: OutboundSender) {
        self.senders.insert(user_id, sender);
    }

    pub fn remove_sender(&self, user_id: UserId) {
        self.senders.remove(&user_id);
    }

    /// Clones the sender out of the map and releases the shard guard
    /// before the caller awaits on it, following the same discipline
    /// `UserManager::send_to_uid` uses around its own DashMap.
    pub fn sender_for(&self, user_id: UserId) -> Option<OutboundSender> {
        self.senders.get(&user_id).map(|e| e.clone())
    }

    /// Best-effort, non-blocking delivery. A full outbound buffer
    /// means the client is too slow; callers treat the failure as a
    /// disconnect rather than blocking the event loop on it.
    pub fn try_send_to_user(&self, user_id: UserId, event: OutboundEvent) -> bool {
        match self.sender_for(user_id) {
            Some(sender) => sender.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn broadcast(&self, event: OutboundEvent) {
        for entry in self.senders.iter() {
            let _ = entry.value().try_send(event.clone());
        }
    }

    pub fn online_count(&self) -> u64 {
        self.registry.len() as u64
    }

    pub fn active_room_count(&self) -> u64 {
        self.rooms.active_count() as u64
    }

    pub fn queue_depth(&self) -> u64 {
        self.matching.len() as u64
    }
}
