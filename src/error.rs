//! Error taxonomy for the core and the event dispatcher.
//!
//! Mirrors the split the rest of the ecosystem uses between a
//! client-facing error (with a stable code and a wire reply) and the
//! small domain errors each subsystem raises internally, which the
//! dispatcher folds into the client-facing shape.

use crate::protocol::OutboundEvent;
use thiserror::Error;

/// Errors raised by the user session registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("transport already has a session")]
    AlreadyRegistered,
    #[error("no session for this transport")]
    NotRegistered,
    #[error("user not found")]
    UserNotFound,
    #[error("user is banned")]
    Banned,
}

/// Errors raised by the chat room manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room not found")]
    NotFound,
    #[error("room is closed")]
    Closed,
    #[error("caller is not a participant in this room")]
    NotParticipant,
    #[error("user already has an active room")]
    AlreadyInRoom,
    #[error("message limit reached")]
    MessageLimitReached,
}

/// Errors raised by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("queue is full")]
    QueueFull,
    #[error("user is not in the queue")]
    NotQueued,
}

/// Top-level taxonomy the dispatcher converts every subsystem error
/// into before it reaches the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("precondition: {0}")]
    Precondition(String),
    #[error("capacity: {0}")]
    Capacity(String),
    #[error("transport failure")]
    Transport,
    #[error("internal error")]
    Internal(String),
}

impl DispatchError {
    /// Stable code used for metrics labeling and client-side handling.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation_error",
            DispatchError::Precondition(_) => "precondition_error",
            DispatchError::Capacity(_) => "capacity_error",
            DispatchError::Transport => "transport_error",
            DispatchError::Internal(_) => "internal_error",
        }
    }

    /// Message shown to the client. Internal details are never leaked.
    fn client_message(&self) -> String {
        match self {
            DispatchError::Validation(m) => m.clone(),
            DispatchError::Precondition(m) => m.clone(),
            DispatchError::Capacity(m) => m.clone(),
            DispatchError::Transport => "connection problem".to_string(),
            DispatchError::Internal(_) => "internal error".to_string(),
        }
    }

    /// Convert to the outbound `error` event sent back to the
    /// offending client only. Internal errors are still reported so
    /// the client can react, but with detail stripped.
    pub fn to_event(&self) -> OutboundEvent {
        OutboundEvent::Error {
            code: self.code().to_string(),
            message: self.client_message(),
        }
    }
}

impl From<RegistryError> for DispatchError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyRegistered => {
                DispatchError::Precondition("already registered".into())
            }
            RegistryError::NotRegistered => DispatchError::Precondition("not registered".into()),
            RegistryError::UserNotFound => DispatchError::Internal("user not found".into()),
            RegistryError::Banned => DispatchError::Precondition("banned".into()),
        }
    }
}

impl From<RoomError> for DispatchError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::NotFound => DispatchError::Precondition("no active chat".into()),
            RoomError::Closed => DispatchError::Precondition("chat has ended".into()),
            RoomError::NotParticipant => DispatchError::Precondition("not in this chat".into()),
            RoomError::AlreadyInRoom => DispatchError::Precondition("already in a chat".into()),
            RoomError::MessageLimitReached => {
                DispatchError::Capacity("message limit reached".into())
            }
        }
    }
}

impl From<MatchError> for DispatchError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::QueueFull => DispatchError::Capacity("queue is full".into()),
            MatchError::NotQueued => DispatchError::Precondition("not queued".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_keeps_its_message_for_the_client() {
        let e = DispatchError::Validation("message too long".into());
        assert_eq!(e.code(), "validation_error");
        match e.to_event() {
            OutboundEvent::Error { code, message } => {
                assert_eq!(code, "validation_error");
                assert_eq!(message, "message too long");
            }
            _ => panic!("expected error event"),
        }
    }

    #[test]
    fn internal_error_never_leaks_detail() {
        let e = DispatchError::Internal("participant missing from registry".into());
        match e.to_event() {
            OutboundEvent::Error { message, .. } => {
                assert_eq!(message, "internal error");
            }
            _ => panic!("expected error event"),
        }
    }

    #[test]
    fn subsystem_errors_map_to_expected_codes() {
        assert_eq!(
            DispatchError::from(RoomError::MessageLimitReached).code(),
            "capacity_error"
        );
        assert_eq!(
            DispatchError::from(MatchError::QueueFull).code(),
            "capacity_error"
        );
        assert_eq!(
            DispatchError::from(RegistryError::NotRegistered).code(),
            "precondition_error"
        );
    }
}
