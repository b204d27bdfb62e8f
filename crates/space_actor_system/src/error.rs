//! Error types for the actor runtime, cells and client sessions.

use crate::types::EntityId;

/// Failures talking to a client session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session was never attached or has already been closed.
    #[error("no active session")]
    NoActiveSession,
    /// The transport refused the payload.
    #[error("transport error: {0}")]
    Transport(String),
    /// The message could not be encoded for the wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cell membership consistency violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CellError {
    /// The entity is still owned by another cell and must leave it first.
    #[error("entity {entity} already belongs to cell {cell}")]
    AlreadyInCell { entity: EntityId, cell: EntityId },
    /// No member with this id.
    #[error("entity {0} is not a member of this cell")]
    NotAMember(EntityId),
}

/// Actor lifecycle errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActorError {
    /// The actor loop has terminated.
    #[error("actor for entity {0} is closed")]
    Closed(EntityId),
    /// The entity already has an actor attached.
    #[error("entity {0} already has a running actor")]
    AlreadyRunning(EntityId),
    /// The actor settings cannot drive a loop.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration validation failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
