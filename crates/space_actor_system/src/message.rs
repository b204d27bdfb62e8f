//! Payloads that travel between actors.
//!
//! The wire format is owned by the transport collaborator; inside the runtime
//! messages are plain structured values carried as `serde_json::Value`.

use crate::entity::Entity;
use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A message headed for one or more clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A pre-built message: `{namespace, event, data}` like every client
    /// message in the server.
    Message {
        namespace: String,
        event: String,
        data: serde_json::Value,
    },
    /// A remote procedure call: method name plus positional arguments.
    Rpc {
        method: String,
        args: Vec<serde_json::Value>,
    },
}

impl OutboundMessage {
    pub fn message(namespace: impl Into<String>, event: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Message {
            namespace: namespace.into(),
            event: event.into(),
            data,
        }
    }

    pub fn rpc(method: impl Into<String>, args: Vec<serde_json::Value>) -> Self {
        Self::Rpc {
            method: method.into(),
            args,
        }
    }

    /// Encodes the message for a raw transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// One enter/leave notification for a watcher.
#[derive(Clone)]
pub struct AoiInfo {
    /// `true` when the subject entered the watcher's range
    pub is_enter: bool,
    /// The subject
    pub entity: Arc<Entity>,
}

impl AoiInfo {
    pub fn enter(entity: Arc<Entity>) -> Self {
        Self { is_enter: true, entity }
    }

    pub fn leave(entity: Arc<Entity>) -> Self {
        Self { is_enter: false, entity }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity.id()
    }
}

impl std::fmt::Debug for AoiInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AoiInfo")
            .field("is_enter", &self.is_enter)
            .field("entity", &self.entity.id())
            .finish()
    }
}

/// Work delivered to an entity by other components.
///
/// Each delivery becomes exactly one unit of work on the recipient's actor, so
/// an AOI batch is observed whole or not at all.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A broadcast routed to this entity.
    Client {
        from: EntityId,
        message: OutboundMessage,
    },
    /// This tick's interest changes.
    Aoi(Vec<AoiInfo>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_encoding() {
        let msg = OutboundMessage::rpc("Jump", vec![serde_json::json!(1), serde_json::json!("high")]);
        let bytes = msg.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], "rpc");
        assert_eq!(value["method"], "Jump");
        assert_eq!(value["args"][1], "high");
    }

    #[test]
    fn test_message_encoding() {
        let msg = OutboundMessage::message("chat", "say", serde_json::json!({"text": "hi"}));
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value["kind"], "message");
        assert_eq!(value["namespace"], "chat");
        assert_eq!(value["data"]["text"], "hi");
    }
}
