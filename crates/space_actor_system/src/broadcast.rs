//! # Broadcast Routing
//!
//! [`ClientBroadcaster`] turns a broadcast intent from one entity into a set of
//! recipients and posts a [`Delivery::Client`] onto each recipient's actor.
//!
//! | Intent | Recipients |
//! |---|---|
//! | `cast_msg_to_all_client` | current watchers of the source, plus the source |
//! | `cast_msg_to_me` | the source only |
//! | `cast_msg_to_all_client_except_me` | current watchers of the source |
//! | `cast_msg_to_range_except_me` | cell members within radius of a point, minus the source |
//! | `cast_msg_to_center_except_me` | same as range |
//!
//! Watchers are those recorded by the last AOI update of the source's cell.
//! Every method returns how many recipients accepted the delivery.

use crate::entity::Entity;
use crate::message::{Delivery, OutboundMessage};
use crate::types::{Capability, Vec3};
use std::sync::Arc;
use tracing::{debug, trace};

/// Broadcast intents of an entity.
///
/// Only entities with [`Capability::Broadcaster`] reach anyone; for the rest
/// every intent is a no-op returning 0.
///
/// # Examples
///
/// ```
/// use space_actor_system::{CapabilitySet, ClientBroadcaster, Entity};
///
/// // A detached entity has no watchers and no actor of its own.
/// let entity = Entity::new(CapabilitySet::player(), 10.0);
/// assert_eq!(entity.cast_rpc_to_all_client_except_me("Wave", vec![]), 0);
/// ```
pub trait ClientBroadcaster {
    /// Sends to every current watcher and to the source itself.
    fn cast_msg_to_all_client(&self, message: OutboundMessage) -> usize;

    /// Sends to the source only.
    fn cast_msg_to_me(&self, message: OutboundMessage) -> usize;

    /// Sends to every current watcher, never the source.
    fn cast_msg_to_all_client_except_me(&self, message: OutboundMessage) -> usize;

    /// Sends to every member of the source's cell within `radius` of
    /// `center` (boundary included), except the source.
    ///
    /// # Arguments
    ///
    /// * `center` - Point the range is measured from; need not be the source
    /// * `radius` - Inclusive distance limit
    /// * `message` - Payload cloned for every recipient
    ///
    /// # Returns
    ///
    /// The number of recipients whose actor accepted the delivery.
    fn cast_msg_to_range_except_me(&self, center: Vec3, radius: f64, message: OutboundMessage) -> usize;

    /// Same recipients as [`ClientBroadcaster::cast_msg_to_range_except_me`].
    fn cast_msg_to_center_except_me(&self, center: Vec3, radius: f64, message: OutboundMessage) -> usize;

    fn cast_rpc_to_all_client(&self, method: &str, args: Vec<serde_json::Value>) -> usize {
        self.cast_msg_to_all_client(OutboundMessage::rpc(method, args))
    }

    fn cast_rpc_to_me(&self, method: &str, args: Vec<serde_json::Value>) -> usize {
        self.cast_msg_to_me(OutboundMessage::rpc(method, args))
    }

    fn cast_rpc_to_all_client_except_me(&self, method: &str, args: Vec<serde_json::Value>) -> usize {
        self.cast_msg_to_all_client_except_me(OutboundMessage::rpc(method, args))
    }
}

impl Entity {
    fn can_broadcast(&self) -> bool {
        if self.capabilities().contains(Capability::Broadcaster) {
            true
        } else {
            debug!("Entity {} is not a broadcaster, ignoring broadcast", self.id());
            false
        }
    }

    fn watchers(&self) -> Vec<Arc<Entity>> {
        self.cell()
            .map(|cell| cell.watchers_of(self.id()))
            .unwrap_or_default()
    }

    fn dispatch<'a>(&self, recipients: impl IntoIterator<Item = &'a Arc<Entity>>, message: &OutboundMessage) -> usize {
        let mut delivered = 0;
        for recipient in recipients {
            let accepted = recipient.deliver(Delivery::Client {
                from: self.id(),
                message: message.clone(),
            });
            if accepted {
                delivered += 1;
            }
        }
        trace!("Entity {} broadcast reached {} recipient(s)", self.id(), delivered);
        delivered
    }

    fn deliver_to_self(&self, message: OutboundMessage) -> usize {
        let accepted = self.deliver(Delivery::Client {
            from: self.id(),
            message,
        });
        usize::from(accepted)
    }
}

impl ClientBroadcaster for Entity {
    fn cast_msg_to_all_client(&self, message: OutboundMessage) -> usize {
        if !self.can_broadcast() {
            return 0;
        }
        let watchers = self.watchers();
        self.dispatch(&watchers, &message) + self.deliver_to_self(message)
    }

    fn cast_msg_to_me(&self, message: OutboundMessage) -> usize {
        if !self.can_broadcast() {
            return 0;
        }
        self.deliver_to_self(message)
    }

    fn cast_msg_to_all_client_except_me(&self, message: OutboundMessage) -> usize {
        if !self.can_broadcast() {
            return 0;
        }
        let watchers = self.watchers();
        self.dispatch(&watchers, &message)
    }

    fn cast_msg_to_range_except_me(&self, center: Vec3, radius: f64, message: OutboundMessage) -> usize {
        if !self.can_broadcast() {
            return 0;
        }
        let Some(cell) = self.cell() else {
            return 0;
        };
        let recipients: Vec<Arc<Entity>> = cell
            .entities_in_range(center, radius)
            .into_iter()
            .filter(|e| e.id() != self.id())
            .collect();
        self.dispatch(&recipients, &message)
    }

    fn cast_msg_to_center_except_me(&self, center: Vec3, radius: f64, message: OutboundMessage) -> usize {
        self.cast_msg_to_range_except_me(center, radius, message)
    }
}
