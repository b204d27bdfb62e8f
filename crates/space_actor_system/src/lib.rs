//! # Space Actor System
//!
//! Entity-actor runtime and area-of-interest (AOI) layer for a multiplayer
//! space server.
//!
//! ## Core Features
//!
//! - **Entity Actors**: every live entity runs its own tokio task that
//!   processes queued calls and a fixed-period tick one at a time
//! - **Panic Isolation**: each unit of work runs under an error boundary; a
//!   failure is logged and, in debug mode, reported to the gateway
//! - **Cells**: containers that scope interest computation and drive it from
//!   their own actor tick
//! - **AOI**: incremental, per-watcher-radius enter/leave detection backed by a
//!   quadtree
//! - **Broadcast Routing**: message and RPC fan-out to watchers or to everyone
//!   within range of a point
//! - **Gateway Users**: player actors that own a client session and log out
//!   exactly once
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use space_actor_system::*;
//! use std::sync::Arc;
//!
//! struct Rock {
//!     entity: Arc<Entity>,
//! }
//!
//! impl EntityBehavior for Rock {
//!     fn entity(&self) -> &Arc<Entity> {
//!         &self.entity
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = EntityRegistry::new(ActorConfig::default(), CellConfig::default());
//!     let cell = registry.create_cell()?;
//!
//!     let entity = registry.new_entity(CapabilitySet::observed());
//!     entity.set_position(Vec3::new(1.0, 0.0, 2.0));
//!     registry.spawn(Rock { entity: entity.clone() })?;
//!     cell.add_entity(entity)?;
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod aoi;
pub mod broadcast;
pub mod cell;
pub mod config;
pub mod diagnostics;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod message;
pub mod mover;
pub mod navigation;
pub mod registry;
pub mod session;
pub mod spatial;
pub mod types;

pub use actor::{ActorHandle, EntityActor, EntityBehavior};
pub use aoi::{AoiEngine, AoiEvent, AoiStats, AoiSubject};
pub use broadcast::ClientBroadcaster;
pub use cell::{Cell, CellBehavior};
pub use config::{ActorConfig, CellConfig};
pub use diagnostics::{ChannelErrorSink, ErrorReport, GatewayErrorChannel, WorkOrigin};
pub use entity::{ActorRef, Entity};
pub use error::{ActorError, CellError, ConfigError, SessionError};
pub use gateway::{GateUser, GateUserBehavior, GateUserHandle, RelayLogic, UserLogic};
pub use message::{AoiInfo, Delivery, OutboundMessage};
pub use mover::Mover;
pub use navigation::{DirectNavigator, Navigator};
pub use registry::{EntityDirectory, EntityRegistry, RegistryStats};
pub use session::{ChannelSession, ClientSession};
pub use spatial::SpatialIndex;
pub use types::{current_timestamp, Capability, CapabilitySet, EntityId, Transform, Vec3};
