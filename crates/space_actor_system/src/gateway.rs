//! # Gateway Users
//!
//! A gateway user is the actor of a connected player. It owns the player's
//! client session exclusively, forwards broadcasts routed to the player down
//! that session and tears everything down on logout.
//!
//! Game code plugs in through [`UserLogic`]; the actor behavior is
//! [`GateUserBehavior`], and [`GateUserHandle`] adds the asynchronous send and
//! logout entry points other actors use.

use crate::actor::{ActorHandle, EntityBehavior};
use crate::entity::Entity;
use crate::error::SessionError;
use crate::message::{AoiInfo, OutboundMessage};
use crate::registry::EntityDirectory;
use crate::session::ClientSession;
use crate::types::EntityId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connection-facing state of a gateway user.
pub struct GateUser {
    entity: Arc<Entity>,
    session: Option<Box<dyn ClientSession>>,
    logged_out: bool,
    directory: Arc<dyn EntityDirectory>,
}

impl GateUser {
    /// Wraps a freshly connected session.
    ///
    /// # Arguments
    ///
    /// * `entity` - The player's entity
    /// * `session` - Client transport, owned exclusively from now on
    /// * `directory` - Asked to destroy `entity` on logout
    pub fn new(entity: Arc<Entity>, session: Box<dyn ClientSession>, directory: Arc<dyn EntityDirectory>) -> Self {
        Self {
            entity,
            session: Some(session),
            logged_out: false,
            directory,
        }
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    /// False once the session has been closed.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether [`GateUser::logout`] has already run.
    pub fn is_logged_out(&self) -> bool {
        self.logged_out
    }

    /// Sends a message to the client.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoActiveSession`] once the session has been closed.
    pub fn send(&mut self, message: &OutboundMessage) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) => session.send(message),
            None => Err(SessionError::NoActiveSession),
        }
    }

    /// Sends pre-encoded bytes to the client.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) => session.send_raw(data),
            None => Err(SessionError::NoActiveSession),
        }
    }

    /// Closes the client connection without logging out.
    pub fn close_cli_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    /// Closes the session and asks the registry to destroy the entity.
    /// Only the first call has any effect.
    pub fn logout(&mut self) {
        if self.logged_out {
            return;
        }
        self.logged_out = true;

        info!("👋 Logout, id: {}", self.id());
        self.close_cli_session();
        self.directory.destroy_entity(self.id());
    }
}

impl std::fmt::Debug for GateUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateUser")
            .field("id", &self.id())
            .field("has_session", &self.has_session())
            .field("logged_out", &self.logged_out)
            .finish()
    }
}

/// Game logic of a connected player.
pub trait UserLogic: Send + 'static {
    fn on_tick(&mut self, user: &mut GateUser) {
        let _ = user;
    }

    /// Persist dirty properties; called once per tick while dirty.
    fn flush_dirty_props(&mut self, user: &mut GateUser) {
        let _ = user;
    }

    fn on_aoi_update(&mut self, user: &mut GateUser, batch: Vec<AoiInfo>) {
        let _ = (user, batch);
    }

    /// A broadcast routed to this player. Forwards it to the client by default.
    fn on_client_message(&mut self, user: &mut GateUser, from: EntityId, message: OutboundMessage) {
        if let Err(e) = user.send(&message) {
            debug!("Dropping message from {} for {}: {}", from, user.id(), e);
        }
    }

    fn on_closed(&mut self, user: &mut GateUser) {
        let _ = user;
    }
}

/// Logic that only relays broadcasts to the client.
#[derive(Debug, Default)]
pub struct RelayLogic;

impl UserLogic for RelayLogic {}

/// Actor behavior wrapping a [`GateUser`] and its logic.
pub struct GateUserBehavior<L> {
    user: GateUser,
    logic: L,
}

impl<L: UserLogic> GateUserBehavior<L> {
    pub fn new(user: GateUser, logic: L) -> Self {
        Self { user, logic }
    }

    /// The connection-facing state.
    pub fn user(&mut self) -> &mut GateUser {
        &mut self.user
    }

    /// The game logic plugged into this user.
    pub fn logic(&mut self) -> &mut L {
        &mut self.logic
    }
}

impl<L: UserLogic> EntityBehavior for GateUserBehavior<L> {
    fn entity(&self) -> &Arc<Entity> {
        &self.user.entity
    }

    fn on_tick(&mut self) {
        self.logic.on_tick(&mut self.user);
    }

    fn flush_dirty_props(&mut self) {
        self.logic.flush_dirty_props(&mut self.user);
    }

    fn on_client_message(&mut self, from: EntityId, message: OutboundMessage) {
        self.logic.on_client_message(&mut self.user, from, message);
    }

    fn on_aoi_update(&mut self, batch: Vec<AoiInfo>) {
        self.logic.on_aoi_update(&mut self.user, batch);
    }

    fn on_closed(&mut self) {
        self.logic.on_closed(&mut self.user);
        // The session must not outlive the actor.
        self.user.close_cli_session();
        debug!("gate user loop end, id: {}", self.user.id());
    }
}

/// Handle of a running gateway user actor.
pub type GateUserHandle<L> = ActorHandle<GateUserBehavior<L>>;

impl<L: UserLogic> ActorHandle<GateUserBehavior<L>> {
    /// Sends `message` from inside the user's actor.
    pub fn async_send(&self, message: OutboundMessage) -> bool {
        self.post_async(move |behavior: &mut GateUserBehavior<L>| {
            if let Err(e) = behavior.user.send(&message) {
                warn!("AsyncSend failed for {}: {}", behavior.user.id(), e);
            }
        })
    }

    /// Sends raw bytes from inside the user's actor.
    pub fn async_send_raw(&self, data: Vec<u8>) -> bool {
        self.post_async(move |behavior: &mut GateUserBehavior<L>| {
            if let Err(e) = behavior.user.send_raw(&data) {
                warn!("AsyncSendRaw failed for {}: {}", behavior.user.id(), e);
            }
        })
    }

    /// Runs [`GateUser::logout`] on the user's actor.
    pub fn async_logout(&self) -> bool {
        self.post_async(|behavior: &mut GateUserBehavior<L>| behavior.user.logout())
    }

    /// Stops the user's actor after the grace period.
    pub fn close_routine(&self) {
        self.request_close();
    }
}
