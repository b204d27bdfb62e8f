//! # Entity Actors
//!
//! Every live entity owns one actor: a tokio task that serially processes
//! queued calls and a fixed-period tick. Units of work for the same actor
//! never overlap; different actors run in parallel.
//!
//! ```text
//!   post_async(f) ──┐
//!   deliver(d)   ───┼──► mailbox ──┐
//!                   │              ├──► select! ──► one unit ──► catch_unwind
//!   interval ───────┘──► tick ─────┘
//! ```
//!
//! ## Failure isolation
//!
//! Each unit of work runs under `catch_unwind`. A panic is logged with its
//! origin and stack trace and, when `debug` is enabled, reported to the
//! gateway error channel. The loop keeps running either way.
//!
//! ## Shutdown
//!
//! [`ActorHandle::request_close`] does not stop the actor immediately: it arms
//! a timer for the configured grace period, after which the closed flag is set
//! and the loop exits. Work posted during the grace window still runs; work
//! posted afterwards, or left in the queue when the loop exits, is dropped.

use crate::config::ActorConfig;
use crate::diagnostics::{
    install_panic_capture, panic_message, take_panic_stack, ErrorReport, GatewayErrorChannel, WorkOrigin,
};
use crate::entity::{ActorRef, Entity};
use crate::error::ActorError;
use crate::message::{AoiInfo, Delivery, OutboundMessage};
use crate::types::{current_timestamp, EntityId};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// The logic state an actor drives.
///
/// Implementors own whatever mutable state the entity needs; the actor hands
/// out `&mut self` to exactly one unit of work at a time.
pub trait EntityBehavior: Send + 'static {
    /// The shared entity this behavior animates.
    fn entity(&self) -> &Arc<Entity>;

    /// Periodic game-logic hook, called after dirty properties are flushed.
    fn on_tick(&mut self) {}

    /// Persists dirty properties. Called at most once per tick, only while the
    /// entity's dirty flag is set.
    fn flush_dirty_props(&mut self) {}

    /// A broadcast routed to this entity.
    fn on_client_message(&mut self, from: EntityId, message: OutboundMessage) {
        let _ = (from, message);
    }

    /// Enter/leave changes for this watcher; never called with an empty batch.
    fn on_aoi_update(&mut self, batch: Vec<AoiInfo>) {
        let _ = batch;
    }

    /// Runs once after the loop has terminated.
    fn on_closed(&mut self) {}

    /// Dispatches a [`Delivery`] to the matching hook.
    fn on_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Client { from, message } => self.on_client_message(from, message),
            Delivery::Aoi(batch) => {
                if !batch.is_empty() {
                    self.on_aoi_update(batch);
                }
            }
        }
    }
}

type Job<B> = Box<dyn FnOnce(&mut B) + Send>;

/// Runtime flags shared between the loop and its handles.
#[derive(Debug)]
struct ActorShared {
    entity_id: EntityId,
    running: AtomicBool,
    close_requested: AtomicBool,
    closed: AtomicBool,
    close_notify: Notify,
    last_tick: AtomicU64,
    close_grace: Duration,
}

impl ActorShared {
    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_notify.notify_one();
    }
}

/// Cloneable handle used to post work to an actor from any thread.
pub struct ActorHandle<B> {
    sender: mpsc::UnboundedSender<Job<B>>,
    shared: Arc<ActorShared>,
}

impl<B> Clone for ActorHandle<B> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<B> std::fmt::Debug for ActorHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("entity_id", &self.shared.entity_id)
            .field("running", &self.shared.running.load(Ordering::Acquire))
            .field("closed", &self.shared.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<B: Send + 'static> ActorHandle<B> {
    /// Id of the entity this actor animates.
    pub fn entity_id(&self) -> EntityId {
        self.shared.entity_id
    }

    /// Enqueues `f` for serial execution on the actor and returns immediately.
    ///
    /// Safe to call from any thread or task. Calls from one caller run in the
    /// order they were posted.
    ///
    /// # Arguments
    ///
    /// * `f` - Work to run with exclusive access to the behavior
    ///
    /// # Returns
    ///
    /// `false` when the actor has terminated; the action is discarded.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use space_actor_system::{ActorHandle, EntityBehavior};
    /// # fn example<B: EntityBehavior>(handle: &ActorHandle<B>) {
    /// let accepted = handle.post_async(|behavior: &mut B| behavior.entity().mark_dirty());
    /// if !accepted {
    ///     // The actor has already shut down.
    /// }
    /// # }
    /// ```
    pub fn post_async<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut B) + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            debug!("Actor {} is closed, discarding posted call", self.shared.entity_id);
            return false;
        }
        self.sender.send(Box::new(f)).is_ok()
    }

    /// Schedules the actor to stop after the grace period. Idempotent.
    pub fn request_close(&self) {
        if self.shared.close_requested.swap(true, Ordering::AcqRel) {
            return;
        }

        let shared = self.shared.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(
                    "⏳ Actor {} closing in {:?}",
                    shared.entity_id, shared.close_grace
                );
                runtime.spawn(async move {
                    tokio::time::sleep(shared.close_grace).await;
                    shared.mark_closed();
                });
            }
            Err(_) => {
                warn!(
                    "No runtime available for actor {} grace period, closing immediately",
                    shared.entity_id
                );
                shared.mark_closed();
            }
        }
    }

    /// Whether [`ActorHandle::request_close`] has been called.
    pub fn is_close_requested(&self) -> bool {
        self.shared.close_requested.load(Ordering::Acquire)
    }

    /// True from a successful [`EntityActor::run`] until the loop has run
    /// `on_closed` and exited.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether the grace period has expired. Posts are rejected from then on.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Unix milliseconds of the last completed tick, 0 before the first one.
    pub fn last_tick(&self) -> u64 {
        self.shared.last_tick.load(Ordering::Acquire)
    }
}

impl<B: EntityBehavior> ActorRef for ActorHandle<B> {
    fn deliver(&self, delivery: Delivery) -> bool {
        self.post_async(move |behavior: &mut B| behavior.on_delivery(delivery))
    }

    fn request_close(&self) {
        ActorHandle::request_close(self)
    }

    fn is_closed(&self) -> bool {
        ActorHandle::is_closed(self)
    }
}

/// An actor that has been built but not started.
///
/// [`EntityActor::run`] consumes the actor, so a given actor can only ever be
/// started once; starting a second actor for the same entity is rejected.
pub struct EntityActor<B: EntityBehavior> {
    behavior: B,
    receiver: mpsc::UnboundedReceiver<Job<B>>,
    handle: ActorHandle<B>,
    config: ActorConfig,
    error_channel: Option<Arc<dyn GatewayErrorChannel>>,
}

impl<B: EntityBehavior> EntityActor<B> {
    /// Builds the actor and its mailbox. Nothing runs until
    /// [`EntityActor::run`]; calls posted before that are queued.
    pub fn new(behavior: B, config: ActorConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(ActorShared {
            entity_id: behavior.entity().id(),
            running: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            last_tick: AtomicU64::new(0),
            close_grace: config.close_grace(),
        });

        Self {
            behavior,
            receiver,
            handle: ActorHandle { sender, shared },
            config,
            error_channel: None,
        }
    }

    /// Sets the channel used for debug failure reports.
    pub fn with_error_channel(mut self, channel: Arc<dyn GatewayErrorChannel>) -> Self {
        self.error_channel = Some(channel);
        self
    }

    /// A handle for posting work, usable before and after `run`.
    pub fn handle(&self) -> ActorHandle<B> {
        self.handle.clone()
    }

    /// Binds the actor to its entity and spawns the loop on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`ActorError::Config`] if the settings fail validation, checked before
    /// the entity is touched. [`ActorError::AlreadyRunning`] if the entity
    /// already has an actor.
    pub fn run(self) -> Result<JoinHandle<()>, ActorError> {
        self.config.validate()?;
        let entity = self.behavior.entity().clone();
        let handle: Arc<dyn ActorRef> = Arc::new(self.handle.clone());
        if !entity.attach_actor(handle) {
            return Err(ActorError::AlreadyRunning(entity.id()));
        }

        install_panic_capture();
        self.handle.shared.running.store(true, Ordering::Release);
        Ok(tokio::spawn(self.run_loop()))
    }

    async fn run_loop(mut self) {
        let shared = self.handle.shared.clone();
        let entity_id = shared.entity_id;

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; ticks start one period in.
        ticker.tick().await;

        debug!("🎬 Actor loop started for entity {}", entity_id);

        while !shared.closed.load(Ordering::Acquire) {
            tokio::select! {
                _ = shared.close_notify.notified() => {}
                _ = ticker.tick() => {
                    self.supervise(WorkOrigin::Tick, run_tick::<B>);
                    shared.last_tick.store(current_timestamp(), Ordering::Release);
                }
                job = self.receiver.recv() => match job {
                    Some(job) => self.supervise(WorkOrigin::Call, job),
                    None => break,
                },
            }
        }

        shared.closed.store(true, Ordering::Release);
        self.receiver.close();
        let mut discarded = 0usize;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Actor {} discarded {} queued call(s) on close", entity_id, discarded);
        }

        self.supervise(WorkOrigin::Shutdown, |behavior: &mut B| behavior.on_closed());
        shared.running.store(false, Ordering::Release);
        debug!("🛑 Actor loop ended for entity {}", entity_id);
    }

    /// Runs one unit of work inside an error boundary.
    fn supervise<F>(&mut self, origin: WorkOrigin, work: F)
    where
        F: FnOnce(&mut B),
    {
        let behavior = &mut self.behavior;
        let Err(payload) = catch_unwind(AssertUnwindSafe(|| work(behavior))) else {
            return;
        };

        let message = panic_message(payload.as_ref());
        let stack = take_panic_stack();
        let entity_id = self.handle.shared.entity_id;
        error!(
            "💥 Actor {} recovered from panic during {}: {}\n{}",
            entity_id, origin, message, stack
        );

        if self.config.debug {
            if let Some(channel) = &self.error_channel {
                let channel = channel.clone();
                let report = ErrorReport::new(entity_id, origin, message, stack);
                tokio::spawn(async move {
                    channel.server_error(report).await;
                });
            }
        }
    }
}

fn run_tick<B: EntityBehavior>(behavior: &mut B) {
    if behavior.entity().take_dirty() {
        behavior.flush_dirty_props();
    }
    behavior.on_tick();
}
