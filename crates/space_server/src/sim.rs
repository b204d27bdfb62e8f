//! Simulated population for the server: wandering NPCs plus one spectator
//! player parked at the origin whose client session is drained in-process.

use crate::config::SimulationSettings;
use serde::Serialize;
use space_actor_system::{
    ActorHandle, AoiInfo, Cell, CapabilitySet, ChannelSession, ClientBroadcaster, DirectNavigator, Entity,
    EntityBehavior, EntityDirectory, EntityRegistry, GateUser, GateUserBehavior, GateUserHandle, Mover, Navigator,
    UserLogic, Vec3,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Ticks between NPC emotes.
const EMOTE_EVERY_TICKS: u64 = 100;

const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

#[derive(Debug, Default)]
struct Counters {
    aoi_events: AtomicU64,
    emotes: AtomicU64,
    flushes: AtomicU64,
    frames: AtomicU64,
    spectator_visible: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub npcs: usize,
    pub aoi_events: u64,
    pub emotes: u64,
    pub flushes: u64,
    pub frames_to_spectator: u64,
    pub visible_to_spectator: u64,
}

/// Deterministic scatter of points over a disc.
fn destination(index: u64, leg: u64, arena_radius: f64) -> Vec3 {
    let n = (index * 7919 + leg * 104_729) as f64;
    let angle = n * GOLDEN_ANGLE;
    let radius = arena_radius * (n * 0.618_033_988_749_895).fract().sqrt();
    Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
}

/// NPC that walks between destinations and waves at whoever watches it.
pub struct Wanderer {
    entity: Arc<Entity>,
    mover: Mover,
    index: u64,
    leg: u64,
    ticks: u64,
    visible: usize,
    arena_radius: f64,
    tick: Duration,
    counters: Arc<Counters>,
}

impl Wanderer {
    fn pick_next_leg(&mut self) {
        self.leg += 1;
        let target = destination(self.index, self.leg, self.arena_radius);
        if !self.mover.move_to(target) {
            warn!("NPC {} found no path to {:?}", self.entity.id(), target);
        }
    }
}

impl EntityBehavior for Wanderer {
    fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    fn on_tick(&mut self) {
        self.ticks += 1;
        self.mover.advance(self.tick);
        if !self.mover.is_moving() {
            self.pick_next_leg();
        }

        if self.ticks % EMOTE_EVERY_TICKS == 0 && self.visible > 0 {
            let reached = self
                .entity
                .cast_rpc_to_all_client_except_me("Emote", vec![serde_json::json!("wave")]);
            self.counters.emotes.fetch_add(1, Ordering::Relaxed);
            trace!("NPC {} waved at {} watcher(s)", self.entity.id(), reached);
        }
    }

    fn flush_dirty_props(&mut self) {
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn on_aoi_update(&mut self, batch: Vec<AoiInfo>) {
        for info in &batch {
            if info.is_enter {
                self.visible += 1;
            } else {
                self.visible = self.visible.saturating_sub(1);
            }
        }
        self.counters.aoi_events.fetch_add(batch.len() as u64, Ordering::Relaxed);
    }
}

/// Player logic of the spectator: log what comes and goes.
pub struct SpectatorLogic {
    counters: Arc<Counters>,
}

impl UserLogic for SpectatorLogic {
    fn on_aoi_update(&mut self, user: &mut GateUser, batch: Vec<AoiInfo>) {
        for info in &batch {
            if info.is_enter {
                self.counters.spectator_visible.fetch_add(1, Ordering::Relaxed);
                debug!("👀 Spectator {} sees {}", user.id(), info.entity_id());
            } else {
                self.counters.spectator_visible.fetch_sub(1, Ordering::Relaxed);
                debug!("🙈 Spectator {} lost {}", user.id(), info.entity_id());
            }
        }
        self.counters.aoi_events.fetch_add(batch.len() as u64, Ordering::Relaxed);
    }
}

pub struct Simulation {
    registry: Arc<EntityRegistry>,
    cell: Arc<Cell>,
    navigator: Arc<DirectNavigator>,
    npcs: Vec<ActorHandle<Wanderer>>,
    spectator: GateUserHandle<SpectatorLogic>,
    frames_task: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl Simulation {
    /// Creates the cell and spawns the spectator and every NPC.
    pub fn start(registry: Arc<EntityRegistry>, settings: &SimulationSettings) -> anyhow::Result<Self> {
        let navigator = Arc::new(DirectNavigator::new());
        if !navigator.load_map(&settings.map_path) {
            anyhow::bail!("failed to load navigation map {}", settings.map_path);
        }

        let cell = registry.create_cell()?;
        let counters = Arc::new(Counters::default());
        let tick = registry.actor_config().tick_interval();

        // Spectator player with an in-process session.
        let (session, mut frames) = ChannelSession::new();
        let spectator_entity = Entity::new(CapabilitySet::player(), settings.spectator_radius);
        let directory: Arc<dyn EntityDirectory> = registry.clone();
        let user = GateUser::new(spectator_entity.clone(), Box::new(session), directory);
        let spectator = registry.spawn(GateUserBehavior::new(
            user,
            SpectatorLogic {
                counters: counters.clone(),
            },
        ))?;
        cell.add_entity(spectator_entity)?;

        let frame_counters = counters.clone();
        let frames_task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                frame_counters.frames.fetch_add(1, Ordering::Relaxed);
                trace!("Spectator frame: {}", String::from_utf8_lossy(&frame));
            }
        });

        let mut npcs = Vec::with_capacity(settings.npc_count);
        for index in 0..settings.npc_count as u64 {
            let entity = Entity::new(CapabilitySet::player(), settings.npc_aoi_radius);
            entity.set_position(destination(index, 0, settings.arena_radius));

            let mut mover = Mover::new(entity.clone(), navigator.clone());
            mover.set_speed(settings.npc_speed);
            let handle = registry.spawn(Wanderer {
                entity: entity.clone(),
                mover,
                index,
                leg: 0,
                ticks: 0,
                visible: 0,
                arena_radius: settings.arena_radius,
                tick,
                counters: counters.clone(),
            })?;
            cell.add_entity(entity)?;
            npcs.push(handle);
        }

        info!(
            "🎮 Simulation started: {} NPC(s) in cell {} (arena radius {:.0})",
            npcs.len(),
            cell.entity_id(),
            settings.arena_radius
        );

        Ok(Self {
            registry,
            cell,
            navigator,
            npcs,
            spectator,
            frames_task,
            counters,
        })
    }

    pub fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats {
            npcs: self.npcs.len(),
            aoi_events: self.counters.aoi_events.load(Ordering::Relaxed),
            emotes: self.counters.emotes.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            frames_to_spectator: self.counters.frames.load(Ordering::Relaxed),
            visible_to_spectator: self.counters.spectator_visible.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        let aoi = self.cell.aoi_stats();
        info!(
            "📊 Space Health - {} members | {} AOI updates | {} enters / {} leaves | {} emotes | spectator sees {}",
            self.cell.len(),
            aoi.updates,
            aoi.enter_events,
            aoi.leave_events,
            stats.emotes,
            stats.visible_to_spectator
        );
    }

    /// Logs the spectator out and shuts every actor down.
    ///
    /// Returns the counters as they stand once every loop has finished and
    /// the spectator's frame stream has been drained.
    pub async fn stop(mut self) -> SimulationStats {
        self.spectator.async_logout();
        let stopped = self.registry.shutdown().await;
        self.navigator.unload_map();
        if let Err(e) = (&mut self.frames_task).await {
            warn!("Spectator frame task ended abnormally: {}", e);
        }
        info!("✅ Simulation stopped ({} actor loop(s))", stopped);
        self.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use space_actor_system::{ActorConfig, CellConfig};
    use tokio::time::sleep;

    #[test]
    fn test_destinations_stay_in_arena() {
        for index in 0..50 {
            for leg in 0..20 {
                let p = destination(index, leg, 100.0);
                assert!(p.length() <= 100.0 + 1e-9);
                assert_eq!(p.y, 0.0);
            }
        }
        assert_ne!(destination(1, 1, 100.0), destination(1, 2, 100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_runs_and_stops() {
        let registry = Arc::new(EntityRegistry::new(ActorConfig::default(), CellConfig::default()));
        let settings = SimulationSettings {
            npc_count: 6,
            arena_radius: 20.0,
            spectator_radius: 100.0,
            ..SimulationSettings::default()
        };

        let simulation = Simulation::start(registry.clone(), &settings).unwrap();
        assert_eq!(simulation.cell().len(), 7);
        assert_eq!(registry.len(), 7);

        sleep(Duration::from_secs(6)).await;
        let running = simulation.stats();
        assert_eq!(running.npcs, 6);
        assert_eq!(running.visible_to_spectator, 6);
        assert!(running.aoi_events >= 6);
        assert!(running.flushes > 0);
        assert!(running.emotes > 0);
        assert!(running.frames_to_spectator > 0);

        let stopped = simulation.stop().await;
        assert_eq!(stopped.npcs, 6);
        assert!(stopped.frames_to_spectator >= running.frames_to_spectator);
        assert!(registry.is_empty());
        assert_eq!(registry.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_map_path_fails() {
        let registry = Arc::new(EntityRegistry::new(ActorConfig::default(), CellConfig::default()));
        let settings = SimulationSettings {
            map_path: String::new(),
            ..SimulationSettings::default()
        };
        assert!(Simulation::start(registry, &settings).is_err());
    }
}
