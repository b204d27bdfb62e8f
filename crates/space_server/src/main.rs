//! Main application entry point for the space server.
//!
//! Loads configuration, sets up logging, hosts a simulated space on the
//! entity actor runtime and shuts everything down on SIGINT/SIGTERM.

mod cli;
mod config;
mod logging;
mod signals;
mod sim;

use cli::CliArgs;
use config::AppConfig;
use sim::Simulation;
use space_actor_system::{ChannelErrorSink, EntityRegistry};
use std::sync::Arc;
use tracing::{error, info};

/// Main application struct.
pub struct Application {
    config: AppConfig,
    registry: Arc<EntityRegistry>,
    error_reports: tokio::sync::mpsc::UnboundedReceiver<space_actor_system::ErrorReport>,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if args.debug {
            config.runtime.debug = true;
        }
        if let Some(npcs) = args.npcs {
            config.simulation.npc_count = npcs;
        }

        if let Err(e) = config.validate() {
            anyhow::bail!("Configuration validation failed: {}", e);
        }

        logging::setup_logging(&config.logging)?;

        let (sink, error_reports) = ChannelErrorSink::new();
        let registry = Arc::new(
            EntityRegistry::new(config.runtime.clone(), config.space.clone()).with_error_channel(Arc::new(sink)),
        );

        info!("🚀 Space Server v{}", env!("CARGO_PKG_VERSION"));
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self {
            config,
            registry,
            error_reports,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            config,
            registry,
            mut error_reports,
        } = self;

        info!("📋 Configuration Summary:");
        info!(
            "  ⏱️ Actor tick: {}ms | AOI tick: {}ms | close grace: {}ms",
            config.runtime.tick_interval_ms, config.space.aoi_tick_interval_ms, config.runtime.close_grace_ms
        );
        info!(
            "  👥 NPCs: {} | arena radius: {:.0} | debug reports: {}",
            config.simulation.npc_count, config.simulation.arena_radius, config.runtime.debug
        );

        let simulation = Simulation::start(registry.clone(), &config.simulation)?;

        // Debug reports stand in for the gateway's ServerError endpoint.
        let reports_handle = tokio::spawn(async move {
            while let Some(report) = error_reports.recv().await {
                error!(
                    "🐞 ServerError from entity {} ({}): {}\n{}",
                    report.entity_id, report.origin, report.error, report.stack
                );
            }
        });

        let stats_interval = std::time::Duration::from_secs(config.simulation.stats_interval_secs);
        let mut ticker = tokio::time::interval(stats_interval);
        ticker.tick().await;

        info!("✅ Space Server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let shutdown = signals::wait_for_shutdown_signal();
        tokio::pin!(shutdown);
        let received = loop {
            tokio::select! {
                result = &mut shutdown => break result?,
                _ = ticker.tick() => simulation.log_stats(),
            }
        };

        info!("🛑 {} received, initiating graceful shutdown...", received);
        let final_stats = simulation.stop().await;
        reports_handle.abort();

        info!("📊 Final Statistics:");
        info!("  - NPCs simulated: {}", final_stats.npcs);
        info!("  - AOI events delivered: {}", final_stats.aoi_events);
        info!("  - Emotes broadcast: {}", final_stats.emotes);
        info!("  - Property flushes: {}", final_stats.flushes);
        info!("  - Frames sent to spectator: {}", final_stats.frames_to_spectator);
        info!("👋 Space Server shutdown complete");

        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
