//! KVM-Over-IP Master Application entry point.
//!
//! Loads the configuration, builds the shared [`AppState`], and starts the
//! background tasks that keep it current.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ AppState::from_config()  -- registry, layout, network settings, pairing
//!  └─ background tasks
//!       ├─ event pump        (pairing prompts, trust persistence)
//!       ├─ liveness loop     (probe rounds every probe_interval)
//!       ├─ probe writer      (drains the probe queue)
//!       └─ maintenance loop  (timeouts, session purge, telemetry flush)
//! ```
//!
//! Usage: `kvm-master [--config <path>]`

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

use kvm_master::application::liveness::{run_probe_round, run_sweep};
use kvm_master::infrastructure::network::connection_manager::ManagerEvent;
use kvm_master::infrastructure::network::probe_transport::ChannelProbeTransport;
use kvm_master::infrastructure::storage::config::{config_file_path, load_config_from};
use kvm_master::infrastructure::ui_bridge::{persist_known_clients, AppState};

const PROBE_QUEUE_CAPACITY: usize = 256;
const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(250);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// KVM-Over-IP master control core.
#[derive(Debug, Parser)]
#[command(name = "kvm-master", about = "KVM-Over-IP master: client registry, pairing and input routing", version)]
struct Cli {
    /// Configuration file to load and save.
    ///
    /// Defaults to `config.toml` in the platform configuration directory.
    #[arg(long, env = "KVM_MASTER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };
    let config = load_config_from(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    // Initialise structured logging.  `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.master.log_level)),
        )
        .init();

    info!(config = %config_path.display(), "KVM-Over-IP Master starting");

    let (state, mut events) =
        AppState::from_config(config, Some(config_path)).context("invalid [network] configuration")?;

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── Connection event pump ─────────────────────────────────────────────────
    let pump_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ManagerEvent::PairingRequested { client_id, pin, .. } => {
                    info!(%client_id, %pin, "pairing requested: enter this PIN on the client");
                }
                ManagerEvent::PairingCompleted { client_id } => {
                    info!(%client_id, "client paired");
                    if let Err(e) = persist_known_clients(&pump_state).await {
                        error!(error = %e, "failed to save paired client");
                    }
                }
                other => debug!(event = ?other, "connection event"),
            }
        }
    });

    // ── Liveness probing ──────────────────────────────────────────────────────
    let (transport, mut probe_rx) = ChannelProbeTransport::new(PROBE_QUEUE_CAPACITY);

    // Headless build: no control-channel writer is attached, so queued
    // probes are only traced.
    tokio::spawn(async move {
        while let Some(probe) = probe_rx.recv().await {
            trace!(client_id = %probe.client_id, seq = probe.seq, "probe queued");
        }
    });

    let probe_state = Arc::clone(&state);
    let probe_running = Arc::clone(&running);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(probe_state.liveness.probe_interval);
        while probe_running.load(Ordering::Relaxed) {
            ticker.tick().await;
            let report = run_probe_round(&probe_state.registry, &transport, &probe_state.liveness, Instant::now()).await;
            if !report.disconnected.is_empty() {
                info!(count = report.disconnected.len(), "clients lost to missed probes");
            }
        }
    });

    // ── Maintenance: timeouts, pairing sessions, telemetry ────────────────────
    let maint_state = Arc::clone(&state);
    let maint_running = Arc::clone(&running);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        while maint_running.load(Ordering::Relaxed) {
            ticker.tick().await;
            let now = Instant::now();

            let trusted = {
                let mut connections = maint_state.connections.lock().await;
                connections.purge_expired(now);
                connections.trusted_clients()
            };

            let outcome = run_sweep(&maint_state.registry, &maint_state.layout, &maint_state.liveness, now, |id| {
                trusted.contains(id)
            })
            .await;
            if !outcome.timed_out.is_empty() {
                let mut connections = maint_state.connections.lock().await;
                for client_id in &outcome.timed_out {
                    connections.abandon_pairing(*client_id);
                }
            }
            if !outcome.removed.is_empty() {
                if let Err(e) = persist_known_clients(&maint_state).await {
                    error!(error = %e, "failed to save configuration after removing absent clients");
                }
            }

            let mut registry = maint_state.registry.write().await;
            maint_state.router.write().await.flush_into(&mut registry);
        }
    });

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("KVM-Over-IP Master ready.  Press Ctrl-C to exit.");

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("KVM-Over-IP Master stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
