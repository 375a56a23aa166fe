//! Command bridge: exposes application-layer operations to the UI.
//!
//! Every command function lives here and delegates to the shared
//! [`AppState`].  The presentation layer is the only consumer of this module;
//! it must NOT be imported by the Application or Domain layers.
//!
//! # Data Transfer Objects (DTOs)
//!
//! The backend uses internal types (`ClientRecord`, `Uuid`, `IpAddr`,
//! `ConnectionState`) whose representation is free to change.  DTOs are
//! plain structs (`ClientDto`, `ClientLayoutDto`, `NetworkConfigDto`) that:
//!
//! - Contain only JSON-friendly fields (`String`, `f32`, `u32`, ...).
//! - Derive `Serialize`/`Deserialize` so the UI bridge can convert them
//!   to and from JSON.
//!
//! `ConnectionState` is mapped to its wire string by [`state_label`], an
//! exhaustive `match`, so renaming a variant can never silently change what
//! the UI receives.
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`.
//! This ensures every command response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.
//! The frontend can always safely access `result.success` without a
//! try/catch around the call.
//!
//! # Lock order
//!
//! Commands that need several resources take them in this order:
//! connection manager, registry, layout, router, config.  The connection
//! manager takes the registry lock itself, so it is never locked while a
//! registry guard is held.

use std::path::PathBuf;
use std::sync::Arc;

use kvm_core::{ClientId, ConnectionState, LayoutEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

use crate::application::{
    liveness::LivenessConfig,
    manage_clients::{ClientRecord, ClientRegistry},
    network_settings::{NetworkConfigError, NetworkConfigManager, NetworkSettings},
    route_input::InputRouter,
    update_layout::LayoutEngine,
};
use crate::infrastructure::{
    network::connection_manager::{ConnectionManager, ManagerEvent, PairingPolicy},
    storage::config::{save_config_to, AppConfig, ClientEntry, ConfigError, NetworkConfig},
};

// ── Shared application state ──────────────────────────────────────────────────

/// Application state shared by every command and background task.
///
/// Each resource sits behind its own async lock so that probe-driven
/// registry updates, layout edits and the UI's polling never contend on a
/// single global lock.
///
/// # Why async locks (not std::sync)?
///
/// `std::sync::Mutex` blocks the OS thread while waiting to acquire the lock.
/// In an async context this is problematic because blocking a thread prevents
/// other async tasks from running.  `tokio::sync` locks suspend the task
/// instead of blocking the thread.
pub struct AppState {
    /// The in-memory registry of all known client machines.
    pub registry: Arc<RwLock<ClientRegistry>>,
    /// The committed virtual screen layout.
    pub layout: RwLock<LayoutEngine>,
    /// Active and staged network settings.
    pub network: RwLock<NetworkConfigManager>,
    /// Sharing flag and current input target.
    pub router: RwLock<InputRouter>,
    /// Handshake and pairing driver.
    pub connections: Mutex<ConnectionManager>,
    /// Probe and timeout settings for the background loops.
    pub liveness: LivenessConfig,
    /// The configuration as last loaded or saved.
    pub config: Mutex<AppConfig>,
    /// Where configuration changes are written.  `None` keeps them in memory.
    pub config_path: Option<PathBuf>,
}

impl AppState {
    /// Builds the application state from a loaded configuration.
    ///
    /// - `[[clients]]` entries seed the registry as `Disconnected`; trusted
    ///   ones skip pairing on their next handshake.
    /// - `[layout]` entries for unknown clients are skipped with a warning;
    ///   a stored layout that fails validation is dropped.
    /// - `[network]` seeds both the active and the staged generation.
    ///
    /// Returns the state and the connection manager's event receiver.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkConfigError`] if the `[network]` section is invalid.
    pub fn from_config(
        config: AppConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ManagerEvent>), NetworkConfigError> {
        let settings = config.network.to_settings()?;

        let mut registry = ClientRegistry::new();
        for client in &config.clients {
            registry.register_known(client.client_id, client.name.clone());
        }

        let mut layout = LayoutEngine::new(config.layout.master_screen_width, config.layout.master_screen_height);
        let entries: Vec<LayoutEntry> = config
            .layout
            .clients
            .iter()
            .filter(|e| {
                let known = registry.contains(e.client_id);
                if !known {
                    warn!(client_id = %e.client_id, "skipping layout entry for unknown client");
                }
                known
            })
            .map(|e| LayoutEntry::from(*e))
            .collect();
        if let Err(e) = layout.replace_all(entries, &registry) {
            warn!(error = %e, "stored layout is invalid, starting with the master screen only");
        }

        let registry = Arc::new(RwLock::new(registry));
        let policy = PairingPolicy::from(&config.pairing);
        let liveness = LivenessConfig::from(&config.liveness).with_pairing_timeout(policy.pin_expiry);
        let (mut connections, events) = ConnectionManager::new(Arc::clone(&registry), policy);
        for client in config.clients.iter().filter(|c| c.trusted) {
            connections.trust(client.client_id);
        }

        let state = Arc::new(Self {
            registry,
            layout: RwLock::new(layout),
            network: RwLock::new(NetworkConfigManager::new(settings)),
            router: RwLock::new(InputRouter::new()),
            connections: Mutex::new(connections),
            liveness,
            config: Mutex::new(config),
            config_path,
        });
        Ok((state, events))
    }

    /// Applies `mutate` to the stored configuration and writes it to
    /// `config_path`, if there is one.
    async fn update_config<F>(&self, mutate: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.lock().await;
        mutate(&mut config);
        match &self.config_path {
            Some(path) => save_config_to(&config, path),
            None => Ok(()),
        }
    }
}

// ── Data Transfer Objects (Presentation layer) ────────────────────────────────

/// DTO representing one known client returned to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientDto {
    pub client_id: String,
    pub name: String,
    pub connection_state: String,
    pub latency_ms: f32,
    pub events_per_second: u32,
}

impl From<&ClientRecord> for ClientDto {
    fn from(r: &ClientRecord) -> Self {
        Self {
            client_id: r.id.to_string(),
            name: r.name.clone(),
            connection_state: state_label(r.connection_state).to_string(),
            latency_ms: r.latency_ms,
            events_per_second: r.events_per_second,
        }
    }
}

/// DTO for a single client layout entry exchanged with the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientLayoutDto {
    pub client_id: String,
    pub x_offset: i32,
    pub y_offset: i32,
    pub width: u32,
    pub height: u32,
}

impl From<&LayoutEntry> for ClientLayoutDto {
    fn from(e: &LayoutEntry) -> Self {
        Self {
            client_id: e.client_id.to_string(),
            x_offset: e.x_offset,
            y_offset: e.y_offset,
            width: e.width,
            height: e.height,
        }
    }
}

impl TryFrom<&ClientLayoutDto> for LayoutEntry {
    type Error = String;

    fn try_from(dto: &ClientLayoutDto) -> Result<Self, Self::Error> {
        let client_id = dto
            .client_id
            .parse::<ClientId>()
            .map_err(|e| format!("invalid client_id UUID {:?}: {e}", dto.client_id))?;
        Ok(LayoutEntry {
            client_id,
            x_offset: dto.x_offset,
            y_offset: dto.y_offset,
            width: dto.width,
            height: dto.height,
        })
    }
}

/// DTO for one generation of network settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfigDto {
    pub control_port: u16,
    pub input_port: u16,
    pub discovery_port: u16,
    pub bind_address: String,
}

impl From<NetworkSettings> for NetworkConfigDto {
    fn from(s: NetworkSettings) -> Self {
        Self {
            control_port: s.control_port,
            input_port: s.input_port,
            discovery_port: s.discovery_port,
            bind_address: s.bind_address.to_string(),
        }
    }
}

/// Result of staging new network settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkUpdateDto {
    /// The new settings only apply after the master restarts.
    pub restart_required: bool,
    pub config: NetworkConfigDto,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// The string the UI receives for each connection state.
pub fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "Disconnected",
        ConnectionState::Connecting => "Connecting",
        ConnectionState::Connected => "Connected",
        ConnectionState::Pairing => "Pairing",
        ConnectionState::Active => "Active",
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns every known client, ordered by client ID.
///
/// # Example (frontend)
/// ```ts
/// const clients = await invoke<CommandResult<ClientDto[]>>('get_clients');
/// ```
pub async fn get_clients(state: Arc<AppState>) -> CommandResult<Vec<ClientDto>> {
    let snapshot = state.registry.read().await.snapshot();
    CommandResult::ok(snapshot.iter().map(ClientDto::from).collect())
}

/// Returns the committed layout entries.
///
/// Fails if the layout references a client the registry no longer knows.
pub async fn get_layout(state: Arc<AppState>) -> CommandResult<Vec<ClientLayoutDto>> {
    let registry = state.registry.read().await;
    let layout = state.layout.read().await;
    if let Err(e) = layout.verify_consistency(&registry) {
        warn!(error = %e, "layout out of sync with registry");
        return CommandResult::err(e.to_string());
    }
    CommandResult::ok(layout.get().iter().map(ClientLayoutDto::from).collect())
}

/// Validates and applies a complete layout from the UI.
///
/// On success the layout and the clients it references are written to the
/// configuration file.
pub async fn update_layout(state: Arc<AppState>, clients: Vec<ClientLayoutDto>) -> CommandResult<()> {
    let candidate = match clients.iter().map(LayoutEntry::try_from).collect::<Result<Vec<_>, _>>() {
        Ok(v) => v,
        Err(e) => return CommandResult::err(e),
    };

    {
        let registry = state.registry.read().await;
        let mut layout = state.layout.write().await;
        if let Err(e) = layout.replace_all(candidate, &registry) {
            return CommandResult::err(e.to_string());
        }
    }

    match persist_known_clients(&state).await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(format!("layout applied but not saved: {e}")),
    }
}

/// Returns the staged network settings: what will apply after a restart.
pub async fn get_network_config(state: Arc<AppState>) -> CommandResult<NetworkConfigDto> {
    let staged = state.network.read().await.get_staged();
    CommandResult::ok(staged.into())
}

/// Returns the network settings the running listeners use.
pub async fn get_active_network_config(state: Arc<AppState>) -> CommandResult<NetworkConfigDto> {
    let active = state.network.read().await.get_active();
    CommandResult::ok(active.into())
}

/// Validates and stages new network settings.
///
/// Nothing is rebound: the response says whether a restart is required.
pub async fn update_network_config(state: Arc<AppState>, network: NetworkConfigDto) -> CommandResult<NetworkUpdateDto> {
    let candidate = match NetworkSettings::from_parts(
        network.control_port,
        network.input_port,
        network.discovery_port,
        &network.bind_address,
    ) {
        Ok(s) => s,
        Err(e) => return CommandResult::err(e.to_string()),
    };

    let restart_required = match state.network.write().await.stage(candidate) {
        Ok(r) => r,
        Err(e) => return CommandResult::err(e.to_string()),
    };

    if let Err(e) = state
        .update_config(|cfg| cfg.network = NetworkConfig::from_settings(&candidate))
        .await
    {
        return CommandResult::err(format!("settings staged but not saved: {e}"));
    }

    CommandResult::ok(NetworkUpdateDto {
        restart_required,
        config: candidate.into(),
    })
}

/// Returns whether input sharing is on.
///
/// Waits for the router lock; routing holds it only for the duration of a
/// single event.
pub async fn get_sharing_enabled(state: Arc<AppState>) -> CommandResult<bool> {
    CommandResult::ok(state.router.read().await.is_sharing_enabled())
}

/// Turns input sharing on or off.  Returns the new value.
pub async fn set_sharing_enabled(state: Arc<AppState>, enabled: bool) -> CommandResult<bool> {
    state.router.write().await.set_sharing_enabled(enabled);
    CommandResult::ok(enabled)
}

/// Removes a client from every table, whatever its state.
pub async fn forget_client(state: Arc<AppState>, client_id: String) -> CommandResult<()> {
    let id = match client_id.parse::<ClientId>() {
        Ok(id) => id,
        Err(e) => return CommandResult::err(format!("invalid client_id UUID {client_id:?}: {e}")),
    };

    state.connections.lock().await.forget(id);
    {
        let mut registry = state.registry.write().await;
        if let Err(e) = registry.forget(id) {
            return CommandResult::err(e.to_string());
        }
        state.layout.write().await.remove_client(id);
        state.router.write().await.forget_client(id);
    }
    info!(client_id = %id, "client forgotten by operator");

    match persist_known_clients(&state).await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(format!("client forgotten but not saved: {e}")),
    }
}

/// Rewrites the `[[clients]]` and `[layout]` sections from live state.
///
/// A client is persisted when it is trusted or has a layout entry.
///
/// # Errors
///
/// Returns the [`ConfigError`] of the write.
pub async fn persist_known_clients(state: &AppState) -> Result<(), ConfigError> {
    let trusted = state.connections.lock().await.trusted_clients();
    let (clients, entries) = {
        let registry = state.registry.read().await;
        let layout = state.layout.read().await;
        let entries = layout.get();
        let clients: Vec<ClientEntry> = registry
            .snapshot()
            .into_iter()
            .filter(|r| trusted.contains(&r.id) || layout.layout().entry(r.id).is_some())
            .map(|r| ClientEntry {
                client_id: r.id,
                trusted: trusted.contains(&r.id),
                name: r.name,
            })
            .collect();
        (clients, entries)
    };

    state
        .update_config(|cfg| {
            cfg.clients = clients;
            cfg.layout.clients = entries.into_iter().map(Into::into).collect();
        })
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::config::{load_config_from, ClientLayoutEntry};
    use kvm_core::ConnectionEvent;
    use uuid::Uuid;

    /// Creates an AppState from defaults that never touches the disk.
    fn make_state() -> Arc<AppState> {
        AppState::from_config(AppConfig::default(), None).unwrap().0
    }

    async fn register(state: &AppState, name: &str) -> ClientId {
        let id = Uuid::new_v4();
        state.registry.write().await.upsert(id, name);
        id
    }

    fn layout_dto(id: ClientId, x: i32, y: i32, w: u32, h: u32) -> ClientLayoutDto {
        ClientLayoutDto {
            client_id: id.to_string(),
            x_offset: x,
            y_offset: y,
            width: w,
            height: h,
        }
    }

    #[tokio::test]
    async fn test_get_clients_returns_empty_list_initially() {
        // Arrange
        let state = make_state();

        // Act
        let result = get_clients(state).await;

        // Assert
        assert!(result.success);
        assert_eq!(result.data.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_get_clients_reports_state_as_wire_string() {
        let state = make_state();
        let id = register(&state, "dev-linux").await;
        state
            .registry
            .write()
            .await
            .transition(id, ConnectionEvent::HelloAccepted)
            .unwrap();

        let clients = get_clients(state).await.data.unwrap();

        assert_eq!(clients[0].client_id, id.to_string());
        assert_eq!(clients[0].name, "dev-linux");
        assert_eq!(clients[0].connection_state, "Connected");
    }

    #[test]
    fn test_state_label_covers_every_state() {
        let labels: Vec<&str> = ConnectionState::ALL.iter().map(|s| state_label(*s)).collect();
        assert_eq!(labels, vec!["Disconnected", "Connecting", "Connected", "Pairing", "Active"]);
    }

    #[tokio::test]
    async fn test_get_layout_returns_empty_list_when_no_clients_configured() {
        let state = make_state();
        let result = get_layout(state).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_update_layout_fails_with_invalid_uuid() {
        // Arrange
        let state = make_state();
        let bad = vec![ClientLayoutDto {
            client_id: "not-a-uuid".to_string(),
            x_offset: 1920,
            y_offset: 0,
            width: 1920,
            height: 1080,
        }];

        // Act
        let result = update_layout(state, bad).await;

        // Assert
        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid client_id"));
    }

    #[tokio::test]
    async fn test_update_layout_rejects_unregistered_client() {
        let state = make_state();
        let result = update_layout(state, vec![layout_dto(Uuid::new_v4(), 1920, 0, 1920, 1080)]).await;
        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().contains("client not found"));
    }

    #[tokio::test]
    async fn test_update_layout_succeeds_for_registered_client() {
        // Arrange
        let state = make_state();
        let id = register(&state, "dev-linux").await;
        let clients = vec![layout_dto(id, 1920, 0, 1920, 1080)];

        // Act
        let result = update_layout(Arc::clone(&state), clients.clone()).await;

        // Assert
        assert!(result.success, "expected success, got error: {:?}", result.error);
        assert_eq!(get_layout(state).await.data.unwrap(), clients);
    }

    #[tokio::test]
    async fn test_get_layout_reports_orphaned_entry_as_error() {
        let state = make_state();
        let id = register(&state, "soon-gone").await;
        update_layout(Arc::clone(&state), vec![layout_dto(id, 1920, 0, 1920, 1080)]).await;

        // Bypass forget_client so the layout is not pruned.
        state.registry.write().await.forget(id).unwrap();

        let result = get_layout(state).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains(&id.to_string()));
    }

    #[tokio::test]
    async fn test_get_network_config_returns_default_ports() {
        let state = make_state();

        let dto = get_network_config(state).await.data.unwrap();

        assert_eq!(dto.control_port, 24800);
        assert_eq!(dto.input_port, 24801);
        assert_eq!(dto.discovery_port, 24802);
        assert_eq!(dto.bind_address, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_update_network_config_stages_without_changing_active() {
        // Arrange
        let state = make_state();
        let candidate = NetworkConfigDto {
            control_port: 25800,
            input_port: 25801,
            discovery_port: 25802,
            bind_address: "127.0.0.1".to_string(),
        };

        // Act
        let result = update_network_config(Arc::clone(&state), candidate.clone()).await;

        // Assert
        let update = result.data.unwrap();
        assert!(update.restart_required);
        assert_eq!(get_network_config(Arc::clone(&state)).await.data.unwrap(), candidate);
        assert_eq!(
            get_active_network_config(state).await.data.unwrap().control_port,
            24800
        );
    }

    #[tokio::test]
    async fn test_update_network_config_rejects_duplicate_ports() {
        let state = make_state();
        let candidate = NetworkConfigDto {
            control_port: 25800,
            input_port: 25800,
            discovery_port: 25802,
            bind_address: "0.0.0.0".to_string(),
        };

        let result = update_network_config(Arc::clone(&state), candidate).await;

        assert!(!result.success);
        assert_eq!(get_network_config(state).await.data.unwrap().control_port, 24800);
    }

    #[tokio::test]
    async fn test_update_network_config_writes_config_file() {
        let dir = std::env::temp_dir().join(format!("kvm_test_{}", Uuid::new_v4()));
        let path = dir.join("config.toml");
        let (state, _events) = AppState::from_config(AppConfig::default(), Some(path.clone())).unwrap();
        let candidate = NetworkConfigDto {
            control_port: 26800,
            input_port: 26801,
            discovery_port: 26802,
            bind_address: "0.0.0.0".to_string(),
        };

        assert!(update_network_config(state, candidate).await.success);

        let saved = load_config_from(&path).unwrap();
        assert_eq!(saved.network.control_port, 26800);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_get_sharing_enabled_returns_false_initially() {
        let state = make_state();
        assert_eq!(get_sharing_enabled(state).await.data, Some(false));
    }

    #[tokio::test]
    async fn test_set_sharing_enabled_is_visible_to_get() {
        let state = make_state();
        assert!(set_sharing_enabled(Arc::clone(&state), true).await.success);
        assert_eq!(get_sharing_enabled(state).await.data, Some(true));
    }

    #[tokio::test]
    async fn test_get_sharing_enabled_waits_out_a_busy_router() {
        // Arrange
        let state = make_state();
        set_sharing_enabled(Arc::clone(&state), true).await;
        let guard = state.router.write().await;

        // Act
        let pending = tokio::spawn(get_sharing_enabled(Arc::clone(&state)));
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        drop(guard);
        let result = pending.await.unwrap();

        // Assert
        assert_eq!(result.data, Some(true));
    }

    #[tokio::test]
    async fn test_forget_client_removes_record_and_layout_entry() {
        let state = make_state();
        let id = register(&state, "retired").await;
        update_layout(Arc::clone(&state), vec![layout_dto(id, 1920, 0, 1920, 1080)]).await;

        let result = forget_client(Arc::clone(&state), id.to_string()).await;

        assert!(result.success, "{:?}", result.error);
        assert!(get_clients(Arc::clone(&state)).await.data.unwrap().is_empty());
        assert!(get_layout(state).await.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forget_unknown_client_fails() {
        let state = make_state();
        let result = forget_client(state, Uuid::new_v4().to_string()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("client not found"));
    }

    #[tokio::test]
    async fn test_from_config_seeds_clients_layout_and_trust() {
        // Arrange
        let known = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let mut config = AppConfig::default();
        config.clients.push(ClientEntry {
            client_id: known,
            name: "office-mac".to_string(),
            trusted: true,
        });
        for id in [known, stranger] {
            config.layout.clients.push(ClientLayoutEntry {
                client_id: id,
                x_offset: if id == known { 1920 } else { -1920 },
                y_offset: 0,
                width: 1920,
                height: 1080,
            });
        }

        // Act
        let (state, _events) = AppState::from_config(config, None).unwrap();

        // Assert
        let clients = get_clients(Arc::clone(&state)).await.data.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].connection_state, "Disconnected");
        let layout = get_layout(Arc::clone(&state)).await.data.unwrap();
        assert_eq!(layout, vec![layout_dto(known, 1920, 0, 1920, 1080)]);
        assert!(state.connections.lock().await.is_trusted(known));
    }

    #[test]
    fn test_from_config_bounds_pairing_by_pin_expiry() {
        let mut config = AppConfig::default();
        config.pairing.pin_expiry_secs = 90;

        let (state, _events) = AppState::from_config(config, None).unwrap();

        assert_eq!(state.liveness.pairing_timeout, std::time::Duration::from_secs(90));
        assert_eq!(state.liveness.handshake_timeout, LivenessConfig::default().handshake_timeout);
    }

    #[test]
    fn test_from_config_rejects_invalid_network_section() {
        let mut config = AppConfig::default();
        config.network.control_port = 80;
        assert!(AppState::from_config(config, None).is_err());
    }

    #[test]
    fn test_command_result_ok_sets_success_true() {
        let r: CommandResult<i32> = CommandResult::ok(42);
        assert!(r.success);
        assert_eq!(r.data.unwrap(), 42);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_command_result_err_sets_success_false() {
        let r: CommandResult<i32> = CommandResult::err("something went wrong");
        assert!(!r.success);
        assert!(r.data.is_none());
        assert_eq!(r.error.unwrap(), "something went wrong");
    }
}
