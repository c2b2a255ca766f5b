mod auth;
mod config;
mod dictionary;
mod game;
mod models;
mod persistence;
mod routes;
mod utils;
mod websocket;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::Result;
use axum::{routing::get, Router};
use config::Config;
use dashmap::DashMap;
use dictionary::Dictionary;
use game::Game;
use persistence::{FileSnapshotStore, SnapshotStore};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use websocket::messages::ServerMessage;

/// Grace period before removing disconnected players (seconds)
pub const PLAYER_DISCONNECT_GRACE_PERIOD: Duration = Duration::from_secs(60);
/// Grace period before removing empty lobbies (seconds)
pub const LOBBY_EMPTY_GRACE_PERIOD: Duration = Duration::from_secs(120);
/// Allowed characters for lobby codes - excludes I, O, 0, 1 for readability
pub const LOBBY_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Length of generated lobby codes
pub const LOBBY_CODE_LENGTH: usize = 6;

/// Connection state for a lobby player
#[derive(Debug, Clone)]
pub enum PlayerConnectionState {
    /// Player is actively connected with an open WebSocket
    Connected,
    /// Player's WebSocket dropped, waiting for reconnection within grace period.
    /// A seated player keeps their seat and the game waits for them.
    AwaitingReconnect { since: Instant },
}

/// Information about a lobby player
#[derive(Debug, Clone)]
pub struct LobbyPlayer {
    pub user_id: i64,
    pub username: String,
    pub tx: mpsc::Sender<ServerMessage>,
    pub connection_state: PlayerConnectionState,
    /// Seating order when a game starts
    pub joined_at: Instant,
}

impl LobbyPlayer {
    pub fn new(user_id: i64, username: String, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            user_id,
            username,
            tx,
            connection_state: PlayerConnectionState::Connected,
            joined_at: Instant::now(),
        }
    }

    /// Returns true if the player has an active WebSocket connection
    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, PlayerConnectionState::Connected)
    }
}

/// A game lobby that players can join with a short code
#[derive(Debug)]
pub struct Lobby {
    pub lobby_id: String,
    /// Short shareable code (e.g., "ABC123")
    pub lobby_code: String,
    /// Players in the lobby, keyed by user_id
    pub players: DashMap<i64, LobbyPlayer>,
    /// When the lobby was created
    pub created_at: Instant,
    /// When the lobby became empty (for cleanup grace period)
    pub empty_since: Option<Instant>,
}

impl Lobby {
    /// Create a new lobby with a generated code
    pub fn new_custom() -> Self {
        Self::with_code(generate_lobby_code())
    }

    /// Create a lobby under a known code, e.g. when restoring a saved game
    pub fn with_code(lobby_code: String) -> Self {
        Self {
            lobby_id: lobby_id_for(&lobby_code),
            lobby_code,
            players: DashMap::new(),
            created_at: Instant::now(),
            empty_since: None,
        }
    }

    /// Count of actively connected players (excludes disconnected ones in grace period)
    pub fn connected_player_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected()).count()
    }

    /// Check if lobby has any players (connected or disconnected in grace period)
    pub fn has_any_players(&self) -> bool {
        !self.players.is_empty()
    }

    /// Connected players, oldest member first
    pub fn connected_players(&self) -> Vec<LobbyPlayer> {
        let mut players: Vec<LobbyPlayer> = self
            .players
            .iter()
            .filter(|p| p.is_connected())
            .map(|p| p.value().clone())
            .collect();
        players.sort_by_key(|p| p.joined_at);
        players
    }
}

pub fn lobby_id_for(lobby_code: &str) -> String {
    format!("custom:{}", lobby_code)
}

/// Generate a short, readable lobby code (6 alphanumeric characters)
fn generate_lobby_code() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..LOBBY_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..LOBBY_CODE_CHARSET.len());
            LOBBY_CODE_CHARSET[idx] as char
        })
        .collect()
}

/// Application state shared across all handlers
pub struct AppState {
    pub config: Config,
    pub dictionary: Dictionary,
    /// Running games keyed by lobby_id. Exclusive access to an entry is what
    /// serializes actions on that game.
    pub active_games: DashMap<String, GameSession>,
    /// All lobbies keyed by lobby_id (e.g., "custom:ABC123")
    pub lobbies: DashMap<String, Lobby>,
    /// Index from lobby_code to lobby_id for quick lobby lookup
    pub lobby_code_index: DashMap<String, String>,
    /// Lobby each user currently belongs to
    pub player_lobbies: DashMap<i64, String>,
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Source of snapshot revisions, increasing across every lobby
    snapshot_revision: AtomicU64,
}

impl AppState {
    pub fn new(config: Config, dictionary: Dictionary, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            config,
            dictionary,
            active_games: DashMap::new(),
            lobbies: DashMap::new(),
            lobby_code_index: DashMap::new(),
            player_lobbies: DashMap::new(),
            snapshots,
            snapshot_revision: AtomicU64::new(0),
        }
    }

    /// Stamp a session with a fresh revision and return the copy to persist.
    /// Call while holding the session's map entry so revisions follow the
    /// order transitions were applied in.
    pub fn stamp_snapshot(&self, session: &mut GameSession) -> GameSession {
        session.revision = self.snapshot_revision.fetch_add(1, Ordering::Relaxed) + 1;
        session.clone()
    }
}

/// A seated player, as remembered across restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub user_id: i64,
    pub username: String,
}

/// In-memory game session data. This is also the persisted snapshot, so it
/// holds no connection handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub game_id: Uuid,
    pub seats: Vec<Seat>,
    pub game: Game,
    /// Ordering of saved snapshots; a save older than the stored one is dropped
    #[serde(default)]
    pub revision: u64,
}

impl GameSession {
    pub fn new(seats: Vec<Seat>, game: Game) -> Self {
        Self {
            game_id: Uuid::new_v4(),
            seats,
            game,
            revision: 0,
        }
    }

    pub fn seat_of(&self, user_id: i64) -> Option<usize> {
        self.seats.iter().position(|seat| seat.user_id == user_id)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "word_placement_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting word placement backend server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Load dictionary
    let dictionary = match Dictionary::load(&config.game.dictionary_path).await {
        Ok(dict) => {
            if dict.is_empty() {
                tracing::warn!("Dictionary is empty, every placement will be rejected");
            } else {
                tracing::info!("Dictionary loaded successfully");
            }
            dict
        }
        Err(e) => {
            tracing::warn!(
                "Failed to load dictionary: {:#}. Using empty dictionary for now.",
                e
            );
            tracing::warn!(
                "Download a word list to {} for full functionality",
                config.game.dictionary_path
            );
            Dictionary::empty()
        }
    };

    let snapshots = Arc::new(FileSnapshotStore::new(&config.game.snapshot_dir));
    tracing::info!("Saving game snapshots to {}", config.game.snapshot_dir);

    // Create application state
    let state = Arc::new(AppState::new(config.clone(), dictionary, snapshots));

    // Spawn background task to clean up stale players and empty lobbies
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        lobby_cleanup_task(cleanup_state).await;
    });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Serve frontend static files
    let frontend_service = ServeDir::new(&config.server.frontend_dir);

    // Build router
    let app = Router::new()
        // WebSocket endpoint
        .route("/ws", get(websocket::handle_websocket))
        // API routes
        .merge(routes::create_routes())
        .fallback_service(frontend_service)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("WebSocket endpoint: ws://{}/ws", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("Game frontend: {}", config.server.frontend_url);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Background task that periodically cleans up stale disconnected players and empty lobbies
async fn lobby_cleanup_task(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(15));

    loop {
        interval.tick().await;
        cleanup_once(&state, Instant::now()).await;
    }
}

async fn cleanup_once(state: &Arc<AppState>, now: Instant) {
    let mut lobbies_to_remove = Vec::new();
    let mut players_to_remove: Vec<(String, i64)> = Vec::new();

    // Scan all lobbies
    for lobby_ref in state.lobbies.iter() {
        let lobby_id = lobby_ref.key().clone();
        let lobby = lobby_ref.value();

        // Find players that have exceeded the grace period
        for player_ref in lobby.players.iter() {
            if let PlayerConnectionState::AwaitingReconnect { since } = &player_ref.connection_state {
                if now.duration_since(*since) > PLAYER_DISCONNECT_GRACE_PERIOD {
                    players_to_remove.push((lobby_id.clone(), player_ref.user_id));
                }
            }
        }

        // Check if lobby should be removed (empty beyond grace period)
        if let Some(empty_since) = lobby.empty_since {
            if now.duration_since(empty_since) > LOBBY_EMPTY_GRACE_PERIOD {
                lobbies_to_remove.push(lobby_id.clone());
            }
        }
    }

    // Remove stale players
    for (lobby_id, user_id) in players_to_remove {
        let removed = match state.lobbies.get_mut(&lobby_id) {
            Some(mut lobby) => {
                lobby.players.remove(&user_id);
                if !lobby.has_any_players() {
                    lobby.empty_since = Some(now);
                }
                true
            }
            None => false,
        };
        if removed {
            state.player_lobbies.remove_if(&user_id, |_, id| *id == lobby_id);
            websocket::broadcast_lobby_player_list(state, &lobby_id).await;
            // fewer connected seats can complete an undo vote
            websocket::reevaluate_undo(state, &lobby_id).await;
            tracing::info!(
                "Removed stale disconnected player {} from lobby {} (grace period expired)",
                user_id,
                lobby_id
            );
        }
    }

    // Remove stale lobbies. Unfinished games stay on disk and come back when the code is reused.
    for lobby_id in lobbies_to_remove {
        if let Some((_, lobby)) = state.lobbies.remove(&lobby_id) {
            state.lobby_code_index.remove(&lobby.lobby_code);
            if let Some((_, session)) = state.active_games.remove(&lobby_id) {
                if session.game.is_ended() {
                    if let Err(e) = state.snapshots.remove(&lobby_id).await {
                        tracing::warn!("Failed to remove snapshot for {}: {:#}", lobby_id, e);
                    }
                }
            }
            tracing::info!(
                "Removed empty lobby {} after {:?} (grace period expired)",
                lobby_id,
                lobby.created_at.elapsed()
            );
        }
    }
}
