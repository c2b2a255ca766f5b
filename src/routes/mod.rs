pub mod auth;
pub mod health;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/guest", axum::routing::post(auth::guest_login))
        .route("/auth/me", get(auth::get_current_user))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::{Config, GameConfig, SecurityConfig, ServerConfig},
        dictionary::Dictionary,
        persistence::FileSnapshotStore,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    pub(crate) fn test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                frontend_url: "http://localhost".to_string(),
                frontend_dir: "./frontend".to_string(),
            },
            security: SecurityConfig {
                jwt_secret: "test-secret".to_string(),
            },
            game: GameConfig {
                dictionary_path: "./dictionary.txt".to_string(),
                max_players: 4,
                snapshot_dir: std::env::temp_dir()
                    .join(format!("snapshots-{}", uuid::Uuid::new_v4()))
                    .display()
                    .to_string(),
            },
        }
    }

    pub(crate) fn test_state() -> Arc<AppState> {
        let config = test_config();
        let snapshots = FileSnapshotStore::new(&config.game.snapshot_dir);
        Arc::new(AppState::new(
            config,
            Dictionary::from_words(["CAT"]),
            Arc::new(snapshots),
        ))
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_routes().with_state(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "word-placement-backend");
    }
}
