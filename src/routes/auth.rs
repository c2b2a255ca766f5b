use crate::{auth, AppState};
use axum::{extract::State, http::StatusCode, Json};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest display name a guest may pick
const MAX_USERNAME_LENGTH: usize = 24;

#[derive(Debug, Deserialize)]
pub struct GuestLoginRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// JWT token for backend API and websocket authentication
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub username: String,
}

/// Issue a token for a fresh guest identity
pub async fn guest_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GuestLoginRequest>,
) -> Result<Json<TokenResponse>, StatusCode> {
    let username = payload.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
        tracing::debug!("Rejected guest login with username {:?}", payload.username);
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = rand::rng().random_range(1..i64::MAX);

    let jwt_token = auth::generate_token(user_id, username, &state.config.security.jwt_secret)
        .map_err(|e| {
            tracing::error!("Failed to generate JWT token: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tracing::info!("Issued guest token for {} (ID: {})", username, user_id);

    Ok(Json(TokenResponse {
        access_token: jwt_token,
    }))
}

/// Get current user info from the token
pub async fn get_current_user(user: auth::AuthenticatedUser) -> Json<UserResponse> {
    tracing::debug!(
        "Getting user info for authenticated user: {} ({})",
        user.username,
        user.user_id
    );

    Json(UserResponse {
        user_id: user.user_id,
        username: user.username,
    })
}
