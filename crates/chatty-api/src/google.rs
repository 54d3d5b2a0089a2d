use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use chatty_db::models::UserRow;
use chatty_types::api::{AuthResponse, GoogleAuthRequest};

use crate::auth::{create_token, AppState};
use crate::convert::user_from_row;
use crate::error::ApiError;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// The subset of Google's userinfo payload we rely on.
#[derive(Debug, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: Option<String>,
    pub picture: Option<String>,
}

/// Exchange an authorization code for the user's Google profile.
async fn exchange_code(config: &GoogleOAuthConfig, code: &str) -> anyhow::Result<GoogleProfile> {
    let client = reqwest::Client::new();

    let token: TokenResponse = client
        .post(TOKEN_URL)
        .form(&[
            ("code", code),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("redirect_uri", &config.redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let profile: GoogleProfile = client
        .get(USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(profile)
}

/// Sign in (or up) with a Google authorization code.
pub async fn google_auth(
    State(state): State<AppState>,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let config = state
        .google
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("google sign-in is not configured".into()))?;

    let profile = exchange_code(config, &req.code).await.map_err(|e| {
        warn!("Google code exchange failed: {:#}", e);
        ApiError::InvalidCredentials
    })?;

    // Returning user
    if let Some(row) = state.db.get_user_by_google_id(&profile.id)? {
        let user = user_from_row(row);
        let token = create_token(&state.jwt_secret, user.id, &user.username)?;
        return Ok(Json(AuthResponse { user, token }));
    }

    let email = profile
        .email
        .as_deref()
        .map(str::to_lowercase)
        .ok_or_else(|| ApiError::BadRequest("email not provided by Google".into()))?;

    // An existing password account with this email keeps its original sign-in
    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::DuplicateKey);
    }

    let username = pick_username(&state, &email)?;
    let row = UserRow {
        id: Uuid::new_v4().to_string(),
        username,
        email,
        password: None,
        profile_pic: profile.picture.unwrap_or_default(),
        auth_provider: "google".to_string(),
        google_id: Some(profile.id),
        created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
    };
    state.db.create_user(&row)?;
    info!("Created google account for {}", row.username);

    let user = user_from_row(row);
    let token = create_token(&state.jwt_secret, user.id, &user.username)?;
    Ok(Json(AuthResponse { user, token }))
}

/// Derive a username from the email local part, suffixing digits on
/// collision until one is free.
fn pick_username(state: &AppState, email: &str) -> Result<String, ApiError> {
    let mut base: String = email
        .split('@')
        .next()
        .unwrap_or("user")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if base.len() < 3 {
        base = format!("user{base}");
    }
    base.truncate(16);

    if !state.db.username_taken(&base)? {
        return Ok(base);
    }
    loop {
        let candidate = format!("{}{:04}", base, rand::random::<u16>() % 10000);
        if !state.db.username_taken(&candidate)? {
            return Ok(candidate);
        }
    }
}
