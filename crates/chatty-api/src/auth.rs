use std::path::PathBuf;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use chatty_db::models::UserRow;
use chatty_db::Database;
use chatty_gateway::dispatcher::Dispatcher;
use chatty_types::api::{
    AuthResponse, Claims, LoginRequest, RegisterRequest, UpdateProfileRequest,
};
use chatty_types::models::User;

use crate::convert::user_from_row;
use crate::error::ApiError;
use crate::google::GoogleOAuthConfig;
use crate::uploads;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub google: Option<GoogleOAuthConfig>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let username = req.username.trim();
    validate_username(username)?;
    if req.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "password must be at least 6 characters".into(),
        ));
    }
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash failed: {}", e)))?
        .to_string();

    let row = UserRow {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email,
        password: Some(password_hash),
        profile_pic: String::new(),
        auth_provider: "email".to_string(),
        google_id: None,
        created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
    };
    // The UNIQUE indexes are the authority on username/email collisions
    state.db.create_user(&row)?;

    let user = user_from_row(row);
    let token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let row = state
        .db
        .get_user_by_email(&req.email.trim().to_lowercase())?
        .ok_or(ApiError::InvalidCredentials)?;

    // OAuth-only accounts carry no password hash
    let Some(stored_hash) = row.password.as_deref() else {
        return Err(ApiError::BadRequest(
            "this account signs in with Google".into(),
        ));
    };

    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let user = user_from_row(row);
    let token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok(Json(AuthResponse { user, token }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let row = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user_from_row(row)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let user_id = claims.sub.to_string();
    // Token claims can carry a stale username after an earlier rename
    let current = state
        .db
        .get_user_by_id(&user_id)?
        .ok_or(ApiError::NotFound)?;

    let username = match req.username.as_deref().map(str::trim) {
        Some(name) if name != current.username => {
            validate_username(name)?;
            Some(name.to_string())
        }
        _ => None,
    };

    let profile_pic = match req.profile_pic.as_deref() {
        Some(payload) => {
            let dir = state.upload_dir.clone();
            let payload = payload.to_string();
            Some(
                tokio::task::spawn_blocking(move || uploads::save_base64_image(&dir, &payload))
                    .await
                    .map_err(|e| ApiError::Internal(anyhow::anyhow!("join error: {}", e)))??,
            )
        }
        None => None,
    };

    if username.is_none() && profile_pic.is_none() {
        return Err(ApiError::BadRequest("no changes provided to update".into()));
    }

    state
        .db
        .update_profile(&user_id, username.as_deref(), profile_pic.as_deref())?;

    let row = state
        .db
        .get_user_by_id(&user_id)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(user_from_row(row)))
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let chars = username.chars().count();
    if chars < 3 || chars > 20 {
        return Err(ApiError::BadRequest(
            "username must be between 3 and 20 characters".into(),
        ));
    }
    Ok(())
}

pub(crate) fn create_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(7)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{signup, test_state};
    use chatty_types::models::AuthProvider;

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let state = test_state();

        let (status, Json(created)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                username: "alice".into(),
                email: "Alice@Example.com".into(),
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.user.auth_provider, AuthProvider::Email);
        assert_eq!(created.user.email, "alice@example.com");

        let Json(logged_in) = login(
            State(state),
            Json(LoginRequest {
                email: "alice@example.com".into(),
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(logged_in.user.id, created.user.id);
        assert!(!logged_in.token.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let state = test_state();
        let req = || RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter22".into(),
        };

        register(State(state.clone()), Json(req())).await.unwrap();
        let err = register(State(state), Json(req())).await.unwrap_err();
        assert_eq!(err.kind(), "duplicate_key");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let state = test_state();
        register(
            State(state.clone()),
            Json(RegisterRequest {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap();

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "alice@example.com".into(),
                password: "wrong".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_credentials");
    }

    #[tokio::test]
    async fn register_validates_input() {
        let state = test_state();

        let err = register(
            State(state.clone()),
            Json(RegisterRequest {
                username: "ab".into(),
                email: "a@b.c".into(),
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "bad_request");

        let err = register(
            State(state),
            Json(RegisterRequest {
                username: "alice".into(),
                email: "a@b.c".into(),
                password: "short".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[tokio::test]
    async fn username_limits_count_characters_not_bytes() {
        let state = test_state();

        // 12 characters, 24 bytes
        let (status, _) = register(
            State(state),
            Json(RegisterRequest {
                username: "é".repeat(12),
                email: "accents@example.com".into(),
                password: "hunter22".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn rename_back_to_original_after_a_rename() {
        let state = test_state();
        let claims = signup(&state, "alice").await;

        let Json(renamed) = update_profile(
            State(state.clone()),
            Extension(claims.clone()),
            Json(UpdateProfileRequest {
                username: Some("alicia".into()),
                profile_pic: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(renamed.username, "alicia");

        // Claims still say "alice"; the rename back must not be dropped
        let Json(restored) = update_profile(
            State(state),
            Extension(claims),
            Json(UpdateProfileRequest {
                username: Some("alice".into()),
                profile_pic: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(restored.username, "alice");
    }
}
