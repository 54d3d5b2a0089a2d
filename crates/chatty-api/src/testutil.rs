use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use uuid::Uuid;

use chatty_db::Database;
use chatty_gateway::dispatcher::Dispatcher;
use chatty_types::api::{Claims, RegisterRequest};

use crate::auth::{register, AppState, AppStateInner};

pub(crate) fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".into(),
        upload_dir: std::env::temp_dir().join(format!("chatty-test-{}", Uuid::new_v4())),
        google: None,
    })
}

/// Register a user through the real handler and return claims for acting as them.
pub(crate) async fn signup(state: &AppState, username: &str) -> Claims {
    let (_, Json(resp)) = register(
        State(state.clone()),
        Json(RegisterRequest {
            username: username.into(),
            email: format!("{username}@example.com"),
            password: "hunter22".into(),
        }),
    )
    .await
    .unwrap();

    Claims {
        sub: resp.user.id,
        username: username.into(),
        exp: usize::MAX,
    }
}
