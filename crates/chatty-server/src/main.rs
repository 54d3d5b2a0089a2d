use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use chatty_api::auth::{self, AppState, AppStateInner};
use chatty_api::google::{self, GoogleOAuthConfig};
use chatty_api::middleware::require_auth;
use chatty_api::{friends, messages};
use chatty_gateway::connection;
use chatty_gateway::dispatcher::Dispatcher;
use chatty_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatty=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CHATTY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CHATTY_DB_PATH").unwrap_or_else(|_| "chatty.db".into());
    let upload_dir =
        PathBuf::from(std::env::var("CHATTY_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()));
    let host = std::env::var("CHATTY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CHATTY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let google = google_config();
    if google.is_none() {
        info!("Google sign-in disabled (GOOGLE_CLIENT_ID/SECRET/REDIRECT_URI not set)");
    }

    // Init database
    let db = chatty_db::Database::open(&PathBuf::from(&db_path))?;
    std::fs::create_dir_all(&upload_dir)?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
        upload_dir: upload_dir.clone(),
        google,
    });

    let ws_state = ServerState {
        dispatcher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/google", post(google::google_auth))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/friends", get(friends::list_friends))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/incoming", get(friends::list_incoming))
        .route("/friends/requests/outgoing", get(friends::list_outgoing))
        .route(
            "/friends/requests/{sender_id}/accept",
            post(friends::accept_request),
        )
        .route(
            "/friends/requests/{sender_id}/reject",
            post(friends::reject_request),
        )
        .route("/friends/{friend_id}", delete(friends::remove_friend))
        .route("/messages/users", get(messages::list_sidebar_users))
        .route("/messages/{user_id}", get(messages::get_history))
        .route("/messages/{user_id}", post(messages::send_message))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ws_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Chatty server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn google_config() -> Option<GoogleOAuthConfig> {
    Some(GoogleOAuthConfig {
        client_id: std::env::var("GOOGLE_CLIENT_ID").ok()?,
        client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok()?,
        redirect_uri: std::env::var("GOOGLE_REDIRECT_URI").ok()?,
    })
}

#[derive(Deserialize)]
struct GatewayParams {
    token: String,
}

/// Authenticate the JWT at the upgrade, then hand the socket to the gateway.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let token_data = match decode::<Claims>(
        &params.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let claims = token_data.claims;
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, claims.sub, claims.username)
    })
    .into_response()
}
