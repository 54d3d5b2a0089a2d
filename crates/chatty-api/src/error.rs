use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use chatty_db::{FriendError, UserWriteError};

/// Request-boundary error taxonomy. Every variant maps to a stable machine
/// kind plus a human-readable message; none of these is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("user not found")]
    NotFound,
    #[error("you cannot send a friend request to yourself")]
    SelfRequest,
    #[error("you are already friends with this user")]
    AlreadyFriends,
    #[error("a friend request is already pending between you and this user")]
    AlreadyPending,
    #[error("friend request not found or already handled")]
    RequestNotFound,
    #[error("this user is not in your friends list")]
    NotFriends,
    #[error("username or email already in use")]
    DuplicateKey,
    #[error("invalid user id")]
    InvalidIdentifier,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing or invalid authorization token")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::SelfRequest => "self_request",
            Self::AlreadyFriends => "already_friends",
            Self::AlreadyPending => "already_pending",
            Self::RequestNotFound => "request_not_found",
            Self::NotFriends => "not_friends",
            Self::DuplicateKey => "duplicate_key",
            Self::InvalidIdentifier => "invalid_identifier",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateKey => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("request failed: {:#}", e);
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<FriendError> for ApiError {
    fn from(e: FriendError) -> Self {
        match e {
            FriendError::AlreadyFriends => Self::AlreadyFriends,
            FriendError::AlreadyPending => Self::AlreadyPending,
            FriendError::RequestNotFound => Self::RequestNotFound,
            FriendError::NotFriends => Self::NotFriends,
            FriendError::Storage(e) => Self::Internal(e),
        }
    }
}

impl From<UserWriteError> for ApiError {
    fn from(e: UserWriteError) -> Self {
        match e {
            UserWriteError::Duplicate => Self::DuplicateKey,
            UserWriteError::Storage(e) => Self::Internal(e),
        }
    }
}
