use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use chatty_types::api::{Claims, SendFriendRequest, StatusResponse};
use chatty_types::models::User;

use crate::auth::AppState;
use crate::convert::user_from_row;
use crate::error::ApiError;

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidIdentifier)
}

/// Send a friend request to a user identified by username or email.
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let identifier = req.identifier.trim();
    if identifier.is_empty() {
        return Err(ApiError::BadRequest("username or email is required".into()));
    }

    let receiver = state
        .db
        .get_user_by_identifier(identifier)?
        .ok_or(ApiError::NotFound)?;

    let sender_id = claims.sub.to_string();
    if receiver.id == sender_id {
        return Err(ApiError::SelfRequest);
    }

    state.db.send_friend_request(&sender_id, &receiver.id)?;

    Ok(Json(StatusResponse {
        message: "friend request sent".into(),
    }))
}

/// Accept a pending request that `sender_id` sent to the caller.
pub async fn accept_request(
    State(state): State<AppState>,
    Path(sender_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusResponse>, ApiError> {
    let sender_id = parse_user_id(&sender_id)?.to_string();
    state
        .db
        .get_user_by_id(&sender_id)?
        .ok_or(ApiError::NotFound)?;

    state
        .db
        .accept_friend_request(&claims.sub.to_string(), &sender_id)?;

    Ok(Json(StatusResponse {
        message: "friend request accepted".into(),
    }))
}

/// Reject a pending request that `sender_id` sent to the caller.
pub async fn reject_request(
    State(state): State<AppState>,
    Path(sender_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusResponse>, ApiError> {
    let sender_id = parse_user_id(&sender_id)?.to_string();
    state
        .db
        .get_user_by_id(&sender_id)?
        .ok_or(ApiError::NotFound)?;

    state
        .db
        .reject_friend_request(&claims.sub.to_string(), &sender_id)?;

    Ok(Json(StatusResponse {
        message: "friend request rejected".into(),
    }))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path(friend_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatusResponse>, ApiError> {
    let friend_id = parse_user_id(&friend_id)?.to_string();
    state
        .db
        .get_user_by_id(&friend_id)?
        .ok_or(ApiError::NotFound)?;

    state
        .db
        .remove_friend(&claims.sub.to_string(), &friend_id)?;

    Ok(Json(StatusResponse {
        message: "friend removed".into(),
    }))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, ApiError> {
    let rows = state.db.list_friends(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(user_from_row).collect()))
}

pub async fn list_incoming(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, ApiError> {
    let rows = state.db.list_incoming_requests(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(user_from_row).collect()))
}

pub async fn list_outgoing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, ApiError> {
    let rows = state.db.list_outgoing_requests(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(user_from_row).collect()))
}
