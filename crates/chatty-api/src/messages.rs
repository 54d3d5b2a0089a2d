use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::error;
use uuid::Uuid;

use chatty_db::models::MessageRow;
use chatty_types::api::{Claims, SendMessageRequest};
use chatty_types::events::GatewayEvent;
use chatty_types::models::{Message, User};

use crate::auth::AppState;
use crate::convert::{message_from_row, user_from_row};
use crate::error::ApiError;
use crate::uploads;

/// All other users, for the chat sidebar.
pub async fn list_sidebar_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, ApiError> {
    let rows = state.db.list_users_except(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(user_from_row).collect()))
}

/// Conversation with another user, both directions, ascending by time.
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let other_id: Uuid = user_id.parse().map_err(|_| ApiError::InvalidIdentifier)?;

    let db = state.clone();
    let me = claims.sub.to_string();
    let other = other_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.get_conversation(&me, &other))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("join error"))
        })??;

    Ok(Json(rows.into_iter().map(message_from_row).collect()))
}

/// Store a direct message, then push it to the receiver's live session if one
/// exists. Success is determined by persistence alone — a missing session or
/// a failed push is silent.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let receiver_id: Uuid = receiver_id.parse().map_err(|_| ApiError::InvalidIdentifier)?;
    state
        .db
        .get_user_by_id(&receiver_id.to_string())?
        .ok_or(ApiError::NotFound)?;

    let text = req.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    if text.is_none() && req.image.is_none() {
        return Err(ApiError::BadRequest(
            "message must include text or an image".into(),
        ));
    }

    let message_id = Uuid::new_v4();
    let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

    // Persist first, always — off the async runtime like other blocking DB work
    let db = state.clone();
    let image = req.image;
    let sender = claims.sub.to_string();
    let receiver = receiver_id.to_string();
    let row = tokio::task::spawn_blocking(move || -> Result<MessageRow, ApiError> {
        let image = match image {
            Some(payload) => Some(uploads::save_base64_image(&db.upload_dir, &payload)?),
            None => None,
        };
        let row = MessageRow {
            id: message_id.to_string(),
            sender_id: sender,
            receiver_id: receiver,
            text,
            image,
            created_at,
        };
        db.db.insert_message(&row)?;
        Ok(row)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("join error"))
    })??;

    let message = message_from_row(row);
    state
        .dispatcher
        .send_to_user(
            receiver_id,
            GatewayEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::friends::{accept_request, send_request};
    use crate::testutil::{signup, test_state};
    use chatty_types::api::SendFriendRequest;

    fn text_message(text: &str) -> Json<SendMessageRequest> {
        Json(SendMessageRequest {
            text: Some(text.into()),
            image: None,
        })
    }

    #[tokio::test]
    async fn message_persists_when_recipient_is_offline() {
        let state = test_state();
        let alice = signup(&state, "alice").await;
        let bob = signup(&state, "bob").await;

        assert!(!state.dispatcher.is_online(bob.sub).await);

        let (status, Json(sent)) = send_message(
            State(state.clone()),
            Path(bob.sub.to_string()),
            Extension(alice.clone()),
            text_message("you around?"),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent.sender_id, alice.sub);

        // Still retrievable from both sides
        for who in [&alice, &bob] {
            let other = if who.sub == alice.sub { &bob } else { &alice };
            let Json(history) = get_history(
                State(state.clone()),
                Path(other.sub.to_string()),
                Extension((*who).clone()),
            )
            .await
            .unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].text.as_deref(), Some("you around?"));
        }
    }

    #[tokio::test]
    async fn online_recipient_gets_exactly_one_push() {
        let state = test_state();
        let alice = signup(&state, "alice").await;
        let bob = signup(&state, "bob").await;

        let (_conn, mut rx) = state.dispatcher.register_session(bob.sub).await;

        send_message(
            State(state.clone()),
            Path(bob.sub.to_string()),
            Extension(alice),
            text_message("hi"),
        )
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            GatewayEvent::NewMessage { message } => {
                assert_eq!(message.text.as_deref(), Some("hi"));
                assert_eq!(message.receiver_id, bob.sub);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_message_error_kinds() {
        let state = test_state();
        let alice = signup(&state, "alice").await;
        let bob = signup(&state, "bob").await;

        let err = send_message(
            State(state.clone()),
            Path("garbage".into()),
            Extension(alice.clone()),
            text_message("hi"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_identifier");

        let err = send_message(
            State(state.clone()),
            Path(Uuid::new_v4().to_string()),
            Extension(alice.clone()),
            text_message("hi"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = send_message(
            State(state.clone()),
            Path(bob.sub.to_string()),
            Extension(alice),
            Json(SendMessageRequest {
                text: Some("   ".into()),
                image: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[tokio::test]
    async fn sidebar_lists_everyone_else() {
        let state = test_state();
        let alice = signup(&state, "alice").await;
        signup(&state, "bob").await;
        signup(&state, "carol").await;

        let Json(users) = list_sidebar_users(State(state.clone()), Extension(alice))
            .await
            .unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, ["bob", "carol"]);
    }

    #[tokio::test]
    async fn end_to_end_signup_befriend_message() {
        let state = test_state();
        let alice = signup(&state, "alice").await;
        let bob = signup(&state, "bob").await;

        send_request(
            State(state.clone()),
            Extension(alice.clone()),
            Json(SendFriendRequest {
                identifier: "bob".into(),
            }),
        )
        .await
        .unwrap();
        accept_request(
            State(state.clone()),
            Path(alice.sub.to_string()),
            Extension(bob.clone()),
        )
        .await
        .unwrap();

        send_message(
            State(state.clone()),
            Path(bob.sub.to_string()),
            Extension(alice.clone()),
            text_message("hi"),
        )
        .await
        .unwrap();

        for (who, other) in [(&alice, &bob), (&bob, &alice)] {
            let Json(history) = get_history(
                State(state.clone()),
                Path(other.sub.to_string()),
                Extension((*who).clone()),
            )
            .await
            .unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].text.as_deref(), Some("hi"));
            assert_eq!(history[0].sender_id, alice.sub);
        }
    }
}
