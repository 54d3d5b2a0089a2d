use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated.
    Ready { user_id: Uuid, username: String },

    /// Full snapshot of online user ids, sent to every connected peer
    /// whenever presence membership changes.
    OnlineUsers { user_ids: Vec<Uuid> },

    /// A message addressed to this user was stored.
    NewMessage { message: Message },
}
