use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use chatty_types::events::GatewayEvent;

/// A live WebSocket session for one user.
struct Session {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Presence registry + event fan-out for all connected clients.
///
/// Holds at most one session per user id: a reconnect overwrites the previous
/// mapping (last-write-wins), so a user with two open tabs only receives
/// pushes on the most recent one. Preserved behavior, not a bug.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — all connected clients receive these
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> live session
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway broadcasts. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients (fire-and-forget).
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a session for a user, overwriting any previous one, and
    /// broadcast the updated online list. Returns (conn_id, receiver) for
    /// targeted events.
    pub async fn register_session(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let user_ids: Vec<Uuid> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.insert(user_id, Session { conn_id, tx });
            sessions.keys().copied().collect()
        };
        self.broadcast(GatewayEvent::OnlineUsers { user_ids });

        (conn_id, rx)
    }

    /// Unregister by connection id — a disconnect event only carries the
    /// connection, not the user. Removes the mapping only if it still points
    /// at this connection: a stale disconnect arriving after a newer
    /// register must not knock the newer session offline.
    pub async fn unregister_session(&self, conn_id: Uuid) {
        let user_ids: Option<Vec<Uuid>> = {
            let mut sessions = self.inner.sessions.write().await;
            let owner = sessions
                .iter()
                .find(|(_, s)| s.conn_id == conn_id)
                .map(|(uid, _)| *uid);
            match owner {
                Some(uid) => {
                    sessions.remove(&uid);
                    Some(sessions.keys().copied().collect())
                }
                None => None,
            }
        };

        // Only a membership change triggers a broadcast
        if let Some(user_ids) = user_ids {
            self.broadcast(GatewayEvent::OnlineUsers { user_ids });
        }
    }

    /// Push a targeted event to a user's live session, if any. Returns
    /// whether a session existed; send failures are ignored — delivery is
    /// best-effort and never surfaced to the caller.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let sessions = self.inner.sessions.read().await;
        match sessions.get(&user_id) {
            Some(session) => {
                let _ = session.tx.send(event);
                true
            }
            None => false,
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.sessions.read().await.contains_key(&user_id)
    }

    /// Current set of online user ids.
    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        self.inner.sessions.read().await.keys().copied().collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_disconnect_does_not_remove_newer_session() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = dispatcher.register_session(user).await;
        let (c2, _rx2) = dispatcher.register_session(user).await;

        // c1's disconnect arrives after c2 took over the mapping
        dispatcher.unregister_session(c1).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher.unregister_session(c2).await;
        assert!(!dispatcher.is_online(user).await);
    }

    #[tokio::test]
    async fn register_and_unregister_broadcast_online_list() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let user = Uuid::new_v4();

        let (conn, _user_rx) = dispatcher.register_session(user).await;
        match rx.recv().await.unwrap() {
            GatewayEvent::OnlineUsers { user_ids } => assert_eq!(user_ids, vec![user]),
            other => panic!("unexpected event: {other:?}"),
        }

        dispatcher.unregister_session(conn).await;
        match rx.recv().await.unwrap() {
            GatewayEvent::OnlineUsers { user_ids } => assert!(user_ids.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_broadcast() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = dispatcher.register_session(user).await;
        let (_c2, _rx2) = dispatcher.register_session(user).await;

        let mut rx = dispatcher.subscribe();
        dispatcher.unregister_session(c1).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_user_reaches_latest_session_only() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_c1, mut rx1) = dispatcher.register_session(user).await;
        let (_c2, mut rx2) = dispatcher.register_session(user).await;

        let delivered = dispatcher
            .send_to_user(user, GatewayEvent::OnlineUsers { user_ids: vec![] })
            .await;
        assert!(delivered);
        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_a_silent_miss() {
        let dispatcher = Dispatcher::new();
        let delivered = dispatcher
            .send_to_user(Uuid::new_v4(), GatewayEvent::OnlineUsers { user_ids: vec![] })
            .await;
        assert!(!delivered);
    }
}
