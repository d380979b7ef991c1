use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Fixed event identifier every realtime push is tagged with.
pub const NOTIFICATION_EVENT: &str = "new_notification";

#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub user_id: String,
}

/// External authentication collaborator for realtime connections.
/// `None` means the credential was rejected.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Option<VerifiedIdentity>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection presented no credential")]
    MissingCredential,
    #[error("credential rejected")]
    InvalidCredential,
}

/// Payload pushed to a live connection. `event` is always
/// [`NOTIFICATION_EVENT`]; the transport layer maps it to its own framing.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub event: &'static str,
    pub data: serde_json::Value,
}

/// Write half of a live connection. The read half belongs to the
/// transport layer, which forwards messages to the wire.
pub type ConnectionSender = mpsc::UnboundedSender<RealtimeMessage>;

#[derive(Debug)]
struct Rooms {
    map: Mutex<HashMap<String, HashMap<u64, ConnectionSender>>>,
    next_id: AtomicU64,
}

impl Rooms {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<u64, ConnectionSender>>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// In-memory routing table mapping an authenticated identity to its live
/// connections. Process-local, never persisted; a room disappears with its
/// last connection.
#[derive(Clone)]
pub struct ConnectionRegistry {
    rooms: Arc<Rooms>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            rooms: Arc::new(Rooms {
                map: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Verify the credential and register the connection under the
    /// identity's room.
    ///
    /// On failure nothing is registered; the caller is expected to close
    /// the transport. On success the returned guard keeps the
    /// registration alive. Dropping it (disconnect, for any reason)
    /// removes the connection from its room.
    pub fn authenticate(
        &self,
        verifier: &dyn IdentityVerifier,
        credential: Option<&str>,
        sender: ConnectionSender,
    ) -> Result<RegisteredConnection, ConnectError> {
        let credential = credential.ok_or_else(|| {
            warn!(
                target = "hromada",
                event = "realtime_auth_rejected",
                reason = "missing_credential"
            );
            ConnectError::MissingCredential
        })?;
        let identity = verifier.verify(credential).ok_or_else(|| {
            warn!(
                target = "hromada",
                event = "realtime_auth_rejected",
                reason = "invalid_credential"
            );
            ConnectError::InvalidCredential
        })?;

        let id = self.rooms.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut map = self.rooms.lock();
            map.entry(identity.user_id.clone())
                .or_default()
                .insert(id, sender);
        }
        info!(
            target = "hromada",
            event = "realtime_connected",
            user_id = %identity.user_id,
            connection_id = id
        );
        Ok(RegisteredConnection {
            rooms: Arc::clone(&self.rooms),
            user_id: identity.user_id,
            id,
        })
    }

    /// Push `data` to every live connection of `user_id`.
    ///
    /// At-most-once, fire-and-forget: an absent room is a no-op, a dead
    /// connection is skipped, and nothing is queued or retried. Returns
    /// the number of connections the payload was handed to.
    pub fn dispatch(&self, user_id: &str, data: serde_json::Value) -> usize {
        // Clone the senders out of the lock so a push can never observe a
        // connection mid-teardown, and the send itself runs unlocked.
        let senders: Vec<(u64, ConnectionSender)> = {
            let map = self.rooms.lock();
            match map.get(user_id) {
                Some(room) => room.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => {
                    debug!(
                        target = "hromada",
                        event = "realtime_no_connections",
                        user_id = %user_id
                    );
                    return 0;
                }
            }
        };

        let message = RealtimeMessage {
            event: NOTIFICATION_EVENT,
            data,
        };
        let mut delivered = 0;
        for (id, tx) in senders {
            match tx.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(
                        target = "hromada",
                        event = "realtime_push_dropped",
                        user_id = %user_id,
                        connection_id = id
                    );
                }
            }
        }
        debug!(
            target = "hromada",
            event = "realtime_dispatched",
            user_id = %user_id,
            delivered
        );
        delivered
    }

    /// Live connections currently registered for `user_id`.
    pub fn connection_count(&self, user_id: &str) -> usize {
        self.rooms
            .lock()
            .get(user_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

/// Registration guard for one authenticated connection. Dropping it
/// removes the connection from its room and discards the room if it
/// became empty.
#[derive(Debug)]
pub struct RegisteredConnection {
    rooms: Arc<Rooms>,
    user_id: String,
    id: u64,
}

impl RegisteredConnection {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for RegisteredConnection {
    fn drop(&mut self) {
        let mut map = self.rooms.lock();
        if let Some(room) = map.get_mut(&self.user_id) {
            room.remove(&self.id);
            if room.is_empty() {
                map.remove(&self.user_id);
            }
        }
        debug!(
            target = "hromada",
            event = "realtime_disconnected",
            user_id = %self.user_id,
            connection_id = self.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAll;

    impl IdentityVerifier for AcceptAll {
        fn verify(&self, credential: &str) -> Option<VerifiedIdentity> {
            Some(VerifiedIdentity {
                user_id: credential.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn missing_credential_is_never_registered() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = registry
            .authenticate(&AcceptAll, None, tx)
            .expect_err("no credential");
        assert_eq!(err, ConnectError::MissingCredential);
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn dead_receiver_does_not_poison_dispatch() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let _conn = registry
            .authenticate(&AcceptAll, Some("u1"), tx)
            .expect("registered");
        drop(rx);
        let delivered = registry.dispatch("u1", serde_json::json!({"x": 1}));
        assert_eq!(delivered, 0);
    }
}
