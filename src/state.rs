use sqlx::SqlitePool;

use crate::realtime::ConnectionRegistry;

/// Shared handles a host (HTTP server, test harness) threads through the
/// core operations. Cloning is cheap; clones share the pool and the
/// realtime registry.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub realtime: ConnectionRegistry,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        AppState {
            pool,
            realtime: ConnectionRegistry::new(),
        }
    }

    pub fn pool_clone(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{IdentityVerifier, VerifiedIdentity};
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::mpsc;

    struct AcceptAll;

    impl IdentityVerifier for AcceptAll {
        fn verify(&self, credential: &str) -> Option<VerifiedIdentity> {
            Some(VerifiedIdentity {
                user_id: credential.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn clones_share_the_registry() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy("sqlite::memory:")
            .expect("pool");
        let state = AppState::new(pool);
        let clone = state.clone();

        let (tx, _rx) = mpsc::unbounded_channel();
        let _conn = clone
            .realtime
            .authenticate(&AcceptAll, Some("u1"), tx)
            .expect("registered");
        assert_eq!(state.realtime.connection_count("u1"), 1);
    }
}
