use crate::domain::ports::SessionStore;
use crate::domain::user::UserId;
use crate::error::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// In-flight multi-step forms, keyed by user and expiring after `ttl`.
///
/// Losing an entry only costs the user a restart of the form; the steps
/// that write to the core are idempotent upserts and can be replayed.
pub struct FormSessions<S> {
    store: Arc<dyn SessionStore<S>>,
    ttl: Duration,
}

impl<S> Clone for FormSessions<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ttl: self.ttl,
        }
    }
}

impl<S> FormSessions<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn SessionStore<S>>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Stores `state`, restarting the expiry clock.
    pub async fn put(&self, user: UserId, state: S) -> Result<()> {
        self.store.put(user, state, Instant::now() + self.ttl).await
    }

    pub async fn get(&self, user: UserId) -> Result<Option<S>> {
        self.store.get(user, Instant::now()).await
    }

    pub async fn finish(&self, user: UserId) -> Result<Option<S>> {
        self.store.remove(user).await
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        let purged = self.store.purge(Instant::now()).await?;
        if purged > 0 {
            debug!(purged, "Expired form sessions dropped");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemorySessionStore;

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Name,
        Phone { first_name: String },
    }

    #[tokio::test]
    async fn test_put_get_finish() {
        let sessions = FormSessions::new(
            Arc::new(InMemorySessionStore::<Step>::new()),
            Duration::from_secs(600),
        );
        sessions.put(1, Step::Name).await.unwrap();
        sessions
            .put(
                1,
                Step::Phone {
                    first_name: "Ali".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            sessions.get(1).await.unwrap(),
            Some(Step::Phone { .. })
        ));
        assert!(sessions.finish(1).await.unwrap().is_some());
        assert!(sessions.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let sessions = FormSessions::new(
            Arc::new(InMemorySessionStore::<Step>::new()),
            Duration::ZERO,
        );
        sessions.put(1, Step::Name).await.unwrap();
        assert!(sessions.get(1).await.unwrap().is_none());
        assert_eq!(sessions.purge_expired().await.unwrap(), 1);
    }
}
