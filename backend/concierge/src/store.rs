//! In-memory registry of chat sessions, one per browser tab.
//!
//! Each session sits behind its own async mutex. Holding that lock *is* the
//! "loading" flag: a message that arrives while another is in flight is
//! rejected with [`ConciergeError::SessionBusy`] rather than queued.
//!
//! Sessions untouched for longer than the idle limit are dropped by
//! [`run_expiry`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{ConciergeError, Result};
use crate::extractor::GoalExtractor;
use crate::session::{SessionManager, SessionSnapshot, TurnOutcome};

pub type SharedSession = Arc<Mutex<SessionManager>>;

struct Entry {
    session: SharedSession,
    /// Milliseconds since the store's epoch.
    touched_ms: AtomicU64,
}

pub struct SessionStore {
    extractor: Arc<dyn GoalExtractor>,
    sessions: RwLock<HashMap<Uuid, Entry>>,
    epoch: Instant,
}

impl SessionStore {
    pub fn new(extractor: Arc<dyn GoalExtractor>) -> Self {
        Self {
            extractor,
            sessions: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub async fn create(&self) -> (Uuid, SharedSession) {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(SessionManager::new(Arc::clone(&self.extractor))));
        let entry = Entry {
            session: Arc::clone(&session),
            touched_ms: AtomicU64::new(self.now_ms()),
        };
        self.sessions.write().await.insert(id, entry);
        info!("Session {id} created");
        (id, session)
    }

    /// Look up a session and mark it as used.
    pub async fn get(&self, id: Uuid) -> Result<SharedSession> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&id)
            .ok_or_else(|| ConciergeError::NotFound(format!("Session {id}")))?;
        entry.touched_ms.store(self.now_ms(), Ordering::Relaxed);
        Ok(Arc::clone(&entry.session))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| info!("Session {id} removed"))
            .ok_or_else(|| ConciergeError::NotFound(format!("Session {id}")))
    }

    /// Read-only view. Waits for an in-flight turn to land instead of
    /// failing with [`ConciergeError::SessionBusy`].
    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot> {
        let session = self.get(id).await?;
        let guard = session.lock().await;
        Ok(guard.snapshot())
    }

    /// Drop sessions idle for longer than `max_idle`. A session with a turn
    /// in flight is never idle. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = self.now_ms().saturating_sub(max_idle.as_millis() as u64);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let busy = entry.session.try_lock().is_err();
            let keep = busy || entry.touched_ms.load(Ordering::Relaxed) >= cutoff;
            if !keep {
                debug!("Session {id} expired");
            }
            keep
        });
        before - sessions.len()
    }

    /// Lock a session for an exclusive operation, failing fast if a turn is
    /// already in flight.
    pub async fn lock(&self, id: Uuid) -> Result<OwnedMutexGuard<SessionManager>> {
        self.get(id)
            .await?
            .try_lock_owned()
            .map_err(|_| ConciergeError::SessionBusy)
    }

    /// Run one chat turn on its own task. If the caller stops waiting, the
    /// turn still completes and its result lands in the session.
    pub async fn send(&self, id: Uuid, message: String) -> Result<(TurnOutcome, SessionSnapshot)> {
        let mut guard = self.lock(id).await?;
        let turn = tokio::spawn(async move {
            let outcome = guard.send(&message).await?;
            Ok::<_, ConciergeError>((outcome, guard.snapshot()))
        });
        turn.await
            .map_err(|e| ConciergeError::Extractor(format!("chat turn aborted: {e}")))?
    }
}

/// Sweep idle sessions every `every` until the process exits.
pub async fn run_expiry(store: Arc<SessionStore>, max_idle: Duration, every: Duration) {
    info!(
        "Session expiry started (idle limit {}s, sweep every {}s)",
        max_idle.as_secs(),
        every.as_secs()
    );
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = store.evict_idle(max_idle).await;
        if removed > 0 {
            info!("Expired {removed} idle session(s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationState;
    use crate::finalize::ProposedGoal;
    use crate::transactions::EncodedTx;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Blocks every start call until released.
    struct GatedExtractor {
        release: Notify,
    }

    #[async_trait]
    impl GoalExtractor for GatedExtractor {
        async fn start_conversation(&self, _message: &str) -> Result<ConversationState> {
            self.release.notified().await;
            Ok(ConversationState::default())
        }
        async fn continue_conversation(
            &self,
            _state: &ConversationState,
            _message: &str,
        ) -> Result<ConversationState> {
            Ok(ConversationState::default())
        }
        async fn propose(&self, message: &str) -> Result<ProposedGoal> {
            Ok(ProposedGoal::placeholder(message))
        }
        async fn build_tx(&self, _goal: &ProposedGoal) -> Result<EncodedTx> {
            Err(ConciergeError::Unavailable("gated".to_string()))
        }
        async fn health(&self) -> bool {
            true
        }
    }

    fn gated_store() -> (Arc<GatedExtractor>, Arc<SessionStore>) {
        let extractor = Arc::new(GatedExtractor {
            release: Notify::new(),
        });
        let store = Arc::new(SessionStore::new(extractor.clone()));
        (extractor, store)
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (_, store) = gated_store();
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(ConciergeError::NotFound(_))
        ));
        assert!(store.remove(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn second_message_while_loading_is_rejected() {
        let (extractor, store) = gated_store();
        let (id, _) = store.create().await;

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.send(id, "first".to_string()).await })
        };
        // Let the first turn take the lock.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = store.send(id, "second".to_string()).await.unwrap_err();
        assert!(matches!(err, ConciergeError::SessionBusy));

        extractor.release.notify_one();
        pending.await.unwrap().unwrap();
        let session = store.get(id).await.unwrap();
        assert!(session.lock().await.is_active());
    }

    #[tokio::test]
    async fn abandoned_turn_still_completes() {
        let (extractor, store) = gated_store();
        let (id, session) = store.create().await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.send(id, "hello".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();

        extractor.release.notify_one();
        let guard = tokio::time::timeout(Duration::from_secs(1), session.lock())
            .await
            .expect("turn never released the session");
        assert!(guard.is_active());
    }

    #[tokio::test]
    async fn snapshot_waits_for_in_flight_turn() {
        let (extractor, store) = gated_store();
        let (id, _) = store.create().await;

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.send(id, "first".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.snapshot(id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        extractor.release.notify_one();
        pending.await.unwrap().unwrap();
        let snapshot = reader.await.unwrap().unwrap();
        assert!(snapshot.state.is_some());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let (_, store) = gated_store();
        let (stale, _) = store.create().await;
        let (fresh, _) = store.create().await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        store.get(fresh).await.unwrap();

        assert_eq!(store.evict_idle(Duration::from_millis(40)).await, 1);
        assert!(matches!(
            store.get(stale).await,
            Err(ConciergeError::NotFound(_))
        ));
        assert!(store.get(fresh).await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn busy_session_is_never_idle() {
        let (extractor, store) = gated_store();
        let (id, _) = store.create().await;

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.send(id, "slow".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.evict_idle(Duration::ZERO).await, 0);

        extractor.release.notify_one();
        pending.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.evict_idle(Duration::ZERO).await, 1);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let (_, store) = gated_store();
        let (a, _) = store.create().await;
        let (b, _) = store.create().await;
        assert_ne!(a, b);
        store.remove(a).await.unwrap();
        assert!(store.get(b).await.is_ok());
    }
}
