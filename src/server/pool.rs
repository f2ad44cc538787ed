//! Session pooling by project root
//!
//! At most one live session exists per project root. Concurrent acquires
//! for the same root during startup are collapsed into a single creation
//! (single flight); the others wait and share the result. Sessions are
//! reference counted and stopped when the last user releases them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::server::factory::{PooledSession, SessionFactory};

/// Pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E: std::error::Error + Send + Sync + 'static> {
    #[error("Session creation failed for {root}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: E,
    },

    #[error("Pool is shut down")]
    ShutDown,
}

struct PooledEntry<S> {
    session: Arc<S>,
    refcount: usize,
}

struct PoolInner<S> {
    entries: HashMap<PathBuf, PooledEntry<S>>,

    /// In-flight creations; the sender side lives in the creating task and
    /// settles (or is dropped) when creation finishes
    creating: HashMap<PathBuf, watch::Receiver<()>>,

    shut_down: bool,
}

/// Shares language server sessions between callers, keyed by project root
pub struct SessionPool<F: SessionFactory> {
    factory: F,
    inner: Mutex<PoolInner<F::Session>>,
}

enum AcquireStep<S> {
    /// Existing live session, refcount already bumped
    Hit(Arc<S>),
    /// Someone else is creating; wait for them to settle, then retry
    Wait(watch::Receiver<()>),
    /// This caller became the creator and holds the settle handle
    Create(watch::Sender<()>),
}

impl<F: SessionFactory> SessionPool<F> {
    /// Create an empty pool around a session factory
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                creating: HashMap::new(),
                shut_down: false,
            }),
        }
    }

    /// Acquire the session for a project root, creating it if needed
    ///
    /// Every successful acquire must be paired with one [`release`] call.
    ///
    /// [`release`]: SessionPool::release
    pub async fn acquire(&self, root: &Path) -> Result<Arc<F::Session>, PoolError<F::Error>> {
        let key = root.to_path_buf();

        loop {
            let step = {
                let mut inner = self.inner.lock().await;
                if inner.shut_down {
                    return Err(PoolError::ShutDown);
                }

                if let Some(entry) = inner.entries.get_mut(&key) {
                    if entry.session.is_alive() {
                        entry.refcount += 1;
                        debug!(
                            "Pool hit for {:?} (refcount now {})",
                            key, entry.refcount
                        );
                        AcquireStep::Hit(Arc::clone(&entry.session))
                    } else {
                        // Dead session still in the map: evict and respawn.
                        // Remaining holders keep their Arc and see errors on
                        // use; their release becomes a no-op.
                        warn!("Evicting dead session for {:?}", key);
                        inner.entries.remove(&key);
                        self.begin_creation(&mut inner, &key)
                    }
                } else {
                    self.begin_creation(&mut inner, &key)
                }
            };

            match step {
                AcquireStep::Hit(session) => return Ok(session),
                AcquireStep::Wait(mut rx) => {
                    // Result (or cancellation) is visible in the map on retry
                    let _ = rx.changed().await;
                    continue;
                }
                AcquireStep::Create(settled_tx) => {
                    debug!("Creating session for {:?}", key);
                    let result = self.factory.create(&key).await;

                    let mut inner = self.inner.lock().await;
                    inner.creating.remove(&key);

                    let outcome = match result {
                        Ok(session) => {
                            let session = Arc::new(session);
                            inner.entries.insert(
                                key.clone(),
                                PooledEntry {
                                    session: Arc::clone(&session),
                                    refcount: 1,
                                },
                            );
                            info!("Session created for {:?}", key);
                            Ok(session)
                        }
                        Err(e) => {
                            // Failure is not cached: the next acquire retries
                            warn!("Session creation failed for {:?}: {}", key, e);
                            Err(PoolError::Create {
                                root: key.clone(),
                                source: e,
                            })
                        }
                    };
                    drop(inner);

                    // Wake waiters after the map reflects the outcome
                    let _ = settled_tx.send(());
                    return outcome;
                }
            }
        }
    }

    /// Claim creatorship or join an in-flight creation
    fn begin_creation(
        &self,
        inner: &mut PoolInner<F::Session>,
        key: &Path,
    ) -> AcquireStep<F::Session> {
        if let Some(rx) = inner.creating.get(key) {
            // A marker whose sender is gone belongs to a creator that was
            // cancelled mid-flight; take over instead of waiting forever
            if rx.has_changed().is_err() {
                debug!("Stale creation marker for {:?}, taking over", key);
                inner.creating.remove(key);
            } else {
                return AcquireStep::Wait(rx.clone());
            }
        }

        let (tx, rx) = watch::channel(());
        inner.creating.insert(key.to_path_buf(), rx);
        AcquireStep::Create(tx)
    }

    /// Release one reference to the session for a project root
    ///
    /// The last release stops the session and removes it from the pool.
    /// Stop errors are logged, never surfaced.
    pub async fn release(&self, root: &Path) {
        let to_stop = {
            let mut inner = self.inner.lock().await;
            match inner.entries.get_mut(root) {
                Some(entry) => {
                    entry.refcount -= 1;
                    debug!("Released {:?} (refcount now {})", root, entry.refcount);
                    if entry.refcount == 0 {
                        inner.entries.remove(root).map(|entry| entry.session)
                    } else {
                        None
                    }
                }
                None => {
                    // Session already evicted (death) or shut down
                    debug!("Release for untracked root {:?}", root);
                    None
                }
            }
        };

        if let Some(session) = to_stop {
            info!("Last reference released, stopping session for {:?}", root);
            session.stop().await;
        }
    }

    /// Number of pooled sessions
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the pool holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Current reference count for a root, if pooled
    pub async fn refcount(&self, root: &Path) -> Option<usize> {
        self.inner
            .lock()
            .await
            .entries
            .get(root)
            .map(|entry| entry.refcount)
    }

    /// Stop every pooled session and refuse further acquires
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.shut_down = true;
            inner.creating.clear();
            inner
                .entries
                .drain()
                .map(|(root, entry)| (root, entry.session))
                .collect()
        };

        if sessions.is_empty() {
            return;
        }

        info!("Shutting down pool ({} sessions)", sessions.len());
        let mut tasks = JoinSet::new();
        for (root, session) in sessions {
            tasks.spawn(async move {
                session.stop().await;
                debug!("Pool shutdown stopped session for {:?}", root);
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSession {
        alive: AtomicBool,
        stopped: AtomicBool,
    }

    impl FakeSession {
        fn new() -> Self {
            Self {
                alive: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PooledSession for FakeSession {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn stop(&self) {
            self.alive.store(false, Ordering::SeqCst);
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake creation failure")]
    struct FakeError;

    struct FakeFactory {
        created: AtomicUsize,
        fail: AtomicBool,
        startup_delay: Duration,
    }

    impl FakeFactory {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                startup_delay: Duration::ZERO,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                startup_delay: delay,
                ..Self::new()
            }
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        type Session = FakeSession;
        type Error = FakeError;

        async fn create(&self, _root: &Path) -> Result<FakeSession, FakeError> {
            if !self.startup_delay.is_zero() {
                tokio::time::sleep(self.startup_delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(FakeError);
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession::new())
        }
    }

    fn root_a() -> PathBuf {
        PathBuf::from("/projects/a")
    }

    fn root_b() -> PathBuf {
        PathBuf::from("/projects/b")
    }

    #[tokio::test]
    async fn test_acquire_shares_one_session_per_root() {
        let pool = SessionPool::new(FakeFactory::new());

        let first = pool.acquire(&root_a()).await.unwrap();
        let second = pool.acquire(&root_a()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.factory.created(), 1);
        assert_eq!(pool.refcount(&root_a()).await, Some(2));
    }

    #[tokio::test]
    async fn test_separate_roots_get_separate_sessions() {
        let pool = SessionPool::new(FakeFactory::new());

        let a = pool.acquire(&root_a()).await.unwrap();
        let b = pool.acquire(&root_b()).await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.factory.created(), 2);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_last_release_stops_and_evicts() {
        let pool = SessionPool::new(FakeFactory::new());

        let session = pool.acquire(&root_a()).await.unwrap();
        let _again = pool.acquire(&root_a()).await.unwrap();

        pool.release(&root_a()).await;
        assert!(session.is_alive());
        assert_eq!(pool.refcount(&root_a()).await, Some(1));

        pool.release(&root_a()).await;
        assert!(session.stopped.load(Ordering::SeqCst));
        assert!(pool.is_empty().await);

        // A fresh acquire creates a new session
        let fresh = pool.acquire(&root_a()).await.unwrap();
        assert!(!Arc::ptr_eq(&session, &fresh));
        assert_eq!(pool.factory.created(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_single_flight() {
        let pool = Arc::new(SessionPool::new(FakeFactory::with_delay(
            Duration::from_millis(50),
        )));

        let mut tasks = JoinSet::new();
        for _ in 0..5 {
            let pool = Arc::clone(&pool);
            tasks.spawn(async move { pool.acquire(&root_a()).await });
        }

        let mut sessions = Vec::new();
        while let Some(result) = tasks.join_next().await {
            sessions.push(result.unwrap().unwrap());
        }

        assert_eq!(pool.factory.created(), 1);
        assert!(sessions.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(pool.refcount(&root_a()).await, Some(5));
    }

    #[tokio::test]
    async fn test_dead_session_evicted_and_respawned() {
        let pool = SessionPool::new(FakeFactory::new());

        let dead = pool.acquire(&root_a()).await.unwrap();
        dead.kill();

        let fresh = pool.acquire(&root_a()).await.unwrap();
        assert!(!Arc::ptr_eq(&dead, &fresh));
        assert!(fresh.is_alive());
        assert_eq!(pool.factory.created(), 2);
        // The fresh entry starts with its own count, the dead one is gone
        assert_eq!(pool.refcount(&root_a()).await, Some(1));
    }

    #[tokio::test]
    async fn test_creation_failure_not_cached() {
        let pool = SessionPool::new(FakeFactory::new());
        pool.factory.fail.store(true, Ordering::SeqCst);

        let result = pool.acquire(&root_a()).await;
        assert!(matches!(result, Err(PoolError::Create { .. })));
        assert!(pool.is_empty().await);

        pool.factory.fail.store(false, Ordering::SeqCst);
        let session = pool.acquire(&root_a()).await.unwrap();
        assert!(session.is_alive());
    }

    #[tokio::test]
    async fn test_waiters_survive_creator_failure() {
        let pool = Arc::new(SessionPool::new(FakeFactory::with_delay(
            Duration::from_millis(50),
        )));
        pool.factory.fail.store(true, Ordering::SeqCst);

        let failing = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(&root_a()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Flip before the waiter retries: the creator still fails, the
        // waiter's own attempt succeeds
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                pool.factory.fail.store(false, Ordering::SeqCst);
                pool.acquire(&root_a()).await
            })
        };

        assert!(matches!(
            failing.await.unwrap(),
            Err(PoolError::Create { .. })
        ));
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(pool.refcount(&root_a()).await, Some(1));
    }

    #[tokio::test]
    async fn test_release_untracked_root_is_noop() {
        let pool = SessionPool::new(FakeFactory::new());
        pool.release(&root_a()).await;
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything_and_blocks_acquires() {
        let pool = SessionPool::new(FakeFactory::new());

        let a = pool.acquire(&root_a()).await.unwrap();
        let b = pool.acquire(&root_b()).await.unwrap();

        pool.shutdown().await;
        assert!(a.stopped.load(Ordering::SeqCst));
        assert!(b.stopped.load(Ordering::SeqCst));
        assert!(pool.is_empty().await);

        let result = pool.acquire(&root_a()).await;
        assert!(matches!(result, Err(PoolError::ShutDown)));
    }
}
