//! Lock Service (C2, §4.2) — fenced distributed mutex with auto-renewal.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::domain::errors::{ConclaveError, ConclaveResult};
use crate::domain::models::Lock;
use crate::domain::ports::KvStore;

const RENEW_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    pub ttl: Duration,
    pub wait: bool,
    pub wait_timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        let ttl = Duration::from_secs(30);
        Self {
            ttl,
            wait: false,
            wait_timeout: ttl * 2,
        }
    }
}

/// Tracks the auto-renewal task for one held lock so `release` can cancel it.
struct Renewal {
    handle: tokio::task::JoinHandle<()>,
    lost: Arc<AtomicBool>,
}

pub struct LockService {
    store: Arc<dyn KvStore>,
    app_prefix: String,
    renewals: tokio::sync::Mutex<std::collections::HashMap<String, Renewal>>,
}

impl LockService {
    pub fn new(store: Arc<dyn KvStore>, app_prefix: impl Into<String>) -> Self {
        Self {
            store,
            app_prefix: app_prefix.into(),
            renewals: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn key(&self, resource: &str) -> String {
        format!("{}:lock:{}", self.app_prefix, resource)
    }

    /// `true` if the lock's auto-renewal task detected loss since acquire.
    pub async fn is_lost(&self, lock: &Lock) -> bool {
        self.renewals
            .lock()
            .await
            .get(&lock.resource_key)
            .is_some_and(|r| r.lost.load(Ordering::SeqCst))
    }

    pub async fn acquire(&self, resource: &str, opts: AcquireOptions) -> ConclaveResult<Option<Lock>> {
        let key = self.key(resource);
        let deadline = tokio::time::Instant::now() + opts.wait_timeout;

        loop {
            let token = Uuid::new_v4().to_string();
            let won = self
                .store
                .set_if_absent(&key, serde_json::json!(token), Some(opts.ttl))
                .await?;
            if won {
                let now = chrono::Utc::now();
                let lock = Lock {
                    resource_key: resource.to_string(),
                    fencing_token: token,
                    acquired_at: now,
                    expires_at: now + chrono::Duration::from_std(opts.ttl).unwrap_or_default(),
                };
                self.start_renewal(lock.clone(), opts.ttl).await;
                return Ok(Some(lock));
            }
            if !opts.wait || tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(RENEW_POLL).await;
        }
    }

    /// Non-blocking: `acquire` with `wait=false` regardless of `opts`.
    pub async fn try_acquire(&self, resource: &str, ttl: Duration) -> ConclaveResult<Option<Lock>> {
        self.acquire(
            resource,
            AcquireOptions {
                ttl,
                wait: false,
                wait_timeout: Duration::ZERO,
            },
        )
        .await
    }

    pub async fn release(&self, lock: &Lock) -> ConclaveResult<bool> {
        self.stop_renewal(&lock.resource_key).await;
        let key = self.key(&lock.resource_key);
        self.store
            .compare_and_delete(&key, serde_json::json!(lock.fencing_token))
            .await
    }

    pub async fn extend(&self, lock: &mut Lock, ttl: Duration) -> ConclaveResult<bool> {
        let key = self.key(&lock.resource_key);
        let extended = self
            .store
            .compare_and_swap(
                &key,
                Some(serde_json::json!(lock.fencing_token)),
                serde_json::json!(lock.fencing_token),
                Some(ttl),
            )
            .await?;
        if extended {
            lock.expires_at =
                chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        }
        Ok(extended)
    }

    /// Scoped acquisition with guaranteed release on every exit path,
    /// including `f`'s own failure, which propagates unchanged.
    pub async fn with_lock<T, F, Fut>(
        &self,
        resource: &str,
        opts: AcquireOptions,
        f: F,
    ) -> ConclaveResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConclaveResult<T>>,
    {
        let lock = self
            .acquire(resource, opts)
            .await?
            .ok_or_else(|| ConclaveError::StepFailed(format!("could not acquire lock {resource}")))?;
        let result = f().await;
        let _ = self.release(&lock).await;
        result
    }

    /// Non-blocking variant of `with_lock`: `None` if not acquired.
    pub async fn try_with_lock<T, F, Fut>(
        &self,
        resource: &str,
        ttl: Duration,
        f: F,
    ) -> ConclaveResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConclaveResult<T>>,
    {
        let Some(lock) = self.try_acquire(resource, ttl).await? else {
            return Ok(None);
        };
        let result = f().await;
        let _ = self.release(&lock).await;
        Ok(Some(result?))
    }

    async fn start_renewal(&self, lock: Lock, ttl: Duration) {
        let store = self.store.clone();
        let key = self.key(&lock.resource_key);
        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = lost.clone();
        let token = lock.fencing_token.clone();
        let resource = lock.resource_key.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl / 2);
            interval.tick().await;
            loop {
                interval.tick().await;
                let renewed = store
                    .compare_and_swap(
                        &key,
                        Some(serde_json::json!(token)),
                        serde_json::json!(token),
                        Some(ttl),
                    )
                    .await
                    .unwrap_or(false);
                if !renewed {
                    warn!(resource, "lock renewal failed, marking lost");
                    lost_flag.store(true, Ordering::SeqCst);
                    return;
                }
            }
        });

        self.renewals
            .lock()
            .await
            .insert(lock.resource_key.clone(), Renewal { handle, lost });
    }

    async fn stop_renewal(&self, resource: &str) {
        if let Some(renewal) = self.renewals.lock().await.remove(resource) {
            renewal.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryKvStore;

    fn service() -> LockService {
        LockService::new(Arc::new(MemoryKvStore::new("n1")), "app")
    }

    #[tokio::test]
    async fn second_acquire_fails_while_first_holds() {
        let svc = service();
        let lock1 = svc
            .acquire("res", AcquireOptions::default())
            .await
            .unwrap();
        assert!(lock1.is_some());
        let lock2 = svc
            .try_acquire("res", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(lock2.is_none());
    }

    #[tokio::test]
    async fn release_then_reacquire_succeeds() {
        let svc = service();
        let lock = svc.acquire("res", AcquireOptions::default()).await.unwrap().unwrap();
        assert!(svc.release(&lock).await.unwrap());
        let lock2 = svc.try_acquire("res", Duration::from_secs(5)).await.unwrap();
        assert!(lock2.is_some());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let svc = service();
        let lock = svc.acquire("res", AcquireOptions::default()).await.unwrap().unwrap();
        assert!(svc.release(&lock).await.unwrap());
        assert!(!svc.release(&lock).await.unwrap());
    }

    #[tokio::test]
    async fn distinct_acquisitions_get_distinct_fencing_tokens() {
        let svc = service();
        let lock1 = svc.acquire("res", AcquireOptions::default()).await.unwrap().unwrap();
        svc.release(&lock1).await.unwrap();
        let lock2 = svc.acquire("res", AcquireOptions::default()).await.unwrap().unwrap();
        assert_ne!(lock1.fencing_token, lock2.fencing_token);
    }

    #[tokio::test]
    async fn with_lock_releases_on_closure_failure() {
        let svc = service();
        let result: ConclaveResult<()> = svc
            .with_lock("res", AcquireOptions::default(), || async {
                Err(ConclaveError::Cancelled)
            })
            .await;
        assert!(result.is_err());
        let lock = svc.try_acquire("res", Duration::from_secs(5)).await.unwrap();
        assert!(lock.is_some());
    }
}
