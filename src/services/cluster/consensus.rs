//! Consensus Client (C1, §4.1) — lease-based leader election over one
//! election key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::domain::errors::ConclaveResult;
use crate::domain::ports::KvStore;

const WATCHER_RESTART_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum ClusterEvent {
    Elected,
    Demoted,
    LeaderChanged(Option<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ElectionPayload {
    instance_id: String,
    elected_at: chrono::DateTime<Utc>,
    metadata: serde_json::Value,
}

/// Elects exactly one leader per cluster under `election_key`; never blocks
/// waiting for leadership on `start()`.
pub struct ConsensusClient {
    store: Arc<dyn KvStore>,
    election_key: String,
    lease_ttl: Duration,
    is_leader: Arc<AtomicBool>,
    leader_id: Arc<RwLock<Option<String>>>,
    events: broadcast::Sender<ClusterEvent>,
    running: Arc<AtomicBool>,
}

impl ConsensusClient {
    pub fn new(store: Arc<dyn KvStore>, app_prefix: &str, lease_ttl: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            store,
            election_key: format!("/{app_prefix}/leader"),
            lease_ttl,
            is_leader: Arc::new(AtomicBool::new(false)),
            leader_id: Arc::new(RwLock::new(None)),
            events: tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    pub async fn leader_id(&self) -> Option<String> {
        self.leader_id.read().await.clone()
    }

    /// Joins the campaign. Spawns a background task that re-campaigns and
    /// watches the election key for the lifetime of the process (or until
    /// `stop()`); never awaits leadership itself.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = self.store.clone();
        let election_key = self.election_key.clone();
        let lease_ttl = self.lease_ttl;
        let is_leader = self.is_leader.clone();
        let leader_id = self.leader_id.clone();
        let events = self.events.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let instance_id = store.instance_id().to_string();
            while running.load(Ordering::SeqCst) {
                if let Err(err) = campaign_and_watch(
                    store.as_ref(),
                    &election_key,
                    &instance_id,
                    lease_ttl,
                    &is_leader,
                    &leader_id,
                    &events,
                    &running,
                )
                .await
                {
                    warn!(error = %err, "consensus watcher terminated, restarting");
                    sleep(WATCHER_RESTART_BACKOFF).await;
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if self.is_leader.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(ClusterEvent::Demoted);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn campaign_and_watch(
    store: &dyn KvStore,
    election_key: &str,
    instance_id: &str,
    lease_ttl: Duration,
    is_leader: &AtomicBool,
    leader_id: &RwLock<Option<String>>,
    events: &broadcast::Sender<ClusterEvent>,
    running: &AtomicBool,
) -> ConclaveResult<()> {
    let mut subscription = store.subscribe();
    let mut renew_interval = tokio::time::interval(lease_ttl / 2);
    renew_interval.tick().await;

    loop {
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::select! {
            _ = renew_interval.tick() => {
                try_campaign_or_renew(
                    store, election_key, instance_id, lease_ttl, is_leader, leader_id, events,
                )
                .await?;
            }
            event = subscription.recv() => {
                match event {
                    Ok(event) if event.key == election_key => {
                        handle_election_change(
                            event.value, instance_id, is_leader, leader_id, events,
                        )
                        .await;
                    }
                    Ok(_) => {}
                    Err(_) => return Ok(()),
                }
            }
        }
    }
}

async fn try_campaign_or_renew(
    store: &dyn KvStore,
    election_key: &str,
    instance_id: &str,
    lease_ttl: Duration,
    is_leader: &AtomicBool,
    leader_id: &RwLock<Option<String>>,
    events: &broadcast::Sender<ClusterEvent>,
) -> ConclaveResult<()> {
    let payload = ElectionPayload {
        instance_id: instance_id.to_string(),
        elected_at: Utc::now(),
        metadata: serde_json::json!({}),
    };
    let value = serde_json::to_value(&payload)?;

    if is_leader.load(Ordering::SeqCst) {
        let current = store.get(election_key).await?;
        let renewed = store
            .compare_and_swap(election_key, current, value, Some(lease_ttl))
            .await?;
        if !renewed {
            is_leader.store(false, Ordering::SeqCst);
            *leader_id.write().await = None;
            let _ = events.send(ClusterEvent::Demoted);
            warn!("lost leadership lease on renewal");
        }
        return Ok(());
    }

    let won = store
        .set_if_absent(election_key, value, Some(lease_ttl))
        .await?;
    if won {
        is_leader.store(true, Ordering::SeqCst);
        *leader_id.write().await = Some(instance_id.to_string());
        let _ = events.send(ClusterEvent::Elected);
        let _ = events.send(ClusterEvent::LeaderChanged(Some(instance_id.to_string())));
        info!(instance_id, "elected cluster leader");
    }
    Ok(())
}

async fn handle_election_change(
    value: Option<serde_json::Value>,
    instance_id: &str,
    is_leader: &AtomicBool,
    leader_id: &RwLock<Option<String>>,
    events: &broadcast::Sender<ClusterEvent>,
) {
    let new_leader = value
        .and_then(|v| serde_json::from_value::<ElectionPayload>(v).ok())
        .map(|p| p.instance_id);

    let was_leader = is_leader.load(Ordering::SeqCst);
    let am_now_leader = new_leader.as_deref() == Some(instance_id);

    *leader_id.write().await = new_leader.clone();
    is_leader.store(am_now_leader, Ordering::SeqCst);

    if was_leader && !am_now_leader {
        let _ = events.send(ClusterEvent::Demoted);
    }
    let _ = events.send(ClusterEvent::LeaderChanged(new_leader));
}
