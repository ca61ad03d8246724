//! Bootstrap wiring: the one place that owns every long-lived component
//! and is responsible for starting and stopping them in order.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::adapters::memory::MemoryKvStore;
use crate::adapters::sqlite::{initialize_database, SqliteScheduleRepository, SqliteTriggerRepository};
use crate::domain::errors::ConclaveResult;
use crate::domain::ports::KvStore;
use crate::infrastructure::config::{Config, ConfigLoader};
use crate::infrastructure::logging::LoggerImpl;
use crate::services::audit::LoggingAuditSink;
use crate::services::cluster::{ClusterHealth, ConsensusClient, LockService, StateBus};
use crate::services::orgchart::{PatternCatalog, PatternExecutor, WorkflowEngine};
use crate::services::runtime::RuntimeFederation;
use crate::services::scheduler::Scheduler;
use crate::services::trigger::TriggerDispatcher;

/// Owns every component constructed at startup. Fields are dropped (and,
/// for the spawned loops, aborted via `shutdown`) in the reverse of the
/// order they were created in `Application::bootstrap`.
pub struct Application {
    pub config: Config,
    pub pool: SqlitePool,
    pub store: Arc<dyn KvStore>,
    pub consensus: Arc<ConsensusClient>,
    pub locks: Arc<LockService>,
    pub state_bus: Arc<StateBus>,
    pub health: Arc<ClusterHealth>,
    pub federation: Arc<RuntimeFederation>,
    pub catalog: Arc<PatternCatalog>,
    pub scheduler: Arc<Scheduler>,
    pub triggers: Arc<TriggerDispatcher>,
    pub audit: Arc<LoggingAuditSink>,
    scheduler_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Application {
    /// Loads configuration, initializes logging and the database, and
    /// wires every service together. Does not start the background loops
    /// (`scheduler.start()`, `health.start()`) — call `run` for that.
    pub async fn bootstrap() -> ConclaveResult<Self> {
        let config = ConfigLoader::load()
            .map_err(|e| crate::domain::errors::ConclaveError::FatalConfiguration(e.to_string()))?;

        let _logger = LoggerImpl::init(&config.logging)
            .map_err(|e| crate::domain::errors::ConclaveError::FatalConfiguration(e.to_string()))?;

        let pool = initialize_database(&config.database.path)
            .await
            .map_err(|e| crate::domain::errors::ConclaveError::Database(e.to_string()))?;

        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new(config.instance_id.clone()));

        let lease_ttl = Duration::from_millis(config.cluster.lease_ttl_ms);
        let consensus = Arc::new(ConsensusClient::new(store.clone(), &config.app_prefix, lease_ttl));
        let locks = Arc::new(LockService::new(store.clone(), config.app_prefix.clone()));
        let state_bus = Arc::new(StateBus::new(store.clone(), config.app_prefix.clone()));

        let health = Arc::new(
            ClusterHealth::new(
                state_bus.clone(),
                consensus.clone(),
                config.instance_id.clone(),
                "localhost",
                0,
            )
            .with_intervals(
                Duration::from_millis(config.cluster.heartbeat_interval_ms),
                Duration::from_millis(config.cluster.health_timeout_ms),
            ),
        );

        let federation = Arc::new(RuntimeFederation::new());
        let engine = WorkflowEngine::new(federation.clone());
        let catalog = Arc::new(PatternCatalog::new(engine));

        let schedule_repo = Arc::new(SqliteScheduleRepository::new(pool.clone()));
        let trigger_repo = Arc::new(SqliteTriggerRepository::new(pool.clone()));

        let scheduler = Arc::new(
            Scheduler::new(schedule_repo, consensus.clone(), locks.clone(), catalog.clone())
                .with_poll_interval(Duration::from_millis(config.scheduler.poll_interval_ms)),
        );

        let triggers = Arc::new(TriggerDispatcher::new(
            trigger_repo,
            catalog.clone() as Arc<dyn PatternExecutor>,
        ));
        triggers.load().await?;

        let audit = Arc::new(LoggingAuditSink);

        Ok(Self {
            config,
            pool,
            store,
            consensus,
            locks,
            state_bus,
            health,
            federation,
            catalog,
            scheduler,
            triggers,
            audit,
            scheduler_handle: None,
        })
    }

    /// Starts the background loops (cluster heartbeat, scheduler poll).
    /// Idempotent only in the sense that calling it twice spawns a second
    /// set of loops; callers should call it once after `bootstrap`.
    pub fn run(&mut self) {
        self.health.start();
        self.scheduler_handle = Some(self.scheduler.clone().start());
    }

    /// Aborts the spawned loops. Components without a loop (the `KvStore`,
    /// the pool) are torn down by `Drop` when `self` goes out of scope.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.scheduler_handle.take() {
            handle.abort();
        }
    }
}
