//! The error taxonomy for the control plane.
//!
//! Every failure in the system falls into one of five kinds, each with its
//! own propagation policy: transient (retry locally, surface only after
//! local retries are exhausted), contract violation (fail fast at ingest),
//! resource exhaustion (surface as a distinct kind so callers can queue or
//! degrade), agent-level (propagate to the workflow), fatal (propagate to
//! the process supervisor, no auto-restart).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConclaveError {
    // -- Transient --
    #[error("consensus store unavailable: {0}")]
    ConsensusStoreUnavailable(String),
    #[error("state bus unavailable: {0}")]
    StateBusUnavailable(String),
    #[error("runtime provider rpc failed: {0}")]
    ProviderRpcFailed(String),

    // -- Contract violation --
    #[error("pattern not found: {0}")]
    PatternNotFound(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("cyclic reportsTo graph detected at role {0}")]
    CyclicOrgStructure(String),
    #[error("invalid org structure: {0}")]
    InvalidOrgStructure(String),
    #[error("invalid cron expression: {0}")]
    InvalidCronExpression(String),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
    #[error("invalid select criteria: {0}")]
    InvalidSelectCriteria(String),

    // -- Resource exhaustion --
    #[error("no healthy runtime available")]
    NoHealthyRuntime,
    #[error("agent spawn quota exceeded for role {0}")]
    SpawnQuotaExceeded(String),

    // -- Agent-level --
    #[error("role not provisioned: {0}")]
    RoleNotProvisioned(String),
    #[error("step failed: {0}")]
    StepFailed(String),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("workflow cancelled")]
    Cancelled,
    #[error("agent authentication required: {0}")]
    AuthenticationRequired(String),
    #[error("agent error: {0}")]
    AgentError(String),

    // -- Fatal --
    #[error("backing store authentication failure: {0}")]
    BackingStoreAuthFailure(String),
    #[error("unrecoverable configuration error: {0}")]
    FatalConfiguration(String),

    // -- Ambient --
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type ConclaveResult<T> = Result<T, ConclaveError>;

impl ConclaveError {
    /// Network/consensus/state-bus blips: retry with backoff inside the
    /// owning component before surfacing to the caller.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConsensusStoreUnavailable(_)
                | Self::StateBusUnavailable(_)
                | Self::ProviderRpcFailed(_)
        )
    }

    /// Invalid pattern/role/cron — these must never be observed at runtime;
    /// they are rejected at ingest time.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::PatternNotFound(_)
                | Self::UnknownRole(_)
                | Self::CyclicOrgStructure(_)
                | Self::InvalidOrgStructure(_)
                | Self::InvalidCronExpression(_)
                | Self::InvalidSchedule(_)
                | Self::InvalidTrigger(_)
                | Self::InvalidSelectCriteria(_)
        )
    }

    pub const fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::NoHealthyRuntime | Self::SpawnQuotaExceeded(_))
    }

    /// Propagates to the workflow, which records it in step results and
    /// fails the workflow for `assign`.
    pub const fn is_agent_level(&self) -> bool {
        matches!(
            self,
            Self::RoleNotProvisioned(_)
                | Self::StepFailed(_)
                | Self::Timeout(_)
                | Self::Cancelled
                | Self::AuthenticationRequired(_)
                | Self::AgentError(_)
        )
    }

    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BackingStoreAuthFailure(_) | Self::FatalConfiguration(_)
        )
    }
}

impl From<sqlx::Error> for ConclaveError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ConclaveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        let err = ConclaveError::ConsensusStoreUnavailable("timeout".into());
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn classifies_contract_violations() {
        let err = ConclaveError::CyclicOrgStructure("architect".into());
        assert!(err.is_contract_violation());
        assert!(!err.is_transient());
    }

    #[test]
    fn classifies_resource_exhaustion() {
        assert!(ConclaveError::NoHealthyRuntime.is_resource_exhaustion());
    }

    #[test]
    fn classifies_agent_level() {
        let err = ConclaveError::Timeout(std::time::Duration::from_secs(30));
        assert!(err.is_agent_level());
    }

    #[test]
    fn classifies_fatal() {
        let err = ConclaveError::FatalConfiguration("missing instance id".into());
        assert!(err.is_fatal());
    }

    #[test]
    fn classifications_are_mutually_exclusive_for_sample_variants() {
        let samples: Vec<ConclaveError> = vec![
            ConclaveError::ConsensusStoreUnavailable("x".into()),
            ConclaveError::UnknownRole("x".into()),
            ConclaveError::NoHealthyRuntime,
            ConclaveError::Cancelled,
            ConclaveError::FatalConfiguration("x".into()),
        ];
        for err in samples {
            let flags = [
                err.is_transient(),
                err.is_contract_violation(),
                err.is_resource_exhaustion(),
                err.is_agent_level(),
                err.is_fatal(),
            ];
            assert_eq!(flags.iter().filter(|b| **b).count(), 1);
        }
    }
}
