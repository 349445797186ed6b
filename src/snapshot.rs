//! The published, read-only view of the aggregated data.
//!
//! [`SnapshotStore`] holds the current [`Snapshot`] behind an `Arc`. Readers
//! clone the `Arc` and keep working with it for as long as they like; a
//! reload builds a complete new snapshot off to the side and replaces the
//! pointer in one step, so nobody ever sees a half-built one.

use crate::loader::{self, DataLoadError, DataSources, Dataset, StationRecord};
use crate::metrics::rank::alert_details;
use crate::metrics::summary::summarize;
use crate::metrics::timeline::hourly_timeline;
use crate::metrics::types::{AlertDetail, NetworkSummary, RankedStation, StationMetrics, Timeline};
use crate::metrics::{self, ComputationError, ScoringPolicy};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Load(#[from] DataLoadError),

    #[error("aggregation produced inconsistent metrics: {0}")]
    Computation(#[from] ComputationError),
}

/// Everything derived from one successful load.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
    pub stations: Vec<StationRecord>,
    pub metrics: BTreeMap<String, StationMetrics>,
    pub ranking: Vec<RankedStation>,
    pub alerts: Vec<String>,
    pub alert_details: Vec<AlertDetail>,
    pub summary: NetworkSummary,
    pub timeline: Timeline,
}

impl Snapshot {
    /// Runs aggregation, ranking and the derived views over `dataset`.
    #[tracing::instrument(skip(dataset, policy), fields(stations = dataset.stations.len(), events = dataset.events.len()))]
    pub fn build(
        generation: u64,
        dataset: &Dataset,
        policy: &ScoringPolicy,
        local_now: NaiveDateTime,
    ) -> Result<Self, ComputationError> {
        let metrics = metrics::compute(&dataset.stations, &dataset.events, policy);
        metrics::check_invariants(&dataset.stations, &metrics)?;

        let ranking = metrics::rank(&metrics);
        let alerts = metrics::alerts(&ranking, policy.alert_threshold, policy.max_alerts);
        let alert_details = alert_details(&alerts, &metrics, policy.fine_amount);
        let summary = summarize(&dataset.stations, &metrics, policy);
        let timeline = hourly_timeline(
            &dataset.stations,
            &dataset.events,
            local_now,
            policy.average_fare,
        );

        Ok(Snapshot {
            generation,
            generated_at: Utc::now(),
            stations: dataset.stations.clone(),
            metrics,
            ranking,
            alerts,
            alert_details,
            summary,
            timeline,
        })
    }
}

/// Why the most recent reload did not publish.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadFailure {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Owner of the current snapshot.
pub struct SnapshotStore {
    sources: DataSources,
    policy: ScoringPolicy,
    current: RwLock<Arc<Snapshot>>,
    last_failure: RwLock<Option<ReloadFailure>>,
    // Serializes reloads so generations are published in order.
    reload_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Performs the initial load. Failure here means there is nothing to
    /// serve, so callers should treat it as fatal.
    pub fn bootstrap(sources: DataSources, policy: ScoringPolicy) -> Result<Self, ReloadError> {
        let dataset = loader::load(&sources)?;
        let snapshot = Snapshot::build(1, &dataset, &policy, Local::now().naive_local())?;

        info!(
            generation = snapshot.generation,
            stations = snapshot.metrics.len(),
            alerts = snapshot.alerts.len(),
            "Initial snapshot published"
        );

        Ok(Self {
            sources,
            policy,
            current: RwLock::new(Arc::new(snapshot)),
            last_failure: RwLock::new(None),
            reload_lock: Mutex::new(()),
        })
    }

    /// The current snapshot. Never waits on a reload in progress.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn ranking(&self) -> Vec<RankedStation> {
        self.snapshot().ranking.clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.snapshot().alerts.clone()
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub fn last_failure(&self) -> Option<ReloadFailure> {
        self.last_failure.read().clone()
    }

    /// Reloads both input files and publishes a new snapshot.
    ///
    /// On failure the previous snapshot stays current and the error is
    /// returned. Safe to call from several threads at once; concurrent calls
    /// run one after another.
    #[tracing::instrument(skip(self))]
    pub fn trigger_reload(&self) -> Result<u64, ReloadError> {
        let _guard = self.reload_lock.lock();

        match self.rebuild() {
            Ok(snapshot) => {
                let generation = snapshot.generation;
                let alerts = snapshot.alerts.len();
                *self.current.write() = Arc::new(snapshot);
                *self.last_failure.write() = None;

                info!(generation, alerts, "Snapshot published");
                Ok(generation)
            }
            Err(e) => {
                match &e {
                    ReloadError::Load(_) => {
                        warn!(error = %e, "Reload failed, keeping previous snapshot");
                    }
                    ReloadError::Computation(_) => {
                        error!(error = %e, "Aggregation invariant violated, this is a bug");
                    }
                }
                *self.last_failure.write() = Some(ReloadFailure {
                    at: Utc::now(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn rebuild(&self) -> Result<Snapshot, ReloadError> {
        let dataset = loader::load(&self.sources)?;
        let next = self.current.read().generation + 1;
        Ok(Snapshot::build(
            next,
            &dataset,
            &self.policy,
            Local::now().naive_local(),
        )?)
    }
}
