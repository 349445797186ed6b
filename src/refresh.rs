//! Timer that periodically rebuilds the snapshot.

use crate::snapshot::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, error, info, warn};

/// Longest period the driver accepts. Configuration rejects anything larger.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Spawns the refresh loop onto the current tokio runtime.
///
/// The first reload happens one `period` after the call, since the store was
/// just bootstrapped. A failed reload is logged and the loop carries on; the
/// next tick tries again.
pub fn spawn_refresh(store: Arc<SnapshotStore>, period: Duration) -> JoinHandle<()> {
    let period = period.clamp(Duration::from_millis(1), MAX_REFRESH_INTERVAL);
    let span = tracing::info_span!("refresh_driver", period_secs = period.as_secs_f64());

    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Refresh driver started");

            loop {
                interval.tick().await;

                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.trigger_reload()).await {
                    Ok(Ok(generation)) => {
                        info!(generation, "Scheduled refresh complete");
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Scheduled refresh failed, retrying next tick");
                    }
                    Err(e) => {
                        error!(error = %e, "Refresh task panicked");
                    }
                }
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DataSources;
    use crate::metrics::ScoringPolicy;
    use std::fs;
    use tempfile::TempDir;

    const STATIONS: &str = "Stop_name,Stop_lat,Stop_long,Pax_annual,Pax_weekday,Pax_AM_peak,Pax_PM_peak,Pax_Saturday,Pax_Sunday\n\
        Southern Cross,-37.8184,144.9525,20000000,60000,500,500,20000,15000\n";
    const TAPS: &str = "Stop_name,time_bin,actual\nSouthern Cross,PM_peak,400\n";

    fn store(dir: &TempDir) -> Arc<SnapshotStore> {
        fs::write(dir.path().join("expected.csv"), STATIONS).unwrap();
        fs::write(dir.path().join("taps.csv"), TAPS).unwrap();
        let sources = DataSources {
            stations: dir.path().join("expected.csv"),
            taps: dir.path().join("taps.csv"),
        };
        Arc::new(SnapshotStore::bootstrap(sources, ScoringPolicy::default()).unwrap())
    }

    async fn wait_for_generation(store: &SnapshotStore, at_least: u64) -> bool {
        for _ in 0..200 {
            if store.snapshot().generation >= at_least {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_driver_publishes_on_each_tick() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let handle = spawn_refresh(store.clone(), Duration::from_millis(20));
        assert!(wait_for_generation(&store, 3).await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_driver_survives_failed_reloads() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::remove_file(dir.path().join("taps.csv")).unwrap();

        let handle = spawn_refresh(store.clone(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.snapshot().generation, 1);
        assert!(store.last_failure().is_some());

        fs::write(dir.path().join("taps.csv"), TAPS).unwrap();
        assert!(wait_for_generation(&store, 2).await);

        handle.abort();
    }
}
