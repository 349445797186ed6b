use crate::loader::{StationRecord, TapEvent};
use crate::metrics::policy::ScoringPolicy;
use crate::metrics::severity::{STATION_BANDS, severity};
use crate::metrics::types::StationMetrics;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// Raised when derived metrics break an invariant the clamps in [`compute`]
/// are supposed to guarantee. Any occurrence is a bug, not bad input.
#[derive(Debug, Error)]
pub enum ComputationError {
    #[error("station `{station}` has evasion rate {rate} outside [0, 1]")]
    RateOutOfRange { station: String, rate: f64 },

    #[error("station `{station}` has non-finite priority score {score}")]
    NonFiniteScore { station: String, score: f64 },

    #[error("expected {expected} stations in output, found {found}")]
    StationCountMismatch { expected: usize, found: usize },
}

/// Joins tap-on events to stations and derives per-station evasion metrics.
///
/// Every station appears exactly once in the output, including stations with
/// no matching events. Events naming a station that is not in `stations` are
/// ignored. The function is pure: identical input yields identical output.
pub fn compute(
    stations: &[StationRecord],
    events: &[TapEvent],
    policy: &ScoringPolicy,
) -> BTreeMap<String, StationMetrics> {
    let mut by_station: HashMap<&str, Vec<&TapEvent>> = HashMap::new();
    for event in events {
        by_station.entry(event.station.as_str()).or_default().push(event);
    }

    let mut out = BTreeMap::new();

    for station in stations {
        let matched = by_station.remove(station.name.as_str()).unwrap_or_default();

        let mut observed = 0u64;
        let mut observed_by_bin = BTreeMap::new();
        for event in &matched {
            observed = observed.saturating_add(event.count);
            *observed_by_bin.entry(event.time_bin).or_insert(0u64) += event.count;
        }

        let expected = policy.expected_taps(station);
        let expected = if expected.is_finite() { expected.max(0.0) } else { 0.0 };

        // No sample is not evidence of evasion; only measured stations score.
        let (evasion, evasion_rate, priority_score) = if matched.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let evasion = (expected - observed as f64).max(0.0);
            let evasion_rate = if expected > 0.0 {
                (evasion / expected).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (evasion, evasion_rate, policy.priority_score(evasion_rate, evasion))
        };

        out.insert(
            station.name.clone(),
            StationMetrics {
                station: station.name.clone(),
                observed,
                expected,
                evasion,
                evasion_rate,
                priority_score,
                severity: severity(evasion_rate, STATION_BANDS),
                events_matched: matched.len(),
                observed_by_bin,
                pax_annual: station.pax_annual,
                daily_average: station.daily_average(),
                peak_ratio: station.peak_ratio(),
                weekend_ratio: station.weekend_ratio(),
            },
        );
    }

    if !by_station.is_empty() {
        let unmatched: usize = by_station.values().map(Vec::len).sum();
        debug!(
            unmatched_events = unmatched,
            unknown_stations = by_station.len(),
            "Ignoring tap-on events for unknown stations"
        );
    }

    out
}

/// Verifies the invariants [`compute`] promises.
pub fn check_invariants(
    stations: &[StationRecord],
    metrics: &BTreeMap<String, StationMetrics>,
) -> Result<(), ComputationError> {
    if metrics.len() != stations.len() {
        return Err(ComputationError::StationCountMismatch {
            expected: stations.len(),
            found: metrics.len(),
        });
    }

    for m in metrics.values() {
        if !(0.0..=1.0).contains(&m.evasion_rate) {
            return Err(ComputationError::RateOutOfRange {
                station: m.station.clone(),
                rate: m.evasion_rate,
            });
        }
        if !m.priority_score.is_finite() {
            return Err(ComputationError::NonFiniteScore {
                station: m.station.clone(),
                score: m.priority_score,
            });
        }
    }

    Ok(())
}
