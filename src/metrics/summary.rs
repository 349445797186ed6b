use crate::loader::StationRecord;
use crate::metrics::policy::ScoringPolicy;
use crate::metrics::types::{NetworkSummary, StationMetrics};
use crate::metrics::utility::{mean, safe_ratio};
use std::collections::BTreeMap;

/// Network-wide totals for the dashboard header.
pub fn summarize(
    stations: &[StationRecord],
    metrics: &BTreeMap<String, StationMetrics>,
    policy: &ScoringPolicy,
) -> NetworkSummary {
    let by_volume = stations_by_volume(stations);

    let daily: Vec<f64> = stations.iter().map(StationRecord::daily_average).collect();

    let total_expected: f64 = metrics.values().map(|m| m.expected).sum();
    let total_observed: f64 = metrics.values().map(|m| m.observed as f64).sum();
    let total_evasion: f64 = metrics.values().map(|m| m.evasion).sum();

    NetworkSummary {
        total_stations: stations.len(),
        total_annual_passengers: stations.iter().map(|s| s.pax_annual).sum(),
        avg_daily_passengers: mean(&daily),
        busiest_station: by_volume.first().map(|s| s.name.clone()).unwrap_or_default(),
        quietest_station: by_volume.last().map(|s| s.name.clone()).unwrap_or_default(),
        compliance_rate: safe_ratio(total_observed, total_expected) * 100.0,
        total_evasion,
        revenue_impact: total_evasion * policy.average_fare,
        high_risk_stations: metrics
            .values()
            .filter(|m| m.evasion_rate > policy.high_risk_rate)
            .count(),
    }
}

/// Stations ordered busiest first by annual passengers, ties by name.
pub fn stations_by_volume(stations: &[StationRecord]) -> Vec<&StationRecord> {
    let mut ordered: Vec<&StationRecord> = stations.iter().collect();
    ordered.sort_by(|a, b| {
        b.pax_annual
            .total_cmp(&a.pax_annual)
            .then_with(|| a.name.cmp(&b.name))
    });
    ordered
}
