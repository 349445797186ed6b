//! Data types produced by the aggregation pipeline.

use crate::loader::TimeBin;
use crate::metrics::severity::Severity;
use serde::Serialize;
use std::collections::BTreeMap;

/// Derived evasion figures for one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMetrics {
    pub station: String,
    /// Sum of matched tap-on counts.
    pub observed: u64,
    /// Expected compliant taps under the scoring policy.
    pub expected: f64,
    /// `max(expected - observed, 0)`
    pub evasion: f64,
    /// `evasion / expected`, clamped to [0, 1]; 0 when nothing is expected.
    pub evasion_rate: f64,
    pub priority_score: f64,
    pub severity: Severity,
    pub events_matched: usize,
    pub observed_by_bin: BTreeMap<TimeBin, u64>,

    pub pax_annual: f64,
    pub daily_average: f64,
    pub peak_ratio: f64,
    pub weekend_ratio: f64,
}

/// One row of the priority ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStation {
    pub rank: usize,
    pub station: String,
    pub score: f64,
    pub evasion_rate: f64,
    pub severity: Severity,
}

/// An alert entry expanded with the figures the dashboard shows next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDetail {
    pub station: String,
    pub priority_score: f64,
    pub evasion_rate: f64,
    pub severity: Severity,
    pub expected_fines: f64,
}

/// Network-wide totals shown on the dashboard header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub total_stations: usize,
    pub total_annual_passengers: f64,
    pub avg_daily_passengers: f64,
    pub busiest_station: String,
    pub quietest_station: String,
    /// Observed / expected taps, as a percentage.
    pub compliance_rate: f64,
    pub total_evasion: f64,
    pub revenue_impact: f64,
    pub high_risk_stations: usize,
}

/// One simulated hour of the 24-hour timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyRecord {
    pub station: String,
    pub timestamp: String,
    pub hour: u32,
    pub time_bin: TimeBin,
    pub expected: u64,
    pub actual: u64,
    pub evasion_rate: f64,
    pub expected_fines: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyAlert {
    pub station: String,
    pub timestamp: String,
    pub evasion_rate: f64,
    pub severity: Severity,
    pub expected_fines: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    pub records: Vec<HourlyRecord>,
    pub alerts: Vec<HourlyAlert>,
}
