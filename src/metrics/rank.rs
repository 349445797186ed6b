use crate::metrics::types::{AlertDetail, RankedStation, StationMetrics};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Orders stations by priority score descending, then by name ascending.
pub fn rank(metrics: &BTreeMap<String, StationMetrics>) -> Vec<RankedStation> {
    let mut ordered: Vec<&StationMetrics> = metrics.values().collect();
    ordered.sort_by(|a, b| by_score_then_name(a.priority_score, &a.station, b.priority_score, &b.station));

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, m)| RankedStation {
            rank: i + 1,
            station: m.station.clone(),
            score: m.priority_score,
            evasion_rate: m.evasion_rate,
            severity: m.severity,
        })
        .collect()
}

/// Returns the prefix of `ranked` scoring strictly above `threshold`, at most
/// `max_count` names long.
pub fn alerts(ranked: &[RankedStation], threshold: f64, max_count: usize) -> Vec<String> {
    ranked
        .iter()
        .take_while(|r| r.score > threshold)
        .take(max_count)
        .map(|r| r.station.clone())
        .collect()
}

/// Expands alert names with the figures shown beside them.
pub fn alert_details(
    alert_names: &[String],
    metrics: &BTreeMap<String, StationMetrics>,
    fine_amount: f64,
) -> Vec<AlertDetail> {
    alert_names
        .iter()
        .filter_map(|name| metrics.get(name))
        .map(|m| AlertDetail {
            station: m.station.clone(),
            priority_score: m.priority_score,
            evasion_rate: m.evasion_rate,
            severity: m.severity,
            expected_fines: m.evasion * fine_amount,
        })
        .collect()
}

/// Stations ordered by absolute evasion, largest first.
pub fn evasion_summary(metrics: &BTreeMap<String, StationMetrics>) -> Vec<&StationMetrics> {
    let mut ordered: Vec<&StationMetrics> = metrics.values().collect();
    ordered.sort_by(|a, b| by_score_then_name(a.evasion, &a.station, b.evasion, &b.station));
    ordered
}

fn by_score_then_name(a_score: f64, a_name: &str, b_score: f64, b_name: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_name.cmp(b_name))
}
