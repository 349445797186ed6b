//! Output formatting and persistence for computed station metrics.
//!
//! Supports JSON printing and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::metrics::severity::Severity;
use crate::snapshot::Snapshot;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// One flattened, ranked station row as written to CSV.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRow {
    pub generated_at: DateTime<Utc>,
    pub rank: usize,
    pub station: String,
    pub observed: u64,
    pub expected: f64,
    pub evasion: f64,
    pub evasion_rate: f64,
    pub priority_score: f64,
    pub severity: Severity,
    pub alert: bool,
}

/// Flattens a snapshot into rows in ranking order.
pub fn rows(snapshot: &Snapshot) -> Vec<MetricsRow> {
    snapshot
        .ranking
        .iter()
        .filter_map(|r| snapshot.metrics.get(&r.station).map(|m| (r, m)))
        .map(|(r, m)| MetricsRow {
            generated_at: snapshot.generated_at,
            rank: r.rank,
            station: m.station.clone(),
            observed: m.observed,
            expected: m.expected,
            evasion: m.evasion,
            evasion_rate: m.evasion_rate,
            priority_score: m.priority_score,
            severity: m.severity,
            alert: snapshot.alerts.contains(&m.station),
        })
        .collect()
}

/// Writes the ranked rows as pretty-printed JSON.
pub fn write_json<W: Write>(mut out: W, snapshot: &Snapshot) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, &rows(snapshot))?;
    writeln!(out)?;
    Ok(())
}

/// Appends [`MetricsRow`] records to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records(path: &str, records: &[MetricsRow]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{Dataset, StationRecord, TapEvent, TimeBin};
    use crate::metrics::ScoringPolicy;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        let dataset = Dataset {
            stations: vec![
                StationRecord {
                    pax_am_peak: 1000.0,
                    ..StationRecord::named("Flinders Street")
                },
                StationRecord {
                    pax_am_peak: 100.0,
                    ..StationRecord::named("Jolimont")
                },
            ],
            events: vec![
                TapEvent {
                    station: "Flinders Street".into(),
                    time_bin: TimeBin::AmPeak,
                    count: 600,
                    timestamp: None,
                },
                TapEvent {
                    station: "Jolimont".into(),
                    time_bin: TimeBin::AmPeak,
                    count: 10,
                    timestamp: None,
                },
            ],
        };
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Snapshot::build(1, &dataset, &ScoringPolicy::default(), now).unwrap()
    }

    #[test]
    fn test_rows_follow_ranking() {
        let snap = snapshot();
        let rows = rows(&snap);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].station, "Jolimont");
        assert!(rows[0].alert);
    }

    #[test]
    fn test_write_json() {
        let mut buf = Vec::new();
        write_json(&mut buf, &snapshot()).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["severity"], "high");
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        let path = path.to_str().unwrap();

        let rows = rows(&snapshot());
        append_records(path, &rows).unwrap();
        append_records(path, &rows).unwrap();

        let content = fs::read_to_string(path).unwrap();
        // Header line should appear exactly once
        let header_count = content.lines().filter(|l| l.starts_with("generated_at")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 appends of 2 rows
        assert_eq!(content.lines().count(), 5);
    }
}
