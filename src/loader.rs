//! CSV loading for station metadata and sample tap-on events.
//!
//! Both files are parsed by header name. A file that lacks one of the
//! required columns is rejected outright instead of being read with
//! defaulted values.

use crate::metrics::utility::safe_ratio;
use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Columns that must be present in the station metadata file.
pub const STATION_COLUMNS: &[&str] = &[
    "Stop_name",
    "Stop_lat",
    "Stop_long",
    "Pax_annual",
    "Pax_weekday",
    "Pax_AM_peak",
    "Pax_PM_peak",
    "Pax_Saturday",
    "Pax_Sunday",
];

/// Columns that must be present in the tap-on sample file. `timestamp` is optional.
pub const TAP_COLUMNS: &[&str] = &["Stop_name", "time_bin", "actual"];

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is missing required column `{column}`", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{}: malformed row at line {line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("{}: duplicate station `{name}`", path.display())]
    DuplicateStation { path: PathBuf, name: String },
}

/// Operating period a tap-on count was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeBin {
    #[serde(rename = "pre_AM_peak")]
    PreAmPeak,
    #[serde(rename = "AM_peak")]
    AmPeak,
    #[serde(rename = "interpeak")]
    Interpeak,
    #[serde(rename = "PM_peak")]
    PmPeak,
    #[serde(rename = "PM_late")]
    PmLate,
}

impl TimeBin {
    pub const ALL: [TimeBin; 5] = [
        TimeBin::PreAmPeak,
        TimeBin::AmPeak,
        TimeBin::Interpeak,
        TimeBin::PmPeak,
        TimeBin::PmLate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBin::PreAmPeak => "pre_AM_peak",
            TimeBin::AmPeak => "AM_peak",
            TimeBin::Interpeak => "interpeak",
            TimeBin::PmPeak => "PM_peak",
            TimeBin::PmLate => "PM_late",
        }
    }

    /// Maps an hour of the day (0-23) to its operating period.
    pub fn for_hour(hour: u32) -> TimeBin {
        match hour {
            6 | 7 => TimeBin::PreAmPeak,
            8 | 9 => TimeBin::AmPeak,
            10..=15 => TimeBin::Interpeak,
            16 | 17 => TimeBin::PmPeak,
            _ => TimeBin::PmLate,
        }
    }
}

impl fmt::Display for TimeBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One station and its published patronage figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pax_annual: f64,
    pub pax_weekday: f64,
    pub pax_am_peak: f64,
    pub pax_pm_peak: f64,
    pub pax_saturday: f64,
    pub pax_sunday: f64,
}

impl StationRecord {
    /// Creates a record with every volume zeroed. Mostly useful for tests
    /// and for filling in fields with struct update syntax.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latitude: None,
            longitude: None,
            pax_annual: 0.0,
            pax_weekday: 0.0,
            pax_am_peak: 0.0,
            pax_pm_peak: 0.0,
            pax_saturday: 0.0,
            pax_sunday: 0.0,
        }
    }

    pub fn peak_volume(&self) -> f64 {
        self.pax_am_peak + self.pax_pm_peak
    }

    pub fn weekend_volume(&self) -> f64 {
        self.pax_saturday + self.pax_sunday
    }

    pub fn daily_average(&self) -> f64 {
        self.pax_annual / 365.0
    }

    pub fn peak_ratio(&self) -> f64 {
        safe_ratio(self.peak_volume(), self.pax_weekday)
    }

    pub fn weekend_ratio(&self) -> f64 {
        safe_ratio(self.weekend_volume(), 2.0 * self.pax_weekday)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// One sampled tap-on observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapEvent {
    pub station: String,
    pub time_bin: TimeBin,
    pub count: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Locations of the two input files.
#[derive(Debug, Clone)]
pub struct DataSources {
    pub stations: PathBuf,
    pub taps: PathBuf,
}

/// Everything the loader produces in one pass.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub stations: Vec<StationRecord>,
    pub events: Vec<TapEvent>,
}

#[derive(Debug, Deserialize)]
struct StationRow {
    #[serde(rename = "Stop_name")]
    name: String,
    #[serde(rename = "Stop_lat")]
    latitude: Option<f64>,
    #[serde(rename = "Stop_long")]
    longitude: Option<f64>,
    #[serde(rename = "Pax_annual")]
    pax_annual: Option<f64>,
    #[serde(rename = "Pax_weekday")]
    pax_weekday: Option<f64>,
    #[serde(rename = "Pax_AM_peak")]
    pax_am_peak: Option<f64>,
    #[serde(rename = "Pax_PM_peak")]
    pax_pm_peak: Option<f64>,
    #[serde(rename = "Pax_Saturday")]
    pax_saturday: Option<f64>,
    #[serde(rename = "Pax_Sunday")]
    pax_sunday: Option<f64>,
}

impl From<StationRow> for StationRecord {
    fn from(row: StationRow) -> Self {
        StationRecord {
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            pax_annual: row.pax_annual.unwrap_or(0.0),
            pax_weekday: row.pax_weekday.unwrap_or(0.0),
            pax_am_peak: row.pax_am_peak.unwrap_or(0.0),
            pax_pm_peak: row.pax_pm_peak.unwrap_or(0.0),
            pax_saturday: row.pax_saturday.unwrap_or(0.0),
            pax_sunday: row.pax_sunday.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TapRow {
    #[serde(rename = "Stop_name")]
    station: String,
    time_bin: TimeBin,
    actual: Option<u64>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Loads both input files.
#[tracing::instrument(skip_all, fields(stations = %sources.stations.display(), taps = %sources.taps.display()))]
pub fn load(sources: &DataSources) -> Result<Dataset, DataLoadError> {
    let stations = load_stations(&sources.stations)?;
    let events = load_tap_events(&sources.taps)?;

    info!(
        stations = stations.len(),
        events = events.len(),
        "Input data loaded"
    );

    Ok(Dataset { stations, events })
}

/// Reads the station metadata CSV.
pub fn load_stations(path: &Path) -> Result<Vec<StationRecord>, DataLoadError> {
    let mut rdr = open_csv(path, STATION_COLUMNS)?;
    let mut seen = HashSet::new();
    let mut stations = Vec::new();

    for result in rdr.deserialize::<StationRow>() {
        let row = result.map_err(|e| malformed(path, e))?;
        if !seen.insert(row.name.clone()) {
            return Err(DataLoadError::DuplicateStation {
                path: path.to_path_buf(),
                name: row.name,
            });
        }
        stations.push(StationRecord::from(row));
    }

    debug!(path = %path.display(), rows = stations.len(), "Station rows read");
    Ok(stations)
}

/// Reads the tap-on sample CSV.
pub fn load_tap_events(path: &Path) -> Result<Vec<TapEvent>, DataLoadError> {
    let mut rdr = open_csv(path, TAP_COLUMNS)?;
    let headers = rdr.headers().map_err(|e| malformed(path, e))?.clone();
    let mut events = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| malformed(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: TapRow = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(path, e))?;

        let timestamp = match row.timestamp.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| DataLoadError::Malformed {
                path: path.to_path_buf(),
                line,
                message: format!("unrecognised timestamp `{raw}`"),
            })?),
        };

        events.push(TapEvent {
            station: row.station,
            time_bin: row.time_bin,
            count: row.actual.unwrap_or(0),
            timestamp,
        });
    }

    debug!(path = %path.display(), rows = events.len(), "Tap-on rows read");
    Ok(events)
}

fn open_csv(path: &Path, required: &[&'static str]) -> Result<csv::Reader<File>, DataLoadError> {
    let file = File::open(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(file);
    let headers = rdr.headers().map_err(|e| malformed(path, e))?;

    for &column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(DataLoadError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    Ok(rdr)
}

fn malformed(path: &Path, err: csv::Error) -> DataLoadError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = match err.kind() {
        csv::ErrorKind::Deserialize { err: de, .. } => de.to_string(),
        _ => err.to_string(),
    };
    DataLoadError::Malformed {
        path: path.to_path_buf(),
        line,
        message,
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` (taken as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const STATION_HEADER: &str =
        "Stop_name,Stop_lat,Stop_long,Pax_annual,Pax_weekday,Pax_AM_peak,Pax_PM_peak,Pax_Saturday,Pax_Sunday";

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_stations_reads_all_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "expected.csv",
            &format!(
                "{STATION_HEADER}\nFlinders Street,-37.8183,144.9671,27000000,90000,600,400,40000,30000\n"
            ),
        );

        let stations = load_stations(&path).unwrap();
        assert_eq!(stations.len(), 1);

        let s = &stations[0];
        assert_eq!(s.name, "Flinders Street");
        assert_eq!(s.coordinates(), Some((-37.8183, 144.9671)));
        assert_eq!(s.peak_volume(), 1000.0);
        assert_eq!(s.weekend_volume(), 70000.0);
    }

    #[test]
    fn test_empty_numeric_cells_read_as_zero() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "expected.csv",
            &format!("{STATION_HEADER}\nRichmond,,,,,,,,\n"),
        );

        let stations = load_stations(&path).unwrap();
        assert_eq!(stations[0].pax_annual, 0.0);
        assert_eq!(stations[0].coordinates(), None);
    }

    #[test]
    fn test_missing_column_is_named() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "expected.csv", "Stop_name,Pax_annual\nRichmond,100\n");

        let err = load_stations(&path).unwrap_err();
        match err {
            DataLoadError::MissingColumn { column, .. } => assert_eq!(column, "Stop_lat"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_stations(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::Io { .. }));
        assert!(err.to_string().contains("nope.csv"));
    }

    #[test]
    fn test_non_numeric_cell_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "expected.csv",
            &format!("{STATION_HEADER}\nRichmond,0,0,lots,0,0,0,0,0\n"),
        );

        let err = load_stations(&path).unwrap_err();
        match err {
            DataLoadError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_station_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "expected.csv",
            &format!("{STATION_HEADER}\nRichmond,0,0,1,1,1,1,1,1\nRichmond,0,0,2,2,2,2,2,2\n"),
        );

        let err = load_stations(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateStation { ref name, .. } if name == "Richmond"));
    }

    #[test]
    fn test_load_tap_events_with_and_without_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "taps.csv",
            "Stop_name,time_bin,actual,timestamp\n\
             Flinders Street,AM_peak,600,2024-05-01 08:15:00\n\
             Flinders Street,PM_late,45,2024-05-01T21:00:00+10:00\n\
             Richmond,interpeak,120,\n",
        );

        let events = load_tap_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].time_bin, TimeBin::AmPeak);
        assert_eq!(events[0].count, 600);
        assert_eq!(
            events[0].timestamp.unwrap().to_rfc3339(),
            "2024-05-01T08:15:00+00:00"
        );
        assert_eq!(
            events[1].timestamp.unwrap().to_rfc3339(),
            "2024-05-01T11:00:00+00:00"
        );
        assert!(events[2].timestamp.is_none());
    }

    #[test]
    fn test_timestamp_column_is_optional() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "taps.csv", "Stop_name,time_bin,actual\nRichmond,PM_peak,10\n");

        let events = load_tap_events(&path).unwrap();
        assert_eq!(events[0].timestamp, None);
    }

    #[test]
    fn test_unknown_time_bin_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "taps.csv", "Stop_name,time_bin,actual\nRichmond,midnight,10\n");

        let err = load_tap_events(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::Malformed { .. }));
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "taps.csv",
            "Stop_name,time_bin,actual,timestamp\nRichmond,PM_peak,10,yesterday\n",
        );

        let err = load_tap_events(&path).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_time_bin_for_hour() {
        assert_eq!(TimeBin::for_hour(5), TimeBin::PmLate);
        assert_eq!(TimeBin::for_hour(6), TimeBin::PreAmPeak);
        assert_eq!(TimeBin::for_hour(9), TimeBin::AmPeak);
        assert_eq!(TimeBin::for_hour(10), TimeBin::Interpeak);
        assert_eq!(TimeBin::for_hour(15), TimeBin::Interpeak);
        assert_eq!(TimeBin::for_hour(17), TimeBin::PmPeak);
        assert_eq!(TimeBin::for_hour(18), TimeBin::PmLate);
    }

    #[test]
    fn test_ratios_with_zero_weekday() {
        let s = StationRecord {
            pax_am_peak: 10.0,
            pax_saturday: 5.0,
            ..StationRecord::named("Empty")
        };
        assert_eq!(s.peak_ratio(), 0.0);
        assert_eq!(s.weekend_ratio(), 0.0);
    }
}
