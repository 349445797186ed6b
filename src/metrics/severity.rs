use serde::Serialize;
use std::fmt;

/// Inspector attention label derived from an evasion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Lower bounds (exclusive) for the `high` and `medium` labels.
#[derive(Debug, Clone, Copy)]
pub struct SeverityBands {
    pub high: f64,
    pub medium: f64,
}

/// Bands for whole-station evasion rates.
pub const STATION_BANDS: SeverityBands = SeverityBands {
    high: 0.25,
    medium: 0.15,
};

/// Bands for single-hour readings, which are noisier.
pub const HOURLY_BANDS: SeverityBands = SeverityBands {
    high: 0.30,
    medium: 0.20,
};

/// Bands for the route feed's risk level.
pub const ROUTE_RISK_BANDS: SeverityBands = SeverityBands {
    high: 0.60,
    medium: 0.30,
};

/// Converts an evasion rate (0.0–1.0) into a severity.
///
/// | Rate            | Station | Hourly |
/// |-----------------|---------|--------|
/// | > high band     | high    | high   |
/// | > medium band   | medium  | medium |
/// | otherwise       | low     | low    |
pub fn severity(rate: f64, bands: SeverityBands) -> Severity {
    match rate {
        r if r > bands.high => Severity::High,
        r if r > bands.medium => Severity::Medium,
        _ => Severity::Low,
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_severity_boundaries() {
        assert_eq!(severity(0.40, STATION_BANDS), Severity::High);
        assert_eq!(severity(0.26, STATION_BANDS), Severity::High);
        assert_eq!(severity(0.25, STATION_BANDS), Severity::Medium);
        assert_eq!(severity(0.16, STATION_BANDS), Severity::Medium);
        assert_eq!(severity(0.15, STATION_BANDS), Severity::Low);
        assert_eq!(severity(0.00, STATION_BANDS), Severity::Low);
    }

    #[test]
    fn test_hourly_severity_boundaries() {
        assert_eq!(severity(0.31, HOURLY_BANDS), Severity::High);
        assert_eq!(severity(0.30, HOURLY_BANDS), Severity::Medium);
        assert_eq!(severity(0.21, HOURLY_BANDS), Severity::Medium);
        assert_eq!(severity(0.20, HOURLY_BANDS), Severity::Low);
    }

    #[test]
    fn test_route_risk_boundaries() {
        assert_eq!(severity(0.61, ROUTE_RISK_BANDS), Severity::High);
        assert_eq!(severity(0.60, ROUTE_RISK_BANDS), Severity::Medium);
        assert_eq!(severity(0.30, ROUTE_RISK_BANDS), Severity::Low);
    }
}
