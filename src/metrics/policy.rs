//! Tunable constants behind the evasion and priority formulas.
//!
//! None of these numbers are derived from data. They are demo policy and are
//! kept together so they can be swapped without touching the aggregation.

use serde::{Deserialize, Serialize};

/// Which published volume the expected-taps baseline is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeBasis {
    /// AM peak + PM peak passengers.
    PeakHour,
    /// Average weekday passengers.
    Weekday,
    /// Annual passengers / 365.
    AnnualDaily,
}

impl std::str::FromStr for VolumeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "peak_hour" | "peak" => Ok(VolumeBasis::PeakHour),
            "weekday" => Ok(VolumeBasis::Weekday),
            "annual_daily" | "annual" => Ok(VolumeBasis::AnnualDaily),
            other => Err(format!("unknown volume basis `{other}`")),
        }
    }
}

/// `expected = fraction × volume(basis)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselinePolicy {
    pub fraction: f64,
    pub basis: VolumeBasis,
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        Self {
            fraction: 0.8,
            basis: VolumeBasis::PeakHour,
        }
    }
}

/// Weights for the priority score, a weighted mean of the evasion rate and
/// the evasion volume saturated at `volume_saturation` missing taps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub evasion_rate: f64,
    pub evasion_volume: f64,
    pub volume_saturation: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            evasion_rate: 2.0,
            evasion_volume: 1.0,
            volume_saturation: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub baseline: BaselinePolicy,
    pub priority: PriorityWeights,
    /// Stations must score strictly above this to raise an alert.
    pub alert_threshold: f64,
    pub max_alerts: usize,
    /// Stations above this evasion rate count as high risk in the summary.
    pub high_risk_rate: f64,
    /// Average fare used for revenue impact, in dollars.
    pub average_fare: f64,
    /// Fine issued per detected evader, in dollars.
    pub fine_amount: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            baseline: BaselinePolicy::default(),
            priority: PriorityWeights::default(),
            alert_threshold: 0.1,
            max_alerts: 20,
            high_risk_rate: 0.15,
            average_fare: 4.50,
            fine_amount: 250.0,
        }
    }
}

impl ScoringPolicy {
    /// Expected compliant taps for a station under this policy.
    pub fn expected_taps(&self, station: &crate::loader::StationRecord) -> f64 {
        let volume = match self.baseline.basis {
            VolumeBasis::PeakHour => station.peak_volume(),
            VolumeBasis::Weekday => station.pax_weekday,
            VolumeBasis::AnnualDaily => station.daily_average(),
        };
        self.baseline.fraction * volume
    }

    /// Priority score in [0, 1]. Non-decreasing in both arguments.
    pub fn priority_score(&self, evasion_rate: f64, evasion: f64) -> f64 {
        let w = &self.priority;

        let volume_component = if w.volume_saturation > 0.0 {
            (evasion / w.volume_saturation).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let weight_sum = w.evasion_rate + w.evasion_volume;
        if weight_sum <= 0.0 {
            return 0.0;
        }

        let score = (evasion_rate * w.evasion_rate + volume_component * w.evasion_volume) / weight_sum;
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StationRecord;

    #[test]
    fn test_expected_taps_per_basis() {
        let station = StationRecord {
            pax_annual: 365_000.0,
            pax_weekday: 2_000.0,
            pax_am_peak: 600.0,
            pax_pm_peak: 400.0,
            ..StationRecord::named("Southern Cross")
        };

        let mut policy = ScoringPolicy::default();
        assert_eq!(policy.expected_taps(&station), 800.0);

        policy.baseline.basis = VolumeBasis::Weekday;
        assert_eq!(policy.expected_taps(&station), 1_600.0);

        policy.baseline = BaselinePolicy {
            fraction: 1.0,
            basis: VolumeBasis::AnnualDaily,
        };
        assert_eq!(policy.expected_taps(&station), 1_000.0);
    }

    #[test]
    fn test_priority_score_is_monotonic() {
        let policy = ScoringPolicy::default();
        let low = policy.priority_score(0.1, 50.0);
        assert!(policy.priority_score(0.2, 50.0) > low);
        assert!(policy.priority_score(0.1, 500.0) > low);
        assert_eq!(policy.priority_score(1.0, 5_000.0), 1.0);
        assert_eq!(policy.priority_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_priority_score_with_zero_weights() {
        let mut policy = ScoringPolicy::default();
        policy.priority.evasion_rate = 0.0;
        policy.priority.evasion_volume = 0.0;
        assert_eq!(policy.priority_score(0.5, 100.0), 0.0);
    }

    #[test]
    fn test_volume_basis_from_str() {
        assert_eq!("peak".parse::<VolumeBasis>(), Ok(VolumeBasis::PeakHour));
        assert_eq!("weekday".parse::<VolumeBasis>(), Ok(VolumeBasis::Weekday));
        assert!("hourly".parse::<VolumeBasis>().is_err());
    }
}
