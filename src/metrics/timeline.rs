//! Simulated 24-hour view of expected versus observed taps.
//!
//! Each hour is mapped to its operating period and compared against the
//! first sampled count for that period. The result depends only on the
//! inputs and the `now` instant, so two calls with the same arguments agree.

use crate::loader::{StationRecord, TapEvent, TimeBin};
use crate::metrics::severity::{HOURLY_BANDS, severity};
use crate::metrics::summary::stations_by_volume;
use crate::metrics::types::{HourlyAlert, HourlyRecord, Timeline};
use chrono::{Duration, NaiveDateTime, Timelike};
use std::collections::HashMap;

/// Hourly readings above this evasion rate raise an alert.
pub const HOURLY_ALERT_RATE: f64 = 0.15;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Expected taps in a single hour of `bin`, floored and never negative.
pub fn expected_hourly(station: &StationRecord, bin: TimeBin) -> u64 {
    let am = station.pax_am_peak;
    let pm = station.pax_pm_peak;

    let per_hour = match bin {
        TimeBin::AmPeak | TimeBin::PmPeak => (am + pm) / 4.0,
        TimeBin::PreAmPeak => am / 2.0,
        TimeBin::Interpeak => (station.pax_weekday - am - pm) / 6.0,
        TimeBin::PmLate => pm / 2.0,
    };

    if per_hour.is_finite() && per_hour > 0.0 {
        per_hour.floor() as u64
    } else {
        0
    }
}

/// Builds the timeline for the 24 hours ending at `now`, busiest stations first.
pub fn hourly_timeline(
    stations: &[StationRecord],
    events: &[TapEvent],
    now: NaiveDateTime,
    average_fare: f64,
) -> Timeline {
    let mut first_count: HashMap<(&str, TimeBin), u64> = HashMap::new();
    for event in events {
        first_count
            .entry((event.station.as_str(), event.time_bin))
            .or_insert(event.count);
    }

    let mut timeline = Timeline::default();

    for station in stations_by_volume(stations) {
        for hour in 0..24i64 {
            let at = now - Duration::hours(23 - hour);
            let bin = TimeBin::for_hour(at.hour());

            let Some(&sampled) = first_count.get(&(station.name.as_str(), bin)) else {
                continue;
            };

            let expected = expected_hourly(station, bin);
            let actual = sampled.min(expected);
            let missing = expected - actual;
            let evasion_rate = if expected > 0 {
                missing as f64 / expected as f64
            } else {
                0.0
            };

            let timestamp = at.format(TIMESTAMP_FORMAT).to_string();
            let expected_fines = missing as f64 * average_fare;

            if evasion_rate > HOURLY_ALERT_RATE {
                timeline.alerts.push(HourlyAlert {
                    station: station.name.clone(),
                    timestamp: timestamp.clone(),
                    evasion_rate,
                    severity: severity(evasion_rate, HOURLY_BANDS),
                    expected_fines,
                });
            }

            timeline.records.push(HourlyRecord {
                station: station.name.clone(),
                timestamp,
                hour: at.hour(),
                time_bin: bin,
                expected,
                actual,
                evasion_rate,
                expected_fines,
            });
        }
    }

    timeline
}

/// The trailing `n` elements of `items`.
pub fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::severity::Severity;
    use chrono::NaiveDate;

    fn flinders() -> StationRecord {
        StationRecord {
            pax_annual: 1_000_000.0,
            pax_weekday: 2_000.0,
            pax_am_peak: 400.0,
            pax_pm_peak: 400.0,
            ..StationRecord::named("Flinders Street")
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_expected_hourly_formula() {
        let s = flinders();
        assert_eq!(expected_hourly(&s, TimeBin::AmPeak), 200);
        assert_eq!(expected_hourly(&s, TimeBin::PmPeak), 200);
        assert_eq!(expected_hourly(&s, TimeBin::PreAmPeak), 200);
        assert_eq!(expected_hourly(&s, TimeBin::Interpeak), 200);
        assert_eq!(expected_hourly(&s, TimeBin::PmLate), 200);
    }

    #[test]
    fn test_interpeak_never_negative() {
        let s = StationRecord {
            pax_weekday: 10.0,
            pax_am_peak: 100.0,
            pax_pm_peak: 100.0,
            ..StationRecord::named("Odd")
        };
        assert_eq!(expected_hourly(&s, TimeBin::Interpeak), 0);
    }

    #[test]
    fn test_timeline_only_covers_sampled_bins() {
        let events = vec![TapEvent {
            station: "Flinders Street".into(),
            time_bin: TimeBin::AmPeak,
            count: 150,
            timestamp: None,
        }];

        let timeline = hourly_timeline(&[flinders()], &events, noon(), 4.5);

        // 08:00 and 09:00 are the only AM peak hours in the window.
        assert_eq!(timeline.records.len(), 2);
        assert!(timeline.records.iter().all(|r| r.time_bin == TimeBin::AmPeak));
        assert_eq!(timeline.records[0].timestamp, "2024-05-01 08:00:00");
        assert_eq!(timeline.records[0].expected, 200);
        assert_eq!(timeline.records[0].actual, 150);
        assert!((timeline.records[0].evasion_rate - 0.25).abs() < 1e-9);
        assert!((timeline.records[0].expected_fines - 225.0).abs() < 1e-9);

        assert_eq!(timeline.alerts.len(), 2);
        assert_eq!(timeline.alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn test_actual_capped_at_expected() {
        let events = vec![TapEvent {
            station: "Flinders Street".into(),
            time_bin: TimeBin::PmLate,
            count: 10_000,
            timestamp: None,
        }];

        let timeline = hourly_timeline(&[flinders()], &events, noon(), 4.5);

        assert!(!timeline.records.is_empty());
        for r in &timeline.records {
            assert_eq!(r.actual, r.expected);
            assert_eq!(r.evasion_rate, 0.0);
        }
        assert!(timeline.alerts.is_empty());
    }

    #[test]
    fn test_tail() {
        let v = [1, 2, 3, 4];
        assert_eq!(tail(&v, 2), &[3, 4]);
        assert_eq!(tail(&v, 10), &[1, 2, 3, 4]);
    }
}
