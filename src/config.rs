//! Runtime configuration read from `MYKI_*` environment variables.
//!
//! `main` loads `.env` through `dotenvy` first, then command-line flags
//! override whatever the environment provided.
//!
//! | Variable                 | Default                          |
//! |--------------------------|----------------------------------|
//! | `MYKI_STATIONS_CSV`      | `data/expected.csv`              |
//! | `MYKI_TAPS_CSV`          | `data/sample_tap_on_dataset.csv` |
//! | `MYKI_USERS_FILE`        | `users.json`                     |
//! | `MYKI_HOST`              | `127.0.0.1`                      |
//! | `MYKI_PORT`              | `5000`                           |
//! | `MYKI_REFRESH_SECS`      | `3600`                           |
//! | `MYKI_SESSION_HOURS`     | `8`                              |
//! | `MYKI_BASELINE_FRACTION` | `0.8`                            |
//! | `MYKI_BASELINE_BASIS`    | `peak_hour`                      |
//! | `MYKI_ALERT_THRESHOLD`   | `0.1`                            |
//! | `MYKI_MAX_ALERTS`        | `20`                             |
//! | `MYKI_HIGH_RISK_RATE`    | `0.15`                           |
//! | `MYKI_AVERAGE_FARE`      | `4.50`                           |
//! | `MYKI_FINE_AMOUNT`       | `250`                            |

use crate::loader::DataSources;
use crate::metrics::ScoringPolicy;
use crate::refresh::MAX_REFRESH_INTERVAL;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources: DataSources,
    pub users_file: PathBuf,
    pub host: String,
    pub port: u16,
    pub refresh_interval: Duration,
    pub session_ttl: chrono::Duration,
    pub policy: ScoringPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: DataSources {
                stations: PathBuf::from("data/expected.csv"),
                taps: PathBuf::from("data/sample_tap_on_dataset.csv"),
            },
            users_file: PathBuf::from("users.json"),
            host: "127.0.0.1".to_string(),
            port: 5000,
            refresh_interval: Duration::from_secs(3600),
            session_ttl: chrono::Duration::hours(8),
            policy: ScoringPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep their
    /// defaults; set keys that fail to parse are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MYKI_STATIONS_CSV") {
            cfg.sources.stations = PathBuf::from(v);
        }
        if let Some(v) = get("MYKI_TAPS_CSV") {
            cfg.sources.taps = PathBuf::from(v);
        }
        if let Some(v) = get("MYKI_USERS_FILE") {
            cfg.users_file = PathBuf::from(v);
        }
        if let Some(v) = get("MYKI_HOST") {
            cfg.host = v;
        }
        if let Some(v) = get("MYKI_PORT") {
            cfg.port = parse("MYKI_PORT", &v)?;
        }
        if let Some(v) = get("MYKI_REFRESH_SECS") {
            cfg.set_refresh_secs(parse("MYKI_REFRESH_SECS", &v)?)
                .context("MYKI_REFRESH_SECS")?;
        }
        if let Some(v) = get("MYKI_SESSION_HOURS") {
            let hours: i64 = parse("MYKI_SESSION_HOURS", &v)?;
            if hours <= 0 {
                anyhow::bail!("MYKI_SESSION_HOURS must be greater than zero");
            }
            cfg.session_ttl = chrono::Duration::try_hours(hours)
                .with_context(|| format!("MYKI_SESSION_HOURS value {hours} is out of range"))?;
        }

        let policy = &mut cfg.policy;
        if let Some(v) = get("MYKI_BASELINE_FRACTION") {
            policy.baseline.fraction = parse("MYKI_BASELINE_FRACTION", &v)?;
        }
        if let Some(v) = get("MYKI_BASELINE_BASIS") {
            policy.baseline.basis = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!("MYKI_BASELINE_BASIS: {e}"))?;
        }
        if let Some(v) = get("MYKI_ALERT_THRESHOLD") {
            policy.alert_threshold = parse("MYKI_ALERT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MYKI_MAX_ALERTS") {
            policy.max_alerts = parse("MYKI_MAX_ALERTS", &v)?;
        }
        if let Some(v) = get("MYKI_HIGH_RISK_RATE") {
            policy.high_risk_rate = parse("MYKI_HIGH_RISK_RATE", &v)?;
        }
        if let Some(v) = get("MYKI_AVERAGE_FARE") {
            policy.average_fare = parse("MYKI_AVERAGE_FARE", &v)?;
        }
        if let Some(v) = get("MYKI_FINE_AMOUNT") {
            policy.fine_amount = parse("MYKI_FINE_AMOUNT", &v)?;
        }

        Ok(cfg)
    }

    /// Sets the refresh period, rejecting zero and anything over a week.
    pub fn set_refresh_secs(&mut self, secs: u64) -> Result<()> {
        let interval = Duration::from_secs(secs);
        if interval.is_zero() {
            anyhow::bail!("refresh interval must be greater than zero");
        }
        if interval > MAX_REFRESH_INTERVAL {
            anyhow::bail!(
                "refresh interval of {secs}s exceeds the maximum of {}s",
                MAX_REFRESH_INTERVAL.as_secs()
            );
        }
        self.refresh_interval = interval;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} has invalid value `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::policy::VolumeBasis;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:5000");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(3600));
        assert_eq!(cfg.policy, ScoringPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("MYKI_PORT", "8080"),
            ("MYKI_REFRESH_SECS", "30"),
            ("MYKI_BASELINE_FRACTION", "0.9"),
            ("MYKI_BASELINE_BASIS", "weekday"),
            ("MYKI_MAX_ALERTS", "5"),
            ("MYKI_TAPS_CSV", "/tmp/taps.csv"),
        ]))
        .unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.policy.baseline.fraction, 0.9);
        assert_eq!(cfg.policy.baseline.basis, VolumeBasis::Weekday);
        assert_eq!(cfg.policy.max_alerts, 5);
        assert_eq!(cfg.sources.taps, PathBuf::from("/tmp/taps.csv"));
    }

    #[test]
    fn test_bad_value_is_error() {
        let err = AppConfig::from_lookup(lookup(&[("MYKI_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("MYKI_PORT"));
    }

    #[test]
    fn test_zero_refresh_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("MYKI_REFRESH_SECS", "0")])).is_err());
    }

    #[test]
    fn test_huge_refresh_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("MYKI_REFRESH_SECS", "18446744073709551615")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("exceeds the maximum"));

        let week = MAX_REFRESH_INTERVAL.as_secs().to_string();
        let cfg = AppConfig::from_lookup(lookup(&[("MYKI_REFRESH_SECS", week.as_str())])).unwrap();
        assert_eq!(cfg.refresh_interval, MAX_REFRESH_INTERVAL);
    }

    #[test]
    fn test_session_hours_out_of_range() {
        let err = AppConfig::from_lookup(lookup(&[("MYKI_SESSION_HOURS", "9223372036854775807")]))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        assert!(AppConfig::from_lookup(lookup(&[("MYKI_SESSION_HOURS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MYKI_SESSION_HOURS", "-3")])).is_err());

        let cfg = AppConfig::from_lookup(lookup(&[("MYKI_SESSION_HOURS", "12")])).unwrap();
        assert_eq!(cfg.session_ttl, chrono::Duration::hours(12));
    }

    #[test]
    fn test_set_refresh_secs() {
        let mut cfg = AppConfig::default();
        assert!(cfg.set_refresh_secs(0).is_err());
        assert!(cfg.set_refresh_secs(u64::MAX).is_err());
        cfg.set_refresh_secs(90).unwrap();
        assert_eq!(cfg.refresh_interval, Duration::from_secs(90));
    }

    #[test]
    fn test_blank_values_ignored() {
        let cfg = AppConfig::from_lookup(lookup(&[("MYKI_HOST", "  ")])).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
    }
}
