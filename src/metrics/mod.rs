//! Station evasion aggregation and priority ranking.
//!
//! This module joins sampled tap-on counts to station patronage, derives
//! evasion rates and priority scores under a [`policy::ScoringPolicy`], and
//! orders stations for inspector attention.

pub mod aggregate;
pub mod policy;
pub mod rank;
pub mod severity;
pub mod summary;
pub mod timeline;
pub mod types;
pub mod utility;

pub use aggregate::{ComputationError, check_invariants, compute};
pub use policy::ScoringPolicy;
pub use rank::{alerts, rank};
