pub mod auth;
pub mod config;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod refresh;
pub mod snapshot;
pub mod web;
