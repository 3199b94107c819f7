//! `rfgate` binary support: configuration and the manual-control HTTP API.

pub mod api;
pub mod config;

pub use config::Args;
