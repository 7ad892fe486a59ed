//! Jellyship Engine Library
//!
//! Builds, publishes and deploys a media server plugin. Used by the
//! `jellyship` binary and by the integration tests.

/// CDN propagation checks
pub mod cdn;

/// CLI interface module
pub mod cli;

/// Configuration management module
pub mod config;

/// Command handlers module
pub mod handlers;

/// Release history gathering
pub mod history;

/// Media server API client
pub mod host;

/// Deployment sequencing and reporting
pub mod orchestrator;

pub mod poller;

/// Telemetry and Observability
pub mod telemetry;

/// External build, git and GitHub tooling
pub mod toolchain;
