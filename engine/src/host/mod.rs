//! Plugin host management API
//!
//! The deployment engine drives a remote media server (the "host") through
//! its management API: repositories, installed plugins, install/uninstall,
//! restart and health. The [`PluginHost`] trait splits that surface into
//! primitive requests, which implementations provide, and convergence polls,
//! which are built once here on top of [`Poller`].
//!
//! Mutating requests (install, uninstall, restart) are triggers. A
//! [`TriggerAck`] only says whether the host accepted the request; whether
//! the effect happened is established by polling afterwards.

use async_trait::async_trait;
use sdk::errors::DeployError;
use sdk::types::{InstalledPlugin, PluginStatus, RepositoryRegistration, Version};
use std::time::Duration;
use tracing::{info, warn};

use crate::poller::{PollOutcome, Poller};

pub mod client;

pub use client::{ClientIdentity, HostClient, HostSettings, Session};

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur talking to the host
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{endpoint} returned HTTP {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Plugin not installed: {0}")]
    PluginNotFound(String),
}

impl From<HostError> for DeployError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Authentication(msg) => DeployError::Authentication(msg),
            HostError::Transport(msg) => DeployError::Network(msg),
            other => DeployError::Host(other.to_string()),
        }
    }
}

/// How the host answered a mutating request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAck {
    /// 2xx: the request was accepted
    Accepted(u16),
    /// Non-2xx response
    Rejected(u16),
    /// The connection went away before a response (expected for restart)
    ConnectionDropped,
}

impl TriggerAck {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, TriggerAck::Rejected(_))
    }
}

/// What [`PluginHost::ensure_repository`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryChange {
    Unchanged,
    Updated,
    Added,
}

/// State a plugin is expected to converge to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedState {
    /// Absent from the installed list
    Removed,
    /// Present with exactly this status
    Status(PluginStatus),
}

/// Identifies the managed plugin in the host's installed list
///
/// A configured GUID wins over the name; names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSelector {
    pub name: String,
    pub guid: Option<String>,
}

impl PluginSelector {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: None,
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    pub fn find<'a>(&self, plugins: &'a [InstalledPlugin]) -> Option<&'a InstalledPlugin> {
        if let Some(guid) = &self.guid {
            let wanted = normalize_guid(guid);
            if let Some(found) = plugins.iter().find(|p| normalize_guid(&p.id) == wanted) {
                return Some(found);
            }
        }
        plugins
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(&self.name))
    }
}

fn normalize_guid(guid: &str) -> String {
    guid.chars()
        .filter(|c| *c != '-' && *c != '{' && *c != '}')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Management API of a plugin host
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Log in and store the session token. Failure is fatal for the run.
    async fn authenticate(&mut self) -> Result<()>;

    /// Repeat the login after a restart; never fails the run
    async fn reauthenticate(&mut self) -> bool {
        match self.authenticate().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Re-authentication failed, keeping previous session");
                false
            }
        }
    }

    async fn repositories(&self) -> Result<Vec<RepositoryRegistration>>;

    /// Replace the full repository list
    async fn set_repositories(&self, repositories: &[RepositoryRegistration]) -> Result<()>;

    async fn installed_plugins(&self) -> Result<Vec<InstalledPlugin>>;

    async fn uninstall(&self, plugin_id: &str) -> Result<TriggerAck>;

    async fn install(
        &self,
        package: &str,
        repository_url: &str,
        version: &Version,
    ) -> Result<TriggerAck>;

    /// Ask the host to restart. A dropped connection is an acknowledgement.
    async fn restart(&self) -> Result<TriggerAck>;

    /// One request against the public health endpoint; `Ok` only on 200
    async fn health_check(&self) -> Result<()>;

    /// Poller used by the convergence waits
    fn poller(&self) -> Poller;

    /// Make sure a repository named `name` points at `url` and is enabled
    ///
    /// Registrations are matched by name containment, so an existing
    /// "TunnelFin Stable" entry satisfies `name = "TunnelFin"`.
    async fn ensure_repository(&self, name: &str, url: &str) -> Result<RepositoryChange> {
        let mut repositories = self.repositories().await?;

        let change = match repositories.iter_mut().find(|r| r.name.contains(name)) {
            Some(existing) if existing.url == url => {
                info!(repository = %existing.name, "Repository already configured");
                return Ok(RepositoryChange::Unchanged);
            }
            Some(existing) => {
                info!(repository = %existing.name, url = %url, "Updating repository URL");
                existing.url = url.to_string();
                existing.enabled = true;
                RepositoryChange::Updated
            }
            None => {
                info!(repository = %name, url = %url, "Adding repository");
                repositories.push(RepositoryRegistration::new(name, url));
                RepositoryChange::Added
            }
        };

        self.set_repositories(&repositories).await?;
        Ok(change)
    }

    async fn find_plugin(&self, selector: &PluginSelector) -> Result<Option<InstalledPlugin>> {
        let plugins = self.installed_plugins().await?;
        Ok(selector.find(&plugins).cloned())
    }

    async fn find_plugin_id(&self, selector: &PluginSelector) -> Result<Option<String>> {
        Ok(self.find_plugin(selector).await?.map(|p| p.id))
    }

    /// Wait for the first successful health check
    async fn wait_for_healthy(&self, timeout: Duration) -> PollOutcome<()> {
        let outcome = self
            .poller()
            .poll_for(timeout, || self.health_check(), |_| true)
            .await;
        log_wait("host healthy", &outcome);
        outcome
    }

    /// Wait for the plugin to be absent, or present with the expected status
    ///
    /// The ready value is the observed record (`None` when removed).
    async fn wait_for_plugin_state(
        &self,
        selector: &PluginSelector,
        expected: &ExpectedState,
        timeout: Duration,
    ) -> PollOutcome<Option<InstalledPlugin>> {
        let outcome = self
            .poller()
            .poll_for(
                timeout,
                || self.find_plugin(selector),
                |found| match (expected, found) {
                    (ExpectedState::Removed, None) => true,
                    (ExpectedState::Status(status), Some(plugin)) => plugin.status == *status,
                    _ => false,
                },
            )
            .await;
        log_wait("plugin state", &outcome);
        outcome
    }

    /// Wait for the plugin to be present, at exactly `version`, and Active
    async fn wait_for_plugin_version(
        &self,
        selector: &PluginSelector,
        version: &Version,
        timeout: Duration,
    ) -> PollOutcome<InstalledPlugin> {
        let wanted = version.to_string();
        let outcome = self
            .poller()
            .poll_for(
                timeout,
                || async {
                    self.find_plugin(selector).await.and_then(|found| {
                        found.ok_or_else(|| HostError::PluginNotFound(selector.name.clone()))
                    })
                },
                |plugin| plugin.version == wanted && plugin.status == PluginStatus::Active,
            )
            .await;
        log_wait("plugin version", &outcome);
        outcome
    }
}

fn log_wait<T>(what: &str, outcome: &PollOutcome<T>) {
    let elapsed_secs = outcome.elapsed().as_secs();
    if outcome.is_ready() {
        info!(wait = what, elapsed_secs, "Wait finished");
    } else {
        warn!(wait = what, elapsed_secs, attempts = outcome.attempts(), "Wait timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(id: &str, name: &str) -> InstalledPlugin {
        InstalledPlugin {
            id: id.to_string(),
            name: name.to_string(),
            version: "1.0.0.0".to_string(),
            status: PluginStatus::Active,
        }
    }

    #[test]
    fn test_selector_matches_name_case_insensitively() {
        let plugins = vec![plugin("1", "Trakt"), plugin("2", "tunnelfin")];
        let selector = PluginSelector::named("TunnelFin");
        assert_eq!(selector.find(&plugins).unwrap().id, "2");
    }

    #[test]
    fn test_selector_guid_takes_precedence() {
        let plugins = vec![
            plugin("aaaa", "TunnelFin"),
            plugin("c8a3e1f2000040008000000000000001", "TunnelFin (renamed)"),
        ];
        let selector =
            PluginSelector::named("TunnelFin").with_guid("C8A3E1F2-0000-4000-8000-000000000001");
        assert_eq!(
            selector.find(&plugins).unwrap().name,
            "TunnelFin (renamed)"
        );
    }

    #[test]
    fn test_selector_falls_back_to_name_when_guid_absent() {
        let plugins = vec![plugin("aaaa", "TunnelFin")];
        let selector = PluginSelector::named("tunnelfin").with_guid("ffff");
        assert_eq!(selector.find(&plugins).unwrap().id, "aaaa");
    }

    #[test]
    fn test_trigger_ack() {
        assert!(TriggerAck::Accepted(204).is_accepted());
        assert!(TriggerAck::ConnectionDropped.is_accepted());
        assert!(!TriggerAck::Rejected(500).is_accepted());
    }
}
