//! Deployment summary

use sdk::types::InstalledPlugin;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::poller::PollOutcome;

/// Steps of a deployment, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ManifestUpdate,
    Publish,
    ManifestPush,
    CdnPropagation,
    Repository,
    Uninstall,
    RestartAfterUninstall,
    HealthAfterUninstall,
    Removal,
    Install,
    RestartAfterInstall,
    HealthAfterInstall,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ManifestUpdate => "manifest update",
            Phase::Publish => "publish",
            Phase::ManifestPush => "manifest push",
            Phase::CdnPropagation => "cdn propagation",
            Phase::Repository => "repository",
            Phase::Uninstall => "uninstall",
            Phase::RestartAfterUninstall => "restart after uninstall",
            Phase::HealthAfterUninstall => "health after uninstall",
            Phase::Removal => "removal",
            Phase::Install => "install",
            Phase::RestartAfterInstall => "restart after install",
            Phase::HealthAfterInstall => "health after install",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Success,
    Timeout,
    Failed,
    Skipped,
}

impl PhaseOutcome {
    pub fn marker(&self) -> &'static str {
        match self {
            PhaseOutcome::Success => "ok",
            PhaseOutcome::Timeout => "timeout",
            PhaseOutcome::Failed => "failed",
            PhaseOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub outcome: PhaseOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Whether the host ended up running the release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    /// Present at the expected version and active
    Verified { plugin: InstalledPlugin },
    /// The wait ran out; `observed` is the last record read, if any
    Inconclusive { observed: Option<InstalledPlugin> },
    /// This mode does not poll for the result
    NotChecked,
}

/// Outcome of one deployment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub version: String,
    pub checksum: Option<String>,
    pub phases: Vec<PhaseRecord>,
    pub verification: Verification,
}

impl DeployReport {
    pub fn new(version: impl Into<String>, checksum: Option<String>) -> Self {
        Self {
            version: version.into(),
            checksum,
            phases: Vec::new(),
            verification: Verification::NotChecked,
        }
    }

    /// False only when verification ran and was inconclusive
    pub fn passed(&self) -> bool {
        !matches!(self.verification, Verification::Inconclusive { .. })
    }

    pub fn record(&mut self, phase: Phase, outcome: PhaseOutcome, detail: Option<String>) {
        self.phases.push(PhaseRecord {
            phase,
            outcome,
            detail,
        });
    }

    /// Record a poll as success or timeout with its elapsed time
    pub fn record_wait<T>(&mut self, phase: Phase, outcome: &PollOutcome<T>) {
        let result = if outcome.is_ready() {
            PhaseOutcome::Success
        } else {
            PhaseOutcome::Timeout
        };
        self.record(phase, result, Some(format_elapsed(outcome.elapsed())));
    }

    pub fn outcome_of(&self, phase: Phase) -> Option<PhaseOutcome> {
        self.phases
            .iter()
            .rev()
            .find(|r| r.phase == phase)
            .map(|r| r.outcome)
    }

    /// Human-readable summary, one line per phase
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.phases.len() + 3);
        match &self.checksum {
            Some(checksum) => {
                lines.push(format!("Version {} (checksum {})", self.version, checksum))
            }
            None => lines.push(format!("Version {}", self.version)),
        }

        for record in &self.phases {
            let mut line = format!("  [{:>7}] {}", record.outcome.marker(), record.phase);
            if let Some(detail) = &record.detail {
                line.push_str(&format!(": {}", detail));
            }
            lines.push(line);
        }

        match &self.verification {
            Verification::Verified { plugin } => lines.push(format!(
                "Verified: {} v{} is {}",
                plugin.name, plugin.version, plugin.status
            )),
            Verification::Inconclusive {
                observed: Some(plugin),
            } => lines.push(format!(
                "Inconclusive: host reports {} v{} with status {}",
                plugin.name, plugin.version, plugin.status
            )),
            Verification::Inconclusive { observed: None } => {
                lines.push("Inconclusive: plugin not found after install".to_string())
            }
            Verification::NotChecked => {
                lines.push("Not verified: the host is installing in the background".to_string())
            }
        }
        lines.push(if self.passed() { "PASS" } else { "FAIL" }.to_string());
        lines
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{}s", elapsed.as_secs())
}
