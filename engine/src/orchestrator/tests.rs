use super::*;
use crate::cdn::ReleaseProbe;
use crate::host::{HostError, Result as HostResult};
use crate::poller::Poller;
use crate::toolchain::PublishAction;
use async_trait::async_trait;
use sdk::manifest::ManifestChannel;
use sdk::types::{InstalledPlugin, PluginStatus, RepositoryRegistration};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const PLUGIN_ID: &str = "c8a3e1f2000040008000000000000001";

#[derive(Debug, Default)]
struct HostState {
    plugins: Vec<InstalledPlugin>,
    repositories: Vec<RepositoryRegistration>,
    pending_uninstall: Option<String>,
    pending_install: Option<String>,
    calls: Vec<String>,
}

/// In-memory host: uninstall and install take effect on the next restart
#[derive(Clone)]
struct FakeHost {
    state: Arc<Mutex<HostState>>,
    reject_login: bool,
    healthy: bool,
    /// Status a freshly installed plugin reports
    installed_status: PluginStatus,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState::default())),
            reject_login: false,
            healthy: true,
            installed_status: PluginStatus::Active,
        }
    }

    fn with_installed(self, version: &str) -> Self {
        self.state.lock().unwrap().plugins.push(InstalledPlugin {
            id: PLUGIN_ID.to_string(),
            name: "TunnelFin".to_string(),
            version: version.to_string(),
            status: PluginStatus::Active,
        });
        self
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn log(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }
}

#[async_trait]
impl PluginHost for FakeHost {
    async fn authenticate(&mut self) -> HostResult<()> {
        self.log("authenticate");
        if self.reject_login {
            return Err(HostError::Authentication("invalid username or password".into()));
        }
        Ok(())
    }

    async fn repositories(&self) -> HostResult<Vec<RepositoryRegistration>> {
        Ok(self.state.lock().unwrap().repositories.clone())
    }

    async fn set_repositories(&self, repositories: &[RepositoryRegistration]) -> HostResult<()> {
        self.log("set_repositories");
        self.state.lock().unwrap().repositories = repositories.to_vec();
        Ok(())
    }

    async fn installed_plugins(&self) -> HostResult<Vec<InstalledPlugin>> {
        Ok(self.state.lock().unwrap().plugins.clone())
    }

    async fn uninstall(&self, plugin_id: &str) -> HostResult<TriggerAck> {
        self.log(format!("uninstall {}", plugin_id));
        self.state.lock().unwrap().pending_uninstall = Some(plugin_id.to_string());
        Ok(TriggerAck::Accepted(204))
    }

    async fn install(
        &self,
        package: &str,
        repository_url: &str,
        version: &Version,
    ) -> HostResult<TriggerAck> {
        self.log(format!("install {} {} from {}", package, version, repository_url));
        self.state.lock().unwrap().pending_install = Some(version.to_string());
        Ok(TriggerAck::Accepted(204))
    }

    async fn restart(&self) -> HostResult<TriggerAck> {
        self.log("restart");
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.pending_uninstall.take() {
            state.plugins.retain(|p| p.id != id);
        }
        if let Some(version) = state.pending_install.take() {
            state.plugins.push(InstalledPlugin {
                id: PLUGIN_ID.to_string(),
                name: "TunnelFin".to_string(),
                version,
                status: self.installed_status.clone(),
            });
        }
        Ok(TriggerAck::ConnectionDropped)
    }

    async fn health_check(&self) -> HostResult<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(HostError::Transport("connection refused".into()))
        }
    }

    fn poller(&self) -> Poller {
        Poller::default()
    }
}

#[derive(Default)]
struct FakePublisher {
    calls: Mutex<Vec<String>>,
    fail_publish: bool,
}

#[async_trait]
impl ReleasePublisher for FakePublisher {
    async fn ensure_ready(&self) -> std::result::Result<(), DeployError> {
        Ok(())
    }

    async fn release_tags(&self) -> Vec<String> {
        Vec::new()
    }

    async fn publish_asset(
        &self,
        version: &Version,
        _asset: &Path,
    ) -> std::result::Result<PublishAction, DeployError> {
        if self.fail_publish {
            return Err(DeployError::Publish("HTTP 422 from GitHub".into()));
        }
        self.calls.lock().unwrap().push(format!("publish {}", version.tag()));
        Ok(PublishAction::Created)
    }

    async fn push_manifest(
        &self,
        _manifest: &Path,
        version: &Version,
        checksum: &str,
    ) -> std::result::Result<(), DeployError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("push {} {}", version.tag(), checksum));
        Ok(())
    }
}

/// Serves whatever manifest is on disk, like a CDN that is always current
struct DiskProbe {
    manifest: PathBuf,
    stale: bool,
}

#[async_trait]
impl ReleaseProbe for DiskProbe {
    async fn purge(&self, _url: &str) -> std::result::Result<(), DeployError> {
        Ok(())
    }

    async fn fetch_manifest(
        &self,
        _url: &str,
    ) -> std::result::Result<ManifestChannel, DeployError> {
        if self.stale {
            return Ok(ManifestChannel::named("TunnelFin"));
        }
        Ok(ManifestStore::new(&self.manifest).load().await?.channel)
    }

    async fn head_asset(&self, _url: &str) -> std::result::Result<u16, DeployError> {
        Ok(200)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    manifest: PathBuf,
    artifact: Artifact,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("manifest.json");
    tokio::fs::write(
        &manifest,
        r#"[{"guid":"c8a3e1f2-0000-4000-8000-000000000001","name":"TunnelFin","versions":[]}]"#,
    )
    .await
    .unwrap();

    let zip = dir.path().join("tunnelfin_3.1.0.2.zip");
    tokio::fs::write(&zip, b"a").await.unwrap();

    let artifact = Artifact {
        path: zip,
        version: Version::new(3, 1, 0, 2),
        checksum: "0cc175b9c0f1b6a831c399e269772661".to_string(),
    };
    Fixture {
        _dir: dir,
        manifest,
        artifact,
    }
}

fn target() -> ReleaseTarget {
    ReleaseTarget {
        plugin: PluginSelector::named("TunnelFin"),
        package: "TunnelFin".to_string(),
        repository_name: "TunnelFin".to_string(),
        manifest_url: "https://raw.githubusercontent.com/o/r/main/manifest.json".to_string(),
        coordinates: ReleaseCoordinates::new(
            "tunnelfin",
            "https://github.com/o/r/releases/download",
        ),
        target_abi: "10.11.0.0".to_string(),
        changelog: "v{version} - Local build deployment".to_string(),
    }
}

fn orchestrator(
    host: FakeHost,
    publisher: FakePublisher,
    fixture: &Fixture,
    stale_cdn: bool,
) -> DeploymentOrchestrator<FakeHost, FakePublisher, DiskProbe> {
    let probe = DiskProbe {
        manifest: fixture.manifest.clone(),
        stale: stale_cdn,
    };
    DeploymentOrchestrator::new(
        host,
        publisher,
        CdnVerifier::new(probe, Poller::default()),
        ManifestStore::new(&fixture.manifest),
        target(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_fresh_install_is_verified() {
    let fixture = fixture().await;
    let host = FakeHost::new();
    let mut orchestrator = orchestrator(host.clone(), FakePublisher::default(), &fixture, false);

    let report = orchestrator.release(&fixture.artifact).await.unwrap();

    assert!(report.passed());
    assert!(matches!(report.verification, Verification::Verified { .. }));
    assert_eq!(report.outcome_of(Phase::Uninstall), Some(PhaseOutcome::Skipped));
    assert_eq!(report.outcome_of(Phase::CdnPropagation), Some(PhaseOutcome::Success));
    assert_eq!(report.outcome_of(Phase::HealthAfterInstall), Some(PhaseOutcome::Success));

    let manifest = ManifestStore::new(&fixture.manifest).load().await.unwrap();
    let latest = manifest.channel.latest().unwrap();
    assert_eq!(latest.version, "3.1.0.2");
    assert_eq!(latest.checksum, fixture.artifact.checksum);
    assert_eq!(
        latest.source_url,
        "https://github.com/o/r/releases/download/v3.1.0.2/tunnelfin_3.1.0.2.zip"
    );
    assert_eq!(latest.changelog, "v3.1.0.2 - Local build deployment");

    assert_eq!(
        orchestrator.publisher().calls.lock().unwrap().as_slice(),
        [
            "publish v3.1.0.2".to_string(),
            format!("push v3.1.0.2 {}", fixture.artifact.checksum),
        ]
    );

    let state = host.state.lock().unwrap();
    assert_eq!(state.repositories.len(), 1);
    assert_eq!(state.repositories[0].url, target().manifest_url);
}

#[tokio::test(start_paused = true)]
async fn test_existing_installation_is_torn_down_first() {
    let fixture = fixture().await;
    let host = FakeHost::new().with_installed("3.1.0.1");
    let mut orchestrator = orchestrator(host.clone(), FakePublisher::default(), &fixture, false);

    let report = orchestrator.release(&fixture.artifact).await.unwrap();

    assert!(report.passed());
    assert_eq!(report.outcome_of(Phase::Removal), Some(PhaseOutcome::Success));
    assert_eq!(
        host.calls(),
        vec![
            "authenticate".to_string(),
            "set_repositories".to_string(),
            format!("uninstall {}", PLUGIN_ID),
            "restart".to_string(),
            "authenticate".to_string(),
            format!(
                "install TunnelFin 3.1.0.2 from {}",
                "https://raw.githubusercontent.com/o/r/main/manifest.json"
            ),
            "restart".to_string(),
            "authenticate".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rerun_for_same_version_keeps_one_manifest_entry() {
    let fixture = fixture().await;
    let host = FakeHost::new();
    let mut orchestrator = orchestrator(host, FakePublisher::default(), &fixture, false);

    orchestrator.release(&fixture.artifact).await.unwrap();
    let second = orchestrator.release(&fixture.artifact).await.unwrap();

    assert!(second.passed());
    let manifest = ManifestStore::new(&fixture.manifest).load().await.unwrap();
    assert_eq!(manifest.channel.versions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_cdn_is_a_warning_not_an_abort() {
    let fixture = fixture().await;
    let orchestrator = orchestrator(FakeHost::new(), FakePublisher::default(), &fixture, true);

    let report = orchestrator
        .with_timeouts(DeployTimeouts {
            cdn: Duration::from_secs(10),
            ..DeployTimeouts::default()
        })
        .release(&fixture.artifact)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(Phase::CdnPropagation), Some(PhaseOutcome::Timeout));
    assert!(report.passed());
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_host_after_teardown_still_installs() {
    let fixture = fixture().await;
    let mut host = FakeHost::new().with_installed("3.1.0.1");
    host.healthy = false;
    let mut orchestrator = orchestrator(host.clone(), FakePublisher::default(), &fixture, false);

    let report = orchestrator.release(&fixture.artifact).await.unwrap();

    assert_eq!(report.outcome_of(Phase::HealthAfterUninstall), Some(PhaseOutcome::Timeout));
    assert_eq!(report.outcome_of(Phase::Removal), Some(PhaseOutcome::Skipped));
    assert_eq!(report.outcome_of(Phase::Install), Some(PhaseOutcome::Success));
    // No re-authentication without a healthy host
    assert_eq!(host.calls().iter().filter(|c| *c == "authenticate").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_active_status_is_inconclusive_with_observed_record() {
    let fixture = fixture().await;
    let mut host = FakeHost::new();
    host.installed_status = PluginStatus::Restart;
    let mut orchestrator = orchestrator(host, FakePublisher::default(), &fixture, false);

    let report = orchestrator.release(&fixture.artifact).await.unwrap();

    assert!(!report.passed());
    match report.verification {
        Verification::Inconclusive {
            observed: Some(plugin),
        } => {
            assert_eq!(plugin.version, "3.1.0.2");
            assert_eq!(plugin.status, PluginStatus::Restart);
        }
        other => panic!("unexpected verification: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_aborts() {
    let fixture = fixture().await;
    let mut host = FakeHost::new();
    host.reject_login = true;
    let mut orchestrator = orchestrator(host.clone(), FakePublisher::default(), &fixture, false);

    let err = orchestrator.release(&fixture.artifact).await.unwrap_err();

    assert!(matches!(err, DeployError::Authentication(_)));
    assert_eq!(host.calls(), vec!["authenticate".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_aborts_before_host_is_touched() {
    let fixture = fixture().await;
    let host = FakeHost::new();
    let publisher = FakePublisher {
        fail_publish: true,
        ..FakePublisher::default()
    };
    let mut orchestrator = orchestrator(host.clone(), publisher, &fixture, false);

    let err = orchestrator.release(&fixture.artifact).await.unwrap_err();

    assert!(matches!(err, DeployError::Publish(_)));
    assert!(host.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_artifact_changed_after_build_aborts_before_publish() {
    let fixture = fixture().await;
    tokio::fs::write(&fixture.artifact.path, b"rebuilt").await.unwrap();
    let host = FakeHost::new();
    let mut orchestrator = orchestrator(host.clone(), FakePublisher::default(), &fixture, false);

    let err = orchestrator.release(&fixture.artifact).await.unwrap_err();

    assert!(matches!(err, DeployError::ChecksumMismatch { .. }));
    assert!(orchestrator.publisher().calls.lock().unwrap().is_empty());
    assert!(host.calls().is_empty());
    let manifest = ManifestStore::new(&fixture.manifest).load().await.unwrap();
    assert!(manifest.channel.versions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repository_mode_triggers_without_polling() {
    let fixture = fixture().await;
    let host = FakeHost::new().with_installed("3.1.0.1");
    let mut orchestrator = orchestrator(host.clone(), FakePublisher::default(), &fixture, false);
    let url = "https://cdn.jsdelivr.net/gh/o/r@feature/manifest.json";

    let report = orchestrator
        .deploy_from_repository(&Version::new(3, 1, 0, 2), url)
        .await
        .unwrap();

    assert_eq!(report.verification, Verification::NotChecked);
    assert!(report.passed());
    assert_eq!(
        host.calls(),
        vec![
            "authenticate".to_string(),
            "set_repositories".to_string(),
            format!("uninstall {}", PLUGIN_ID),
            format!("install TunnelFin 3.1.0.2 from {}", url),
            "restart".to_string(),
        ]
    );
    assert!(orchestrator.publisher().calls.lock().unwrap().is_empty());
}
