//! Release history for version resolution
//!
//! Gathers every version string already used: local git tags, recent
//! published releases and the entries of the local manifest. A source that
//! cannot be read contributes nothing.

use jellyship_release::{next_version, ManifestStore};
use sdk::errors::DeployError;
use sdk::types::Version;
use tracing::{debug, info};

use crate::toolchain::{Git, ReleasePublisher};

/// Every known release version string, unparsed
pub async fn collect_history<P: ReleasePublisher + ?Sized>(
    git: &Git,
    publisher: &P,
    store: &ManifestStore,
) -> Vec<String> {
    let mut history = git.release_tags().await;
    let tags = history.len();

    let releases = publisher.release_tags().await;
    let published = releases.len();
    history.extend(releases);

    match store.load_existing().await {
        Ok(Some(manifest)) => history.extend(
            manifest
                .channel
                .versions
                .into_iter()
                .map(|entry| entry.version),
        ),
        Ok(None) => debug!(path = %store.path().display(), "No local manifest"),
        Err(e) => debug!(error = %e, "Local manifest unreadable, ignoring"),
    }

    debug!(tags, published, total = history.len(), "Collected release history");
    history
}

/// Resolve the next version from all history sources
pub async fn resolve_next_version<P: ReleasePublisher + ?Sized>(
    git: &Git,
    publisher: &P,
    store: &ManifestStore,
) -> Result<Version, DeployError> {
    let history = collect_history(git, publisher, store).await;
    let version = next_version(&history)?;
    info!(version = %version, known = history.len(), "Resolved next version");
    Ok(version)
}
