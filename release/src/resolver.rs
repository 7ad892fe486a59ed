//! Next-version resolution
//!
//! The next release version is derived from every version string already
//! observed (git tags, GitHub releases, manifest entries): take the highest
//! and bump its build component. Strings that do not parse are ignored.

use sdk::errors::DeployError;
use sdk::types::Version;
use tracing::debug;

/// Resolve the version the next release should carry
///
/// Returns [`Version::INITIAL`] when nothing in `history` parses. Two
/// spellings of the same release (`v1.2.3` and `1.2.3.0`) collapse to one.
///
/// The result is only guaranteed to be new if every earlier result was
/// recorded as a tag or release before this call. Fails rather than repeat
/// the highest version when its build component cannot be incremented.
pub fn next_version<I, S>(history: I) -> Result<Version, DeployError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let latest = history
        .into_iter()
        .filter_map(|tag| {
            let tag = tag.as_ref();
            match tag.parse::<Version>() {
                Ok(version) => Some(version),
                Err(e) => {
                    debug!(tag = %tag, error = %e, "Ignoring unparsable version");
                    None
                }
            }
        })
        .max();

    match latest {
        Some(latest) => latest.next_build(),
        None => Ok(Version::INITIAL),
    }
}
