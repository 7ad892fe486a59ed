//! Plugin repository manifest schema
//!
//! A repository manifest is a JSON array holding exactly one channel object.
//! The channel carries descriptive fields (guid, name, owner, ...) that this
//! tool never interprets, plus the `versions` list it maintains. List position
//! is the recency signal: index 0 is the most recent release.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DeployError;
use crate::types::Version;

/// One release's manifest record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: String,
    pub changelog: String,
    pub target_abi: String,
    pub source_url: String,
    pub checksum: String,
    pub timestamp: String,
}

impl VersionEntry {
    /// Whether this entry describes `version`
    ///
    /// Entries whose version string parses are compared numerically, so
    /// `2.0.0` and `2.0.0.0` are the same release. Unparsable entries only
    /// match on exact string equality with the canonical form.
    pub fn is_version(&self, version: &Version) -> bool {
        match self.version.parse::<Version>() {
            Ok(parsed) => parsed == *version,
            Err(_) => self.version == version.to_string(),
        }
    }
}

/// A single distribution channel and its release history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestChannel {
    /// Channel fields other than `versions`, preserved in file order
    #[serde(flatten)]
    pub details: Map<String, Value>,

    pub versions: Vec<VersionEntry>,
}

impl ManifestChannel {
    /// Empty channel with the given display name
    pub fn named(name: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("name".to_string(), Value::String(name.into()));
        Self {
            details,
            versions: Vec::new(),
        }
    }

    /// Most recent entry by position
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.versions.first()
    }

    pub fn find(&self, version: &Version) -> Option<&VersionEntry> {
        self.versions.iter().find(|entry| entry.is_version(version))
    }

    pub fn find_mut(&mut self, version: &Version) -> Option<&mut VersionEntry> {
        self.versions.iter_mut().find(|entry| entry.is_version(version))
    }
}

/// The manifest file: a one-element array around a [`ManifestChannel`]
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFile {
    pub channel: ManifestChannel,
}

impl ManifestFile {
    /// Parse manifest JSON, rejecting anything but `[ { ..., "versions": [...] } ]`
    pub fn from_json(json: &str) -> Result<Self, DeployError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DeployError::Manifest(format!("invalid JSON: {}", e)))?;

        let mut elements = match value {
            Value::Array(elements) => elements,
            other => {
                return Err(DeployError::ManifestShape(format!(
                    "top-level value must be an array, found {}",
                    json_kind(&other)
                )))
            }
        };

        if elements.len() != 1 {
            return Err(DeployError::ManifestShape(format!(
                "expected exactly one channel, found {}",
                elements.len()
            )));
        }

        let element = elements.remove(0);
        if !element.is_object() {
            return Err(DeployError::ManifestShape(format!(
                "channel must be an object, found {}",
                json_kind(&element)
            )));
        }

        let channel: ManifestChannel = serde_json::from_value(element)
            .map_err(|e| DeployError::ManifestShape(format!("invalid channel: {}", e)))?;

        Ok(Self { channel })
    }

    /// Serialize with four-space indentation, matching hand-edited manifests
    pub fn to_json(&self) -> Result<String, DeployError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        [&self.channel]
            .serialize(&mut serializer)
            .map_err(|e| DeployError::Manifest(format!("failed to serialize: {}", e)))?;

        let mut json = String::from_utf8(buf)
            .map_err(|e| DeployError::Manifest(format!("non UTF-8 output: {}", e)))?;
        json.push('\n');
        Ok(json)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
