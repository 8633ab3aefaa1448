//! The `pkgtags.json` artifact: package name to released tag.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::release::ReleaseResult;

/// Default file name of the artifact
pub const PKGTAGS_FILE: &str = "pkgtags.json";

/// Package → tag mapping in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgTags(IndexMap<String, String>);

impl PkgTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished release; a package released twice keeps its position
    pub fn record(&mut self, result: &ReleaseResult) {
        self.0.insert(result.package.clone(), result.new_tag.clone());
    }

    pub fn get(&self, package: &str) -> Option<&str> {
        self.0.get(package).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pretty-printed with a 4-space indent
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Single-line JSON, as passed to workflow inputs
    pub fn to_json_compact(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut content = self.to_json_pretty()?;
        content.push('\n');
        fs::write(path, content)?;
        debug!(path = %path.display(), packages = self.len(), "wrote pkgtags");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl FromIterator<(String, String)> for PkgTags {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        PkgTags(iter.into_iter().collect())
    }
}
