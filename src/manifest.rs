//! Build-metadata editing for released packages.
//!
//! Each repository carries a `pyproject.toml` whose `[project].dependencies`
//! pin sibling packages. Releasing a package rewrites those pins in its
//! dependents and, when the version is static, the package's own
//! `[project].version`. Edits go through `toml_edit` so comments, ordering
//! and untouched entries survive byte for byte.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use toml_edit::{DocumentMut, Item, Value};
use tracing::debug;

use crate::domain::Version;
use crate::error::{ConductorError, Result};

/// A parsed `pyproject.toml` together with the text it was read from
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    original: String,
    doc: DocumentMut,
}

/// Normalizes a distribution name the way package indexes compare them:
/// lowercase, runs of `-`, `_` and `.` collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalized
}

/// The package name a requirement string starts with, if it is one of ours
fn requirement_name<'r>(pattern: &Regex, requirement: &'r str) -> Option<&'r str> {
    pattern
        .find(requirement.trim_start())
        .filter(|m| m.start() == 0)
        .map(|m| m.as_str())
}

/// Replaces a value while keeping the whitespace and comments around it
fn replace_keeping_decor(slot: &mut Value, text: String) {
    let decor = slot.decor().clone();
    *slot = Value::from(text);
    *slot.decor_mut() = decor;
}

impl Manifest {
    /// Parse manifest text; `path` is used for error messages and [`Manifest::save`]
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let path = path.into();
        let doc = content
            .parse::<DocumentMut>()
            .map_err(|e| ConductorError::manifest(&path, format!("Failed to parse: {}", e)))?;
        Ok(Manifest {
            path,
            original: content.to_string(),
            doc,
        })
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConductorError::manifest(path, format!("Failed to read: {}", e)))?;
        Self::parse(path, &content)
    }

    /// Like [`Manifest::load`], but a missing file is `Ok(None)`
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        if path.is_file() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalized names of our packages listed in `[project].dependencies`
    pub fn listed_packages(&self, pattern: &Regex) -> BTreeSet<String> {
        self.doc
            .get("project")
            .and_then(|project| project.get("dependencies"))
            .and_then(Item::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|req| requirement_name(pattern, req))
                    .map(normalize_name)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `[project].version` is listed in `[project].dynamic`
    fn version_is_dynamic(&self) -> bool {
        self.doc
            .get("project")
            .and_then(|project| project.get("dynamic"))
            .and_then(Item::as_array)
            .is_some_and(|dynamic| dynamic.iter().any(|v| v.as_str() == Some("version")))
    }

    /// Rewrites pins and the static version in memory.
    ///
    /// Every dependency whose name is in `pins` becomes `{name}>={version}`,
    /// keeping an environment marker. Returns the normalized names of the
    /// pins that were found.
    pub fn apply(
        &mut self,
        pattern: &Regex,
        pins: &BTreeMap<String, Version>,
        version: Option<&Version>,
    ) -> BTreeSet<String> {
        let pins: BTreeMap<String, &Version> = pins
            .iter()
            .map(|(name, version)| (normalize_name(name), version))
            .collect();
        let rewrite_version = version.filter(|_| !self.version_is_dynamic());
        let mut found = BTreeSet::new();

        let Some(project) = self
            .doc
            .get_mut("project")
            .and_then(Item::as_table_like_mut)
        else {
            return found;
        };

        if let Some(deps) = project
            .get_mut("dependencies")
            .and_then(Item::as_array_mut)
        {
            for slot in deps.iter_mut() {
                let Some(requirement) = slot.as_str() else {
                    continue;
                };
                let Some(name) = requirement_name(pattern, requirement) else {
                    continue;
                };
                let key = normalize_name(name);
                let Some(pinned) = pins.get(&key) else {
                    continue;
                };

                let mut rewritten = format!("{}>={}", name, pinned);
                if let Some((_, marker)) = requirement.split_once(';') {
                    rewritten.push_str("; ");
                    rewritten.push_str(marker.trim());
                }
                replace_keeping_decor(slot, rewritten);
                found.insert(key);
            }
        }

        if let Some(new_version) = rewrite_version {
            if let Some(slot) = project.get_mut("version").and_then(Item::as_value_mut) {
                if slot.is_str() {
                    replace_keeping_decor(slot, new_version.to_string());
                }
            }
        }

        found
    }

    /// Whether the in-memory document differs from the text it was read from
    pub fn is_changed(&self) -> bool {
        self.doc.to_string() != self.original
    }

    /// Writes the document back if it changed; returns whether it wrote
    pub fn save(&mut self) -> Result<bool> {
        let rendered = self.doc.to_string();
        if rendered == self.original {
            return Ok(false);
        }
        fs::write(&self.path, &rendered)
            .map_err(|e| ConductorError::manifest(&self.path, format!("Failed to write: {}", e)))?;
        debug!(path = %self.path.display(), "manifest updated");
        self.original = rendered;
        Ok(true)
    }
}
