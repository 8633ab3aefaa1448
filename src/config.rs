use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{DependencyGraph, TagPattern};
use crate::error::{ConductorError, Result};

/// Name of a standalone configuration file
pub const CONFIG_FILE_NAME: &str = "conductor.toml";

/// Project manifest that may embed the configuration under `[tool.conductor]`
pub const PYPROJECT_FILE_NAME: &str = "pyproject.toml";

/// One released package and where its repository lives.
///
/// Identity is the name; path and branch are fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub repo_path: PathBuf,
    pub branch: String,
}

/// A GitHub Actions workflow that downstream automation is dispatched to
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub repo: String,
    pub file: String,
}

/// What a release run does after the operator cancels a commit
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    #[default]
    Continue,
    Abort,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_tag_format() -> String {
    "{version}".to_string()
}

fn default_manifest() -> String {
    PYPROJECT_FILE_NAME.to_string()
}

/// The conductor table exactly as written in the file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    packagename_regex: Option<String>,
    repos: Option<IndexMap<String, PathBuf>>,
    dependency_graph: Option<IndexMap<String, Vec<String>>>,

    #[serde(default)]
    branches: IndexMap<String, String>,

    #[serde(default = "default_branch")]
    default_branch: String,

    #[serde(default = "default_tag_format")]
    tag_format: String,

    #[serde(default = "default_manifest")]
    manifest: String,

    #[serde(default)]
    on_cancel: CancelPolicy,

    workflow: Option<WorkflowConfig>,
    bundle: Option<WorkflowConfig>,
}

/// Validated, read-only configuration shared by every command.
///
/// Packages keep the order in which `repos` declares them; that order is
/// the processing order of a release run.
#[derive(Debug, Clone)]
pub struct Config {
    pub package_pattern: Regex,
    pub packages: Vec<PackageSpec>,
    pub graph: DependencyGraph,
    pub tag_format: TagPattern,
    pub manifest: String,
    pub on_cancel: CancelPolicy,
    pub workflow: Option<WorkflowConfig>,
    pub bundle: Option<WorkflowConfig>,
}

/// Which configured packages a run processes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Only(Vec<String>),
    Exclude(Vec<String>),
}

impl Selection {
    /// Builds a selection from `--only` / `--exclude` flags.
    ///
    /// The two lists are mutually exclusive.
    pub fn from_flags(only: Vec<String>, exclude: Vec<String>) -> Result<Self> {
        match (only.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(Selection::All),
            (false, true) => Ok(Selection::Only(only)),
            (true, false) => Ok(Selection::Exclude(exclude)),
            (false, false) => Err(ConductorError::config(
                "`--only` and `--exclude` are mutually exclusive",
            )),
        }
    }
}

impl Config {
    /// Parses configuration text.
    ///
    /// The conductor table is either the document root or the
    /// `[tool.conductor]` section of a `pyproject.toml`. Relative repository
    /// paths are resolved against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut document: toml::Table = toml::from_str(content)
            .map_err(|e| ConductorError::config(format!("Invalid TOML: {}", e)))?;

        let table = match document
            .remove("tool")
            .and_then(|tool| match tool {
                toml::Value::Table(mut tool) => tool.remove("conductor"),
                _ => None,
            }) {
            Some(toml::Value::Table(section)) => section,
            Some(_) => {
                return Err(ConductorError::config(
                    "Section 'tool.conductor' must be a table",
                ))
            }
            None if document.contains_key("project") => {
                return Err(ConductorError::config("Missing section 'tool.conductor'"))
            }
            None => document,
        };

        let raw: RawConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e| ConductorError::config(format!("Invalid configuration: {}", e)))?;

        Self::from_raw(raw, base_dir)
    }

    fn from_raw(raw: RawConfig, base_dir: &Path) -> Result<Self> {
        let missing = |key: &str| ConductorError::config(format!("Missing config '{}'", key));

        let regex_src = raw
            .packagename_regex
            .ok_or_else(|| missing("packagename_regex"))?;
        let repos = raw.repos.ok_or_else(|| missing("repos"))?;
        let declared_graph = raw
            .dependency_graph
            .ok_or_else(|| missing("dependency_graph"))?;

        let package_pattern = Regex::new(&regex_src).map_err(|e| {
            ConductorError::config(format!("Invalid 'packagename_regex' {:?}: {}", regex_src, e))
        })?;

        let mut problems = Vec::new();
        for (section, names) in [
            ("repos", repos.keys().collect::<Vec<_>>()),
            ("branches", raw.branches.keys().collect()),
            ("dependency_graph", declared_graph.keys().collect()),
        ] {
            let unknown: Vec<&str> = names
                .into_iter()
                .filter(|name| !matches_at_start(&package_pattern, name))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                problems.push(format!(
                    "Unknown package names in '{}': {}",
                    section,
                    unknown.join(", ")
                ));
            }
        }
        if !problems.is_empty() {
            return Err(ConductorError::config(problems.join("; ")));
        }

        for name in raw.branches.keys().filter(|name| !repos.contains_key(*name)) {
            warn!(package = %name, "branch configured for a package without a repository");
        }

        let tag_format = TagPattern::new(&raw.tag_format)?;

        let packages = repos
            .into_iter()
            .map(|(name, path)| {
                let branch = raw
                    .branches
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| raw.default_branch.clone());
                let repo_path = if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                };
                PackageSpec {
                    name,
                    repo_path,
                    branch,
                }
            })
            .collect();

        Ok(Config {
            package_pattern,
            packages,
            graph: DependencyGraph::new(declared_graph),
            tag_format,
            manifest: raw.manifest,
            on_cancel: raw.on_cancel,
            workflow: raw.workflow,
            bundle: raw.bundle,
        })
    }

    /// Checks every declared repository path is an existing, non-bare git working copy.
    pub fn verify_repositories(&self) -> Result<()> {
        for package in &self.packages {
            let path = &package.repo_path;
            if !path.exists() {
                return Err(ConductorError::config(format!(
                    "Repository path for '{}' does not exist: {}",
                    package.name,
                    path.display()
                )));
            }
            match git2::Repository::open(path) {
                Ok(repo) if !repo.is_bare() => {
                    debug!(package = %package.name, path = %path.display(), "repository verified");
                }
                Ok(_) => {
                    return Err(ConductorError::config(format!(
                        "Repository for '{}' is bare: {}",
                        package.name,
                        path.display()
                    )))
                }
                Err(e) => {
                    return Err(ConductorError::config(format!(
                        "'{}' is not a git working copy ({}): {}",
                        path.display(),
                        package.name,
                        e.message()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Whether `name` looks like one of our packages
    pub fn is_package_name(&self, name: &str) -> bool {
        matches_at_start(&self.package_pattern, name)
    }

    /// Looks up a configured package by name
    pub fn package(&self, name: &str) -> Option<&PackageSpec> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Configured packages in the order a run processes them.
    ///
    /// `Only` keeps declared packages that were named (unknown names are
    /// dropped with a warning); `Exclude` keeps the rest. Declaration order
    /// wins over the order of the flags.
    pub fn select(&self, selection: &Selection) -> Vec<PackageSpec> {
        match selection {
            Selection::All => self.packages.clone(),
            Selection::Only(names) => {
                for name in names.iter().filter(|n| self.package(n).is_none()) {
                    warn!(package = %name, "ignoring unknown package in --only");
                }
                self.packages
                    .iter()
                    .filter(|p| names.contains(&p.name))
                    .cloned()
                    .collect()
            }
            Selection::Exclude(names) => self
                .packages
                .iter()
                .filter(|p| !names.contains(&p.name))
                .cloned()
                .collect(),
        }
    }
}

fn matches_at_start(pattern: &Regex, name: &str) -> bool {
    pattern.find(name).is_some_and(|m| m.start() == 0)
}

/// Finds the configuration file to use when none is given explicitly.
///
/// Looks in the following order:
/// 1. `conductor.toml` in `search_dir`
/// 2. `pyproject.toml` in `search_dir`
/// 3. `conductor.toml` in the user config directory
pub fn find_config(search_dir: &Path) -> Option<PathBuf> {
    [CONFIG_FILE_NAME, PYPROJECT_FILE_NAME]
        .iter()
        .map(|name| search_dir.join(name))
        .chain(dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)))
        .find(|candidate| candidate.is_file())
}

/// Loads and validates configuration.
///
/// Uses `config_path` when given, otherwise [`find_config`] from `search_dir`.
/// Fails if the file cannot be read, does not validate, or names a
/// repository that is not a git working copy.
pub fn load_config(config_path: Option<&Path>, search_dir: &Path) -> Result<Config> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config(search_dir).ok_or_else(|| {
            ConductorError::config(format!(
                "No {} or {} found in {}",
                CONFIG_FILE_NAME,
                PYPROJECT_FILE_NAME,
                search_dir.display()
            ))
        })?,
    };

    let content = fs::read_to_string(&path).map_err(|e| {
        ConductorError::config(format!("Cannot read {}: {}", path.display(), e))
    })?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| search_dir.to_path_buf());

    let config = Config::from_toml_str(&content, &base_dir)?;
    config.verify_repositories()?;
    debug!(path = %path.display(), packages = config.packages.len(), "configuration loaded");
    Ok(config)
}
