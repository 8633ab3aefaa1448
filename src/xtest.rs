//! Cross-testing: run the test suites of development checkouts against the
//! released versions of their siblings inside a dedicated virtual environment.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ConductorError, Result};
use crate::git::repository::Git2Repository;
use crate::git::Repository;
use crate::ui::formatter;

/// Directory holding development checkouts, relative to the workspace
pub const REPOS_DIR: &str = ".repos";

/// Directory holding virtual environments, relative to the workspace
pub const VENVS_DIR: &str = ".venvs";

/// File recording the requirement lines a virtual environment was built from
pub const METADATA_FILE: &str = "metadata.txt";

/// A `name==value` requirement given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub value: String,
}

impl FromStr for Requirement {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            ConductorError::InvalidRequirement(format!("'{}' is not of the form name==value", s))
        };
        let (name, value) = s.split_once("==").ok_or_else(invalid)?;
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() || value.contains("==") {
            return Err(invalid());
        }
        Ok(Requirement {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.value)
    }
}

/// Collapse requirements into one value per package, keeping first-seen order.
///
/// Repeating a requirement is harmless; giving a package two different
/// values is an error.
pub fn resolve_versions(requirements: &[Requirement]) -> Result<IndexMap<String, String>> {
    let mut resolved: IndexMap<String, String> = IndexMap::new();
    for req in requirements {
        match resolved.get(&req.name) {
            Some(existing) if *existing != req.value => {
                return Err(ConductorError::InvalidRequirement(format!(
                    "conflicting versions for {}: {} and {}",
                    req.name, existing, req.value
                )));
            }
            Some(_) => {}
            None => {
                resolved.insert(req.name.clone(), req.value.clone());
            }
        }
    }
    Ok(resolved)
}

/// Virtual environment name for a set of requirement lines.
///
/// The lines are sorted first, so the name does not depend on the order the
/// operator typed them in.
pub fn env_name(lines: &[String]) -> String {
    let mut sorted: Vec<&str> = lines.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join("\n").as_bytes());
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// One external command the cross-tester wants to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external commands; returns whether the command succeeded
pub trait CommandRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<bool>;
}

/// Runs commands as child processes sharing the terminal
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<bool> {
        debug!(command = %invocation, "running");
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        let status = command.status().map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("cannot run '{}': {}", invocation.program.display(), e),
            )
        })?;
        Ok(status.success())
    }
}

/// Inputs of one cross-test run
#[derive(Debug, Clone)]
pub struct XtestOptions {
    /// `name==version` of every package the environment should contain
    pub refs: Vec<String>,
    /// `name==gitref` of the packages to test from a checkout
    pub devs: Vec<String>,
    /// Interpreter used to create the virtual environment
    pub python: String,
    /// Directory under which `.repos` and `.venvs` live
    pub workspace: PathBuf,
}

/// Outcome of a successful cross-test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XtestReport {
    pub env_name: String,
    pub env_dir: PathBuf,
    pub tested: Vec<String>,
}

fn venv_python(env_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        env_dir.join("Scripts").join("python.exe")
    } else {
        env_dir.join("bin").join("python")
    }
}

fn run_checked<C: CommandRunner>(runner: &mut C, invocation: Invocation) -> Result<()> {
    if runner.run(&invocation)? {
        Ok(())
    } else {
        Err(ConductorError::Io(std::io::Error::other(format!(
            "command failed: {}",
            invocation
        ))))
    }
}

/// Clone the package into `.repos/<name>` or reuse an earlier clone
fn checkout_dev(config: &Config, workspace: &Path, name: &str) -> Result<Git2Repository> {
    let spec = config
        .package(name)
        .ok_or_else(|| ConductorError::config(format!("'{}' is not a configured repository", name)))?;
    let target = workspace.join(REPOS_DIR).join(name);

    if target.join(".git").exists() {
        let repo = Git2Repository::open(&target)?;
        repo.fetch_from_remote("origin")?;
        debug!(package = name, path = %target.display(), "reusing checkout");
        Ok(repo)
    } else {
        fs::create_dir_all(workspace.join(REPOS_DIR))?;
        let url = spec.repo_path.to_string_lossy();
        Git2Repository::clone_from(&url, &target, &spec.branch)
    }
}

/// Test development checkouts against reference versions of their siblings.
///
/// Every `--dev` package must be configured and must also be given a
/// reference version; it is installed from its checkout, then checked out at
/// its reference tag to run its `tests/` suite.
pub fn cross_test<C: CommandRunner>(
    config: &Config,
    options: &XtestOptions,
    runner: &mut C,
) -> Result<XtestReport> {
    let refs: Vec<Requirement> = options
        .refs
        .iter()
        .map(|s| s.parse())
        .collect::<Result<_>>()?;
    let devs: Vec<Requirement> = options
        .devs
        .iter()
        .map(|s| s.parse())
        .collect::<Result<_>>()?;
    let ref_versions = resolve_versions(&refs)?;
    let dev_refs = resolve_versions(&devs)?;

    for name in dev_refs.keys() {
        if config.package(name).is_none() {
            return Err(ConductorError::config(format!(
                "'{}' is not a configured repository",
                name
            )));
        }
        if !ref_versions.contains_key(name) {
            return Err(ConductorError::InvalidRequirement(format!(
                "development package '{}' has no reference version",
                name
            )));
        }
    }

    let mut lines: Vec<String> = ref_versions
        .iter()
        .map(|(name, version)| format!("{}=={}", name, version))
        .chain(dev_refs.iter().map(|(name, rev)| format!("{}=={}", name, rev)))
        .collect();
    lines.sort();
    let env = env_name(&lines);
    info!(env = %env, requirements = %lines.join(","), "cross-test environment");

    let mut checkouts: BTreeMap<String, Git2Repository> = BTreeMap::new();
    for (name, rev) in &dev_refs {
        formatter::display_status(&format!("{}: checking out {}", name, rev));
        let repo = checkout_dev(config, &options.workspace, name).map_err(|e| e.in_package(name))?;
        repo.checkout_detached(rev).map_err(|e| e.in_package(name))?;
        checkouts.insert(name.clone(), repo);
    }

    let env_dir = options.workspace.join(VENVS_DIR).join(&env);
    fs::create_dir_all(&env_dir)?;
    formatter::display_status(&format!("Creating virtual environment {}", env));
    run_checked(
        runner,
        Invocation::new(&options.python)
            .args(["-m", "venv"])
            .arg(env_dir.to_string_lossy()),
    )?;
    let mut metadata = lines.join("\n");
    metadata.push('\n');
    fs::write(env_dir.join(METADATA_FILE), metadata)?;

    let python = venv_python(&env_dir);
    run_checked(
        runner,
        Invocation::new(&python).args(["-m", "pip", "install", "-U", "pip"]),
    )?;

    let released: Vec<String> = ref_versions
        .iter()
        .filter(|(name, _)| !dev_refs.contains_key(*name))
        .map(|(name, version)| format!("{}=={}", name, version))
        .collect();
    if !released.is_empty() {
        run_checked(
            runner,
            Invocation::new(&python)
                .args(["-m", "pip", "install"])
                .args(released),
        )?;
    }

    let dev_paths: Vec<String> = checkouts
        .values()
        .map(|repo| repo.workdir().to_string_lossy().into_owned())
        .collect();
    if !dev_paths.is_empty() {
        run_checked(
            runner,
            Invocation::new(&python)
                .args(["-m", "pip", "install", "--no-deps"])
                .args(dev_paths),
        )?;
    }

    let mut failures = Vec::new();
    let mut tested = Vec::new();
    for (name, repo) in &checkouts {
        let version = &ref_versions[name];
        let tag = config.tag_format.format(version);
        repo.checkout_detached(&tag).map_err(|e| e.in_package(name))?;

        formatter::display_status(&format!("{}: running tests at {}", name, tag));
        let passed = runner.run(
            &Invocation::new(&python)
                .args(["-m", "unittest", "discover", "-s", "tests"])
                .current_dir(repo.workdir()),
        )?;
        if passed {
            formatter::display_success(&format!("{}: tests passed", name));
        } else {
            formatter::display_error(&format!("{}: tests failed", name));
            failures.push(name.clone());
        }
        tested.push(name.clone());
    }

    if !failures.is_empty() {
        return Err(ConductorError::TestsFailed(failures));
    }

    Ok(XtestReport {
        env_name: env,
        env_dir,
        tested,
    })
}
