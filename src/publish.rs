//! Pushing released tags and dispatching downstream workflows.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::boundary::BoundaryWarning;
use crate::config::{Config, PackageSpec, WorkflowConfig};
use crate::error::{ConductorError, Result};
use crate::git::{branch_refspec, tag_refspec, Repository};
use crate::release::PkgTags;
use crate::ui::{formatter, CommitUI};

/// Something that can start a CI workflow with JSON inputs
pub trait WorkflowDispatcher {
    fn dispatch(&self, workflow: &WorkflowConfig, inputs: &Value) -> Result<()>;
}

/// Dispatches through the GitHub CLI:
/// `gh workflow run --json --repo REPO FILE`, inputs on stdin.
pub struct GhCli {
    program: PathBuf,
}

impl GhCli {
    pub fn new() -> Self {
        GhCli {
            program: PathBuf::from("gh"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        GhCli {
            program: program.into(),
        }
    }
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowDispatcher for GhCli {
    fn dispatch(&self, workflow: &WorkflowConfig, inputs: &Value) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(["workflow", "run", "--json", "--repo"])
            .arg(&workflow.repo)
            .arg(&workflow.file)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ConductorError::workflow(format!(
                    "'{}' could not be started ({}), is the GitHub CLI installed?",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // a child that exits early closes its end of the pipe
            if let Err(e) = stdin.write_all(inputs.to_string().as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ConductorError::workflow(format!(
                "{}/{}: {}",
                workflow.repo,
                workflow.file,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            println!("{}", stdout.trim_end());
        }
        info!(repo = %workflow.repo, file = %workflow.file, "workflow dispatched");
        Ok(())
    }
}

/// What `publish` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// (package, remote, tag) per pushed repository
    pub pushed: Vec<(String, String, String)>,
    pub dispatched: bool,
}

/// Push every released branch and tag, then dispatch the publish workflow.
///
/// Packages are visited in configuration order; tags for packages the
/// configuration does not know are reported and ignored.
pub fn publish<R, F, U, D>(
    config: &Config,
    pkgtags: &PkgTags,
    mut open: F,
    ui: &mut U,
    dispatcher: &D,
) -> Result<PublishReport>
where
    R: Repository,
    F: FnMut(&PackageSpec) -> Result<R>,
    U: CommitUI,
    D: WorkflowDispatcher,
{
    for (name, _) in pkgtags.iter().filter(|(name, _)| config.package(name).is_none()) {
        formatter::display_boundary_warning(&BoundaryWarning::UnknownPackage {
            name: name.to_string(),
            source: "pkgtags".to_string(),
        });
    }

    let mut report = PublishReport::default();
    for spec in &config.packages {
        let Some(tag) = pkgtags.get(&spec.name) else {
            continue;
        };

        let remote = push_release(spec, tag, &mut open, ui).map_err(|e| e.in_package(&spec.name))?;
        formatter::display_success(&format!(
            "{}: pushed {} and {} to {}",
            spec.name, spec.branch, tag, remote
        ));
        report
            .pushed
            .push((spec.name.clone(), remote, tag.to_string()));
    }

    match &config.workflow {
        Some(workflow) => {
            let inputs = serde_json::to_value(pkgtags)?;
            dispatcher.dispatch(workflow, &inputs)?;
            report.dispatched = true;
        }
        None => formatter::display_boundary_warning(&BoundaryWarning::NoWorkflowConfigured {
            section: "workflow".to_string(),
        }),
    }

    Ok(report)
}

fn push_release<R, F, U>(spec: &PackageSpec, tag: &str, open: &mut F, ui: &mut U) -> Result<String>
where
    R: Repository,
    F: FnMut(&PackageSpec) -> Result<R>,
    U: CommitUI,
{
    let repo = open(spec)?;
    let remotes = repo.list_remotes()?;
    let remote = match remotes.as_slice() {
        [] => return Err(ConductorError::remote("no remotes configured")),
        [only] => only.clone(),
        _ => ui.select_remote(&spec.name, &remotes)?,
    };

    if repo.find_tag_target(tag)?.is_none() {
        return Err(ConductorError::repo_state(format!("tag '{}' does not exist", tag)));
    }

    debug!(package = %spec.name, remote = %remote, tag, "pushing release");
    repo.push(&remote, &[branch_refspec(&spec.branch), tag_refspec(tag)])?;
    Ok(remote)
}

/// Dispatch the bundle workflow with the compact pkgtags and an optional name
pub fn bundle<D: WorkflowDispatcher>(
    config: &Config,
    pkgtags: &PkgTags,
    name: Option<&str>,
    dispatcher: &D,
) -> Result<()> {
    let workflow = config
        .bundle
        .as_ref()
        .ok_or_else(|| ConductorError::config("No [bundle] section configured"))?;

    let mut inputs = json!({ "pkgtags": pkgtags.to_json_compact()? });
    if let Some(name) = name {
        inputs["name"] = Value::String(name.to_string());
    }

    dispatcher.dispatch(workflow, &inputs)
}
