//! Release orchestration across repositories
//!
//! A run checks every selected repository, computes a [ReleasePlan] and then
//! walks the repositories one at a time through the [ReleaseState] machine:
//! rewrite the manifest, stage, ask for a commit message, commit, tag. Each
//! finished release is recorded in the caller's [PkgTags] as soon as it is
//! tagged, so a failure part-way leaves an accurate artifact behind.

pub mod plan;
pub mod recorder;
pub mod state;

pub use plan::{PackagePlan, ReleasePlan, RepoSnapshot};
pub use recorder::{PkgTags, PKGTAGS_FILE};
pub use state::{ReleaseState, StateMachine};

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::boundary::BoundaryWarning;
use crate::config::{CancelPolicy, Config, PackageSpec, Selection};
use crate::domain::{BumpPolicy, Version};
use crate::editor::{strip_comments, EditOutcome};
use crate::error::{ConductorError, Result};
use crate::git::Repository;
use crate::manifest::{normalize_name, Manifest};
use crate::ui::{formatter, CommitUI, MessageRequest};

/// Options of one `release` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    pub selection: Selection,
    pub policy: BumpPolicy,
    /// Fetch from `origin` before inspecting repositories
    pub fetch: bool,
    /// Accept modified tracked files
    pub allow_dirty: bool,
    /// Plan only
    pub dry_run: bool,
}

/// A finished release of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseResult {
    pub package: String,
    pub new_version: Version,
    pub new_tag: String,
    pub commit_sha: String,
}

/// Final state of one processed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub package: String,
    pub state: ReleaseState,
    /// Present only for `Done`
    pub result: Option<ReleaseResult>,
}

/// Everything a run decided and did
#[derive(Debug, Clone)]
pub struct ReleaseReport {
    pub plan: ReleasePlan,
    pub outcomes: Vec<PackageOutcome>,
    /// A cancellation stopped the run under `on_cancel = "abort"`
    pub aborted: bool,
}

/// Whether pinning `pins` would change the manifest of `spec`; writes nothing
pub fn manifest_would_change(
    config: &Config,
    spec: &PackageSpec,
    pins: &BTreeMap<String, Version>,
) -> Result<bool> {
    let path = spec.repo_path.join(&config.manifest);
    Ok(match Manifest::load_if_exists(&path)? {
        Some(mut manifest) => {
            manifest.apply(&config.package_pattern, pins, None);
            manifest.is_changed()
        }
        None => false,
    })
}

/// Drives release runs for one configuration
pub struct Orchestrator<'a, U: CommitUI> {
    config: &'a Config,
    ui: &'a mut U,
}

impl<'a, U: CommitUI> Orchestrator<'a, U> {
    pub fn new(config: &'a Config, ui: &'a mut U) -> Self {
        Orchestrator { config, ui }
    }

    /// Run a release.
    ///
    /// `open` turns a package into its repository. Every selected
    /// repository is opened and checked before the first one is modified;
    /// any failure aborts the run with the offending package named in the
    /// error. Releases finished before a failure stay in `pkgtags`.
    pub fn run<R, F>(
        &mut self,
        options: &ReleaseOptions,
        pkgtags: &mut PkgTags,
        mut open: F,
    ) -> Result<ReleaseReport>
    where
        R: Repository,
        F: FnMut(&PackageSpec) -> Result<R>,
    {
        let selected = self.config.select(&options.selection);
        if selected.is_empty() {
            warn!("no packages selected");
        }

        let mut repos = Vec::with_capacity(selected.len());
        for spec in &selected {
            let repo = open(spec)
                .and_then(|repo| self.preflight(spec, &repo, options).map(|_| repo))
                .map_err(|e| e.in_package(&spec.name))?;
            repos.push(repo);
        }

        let mut snapshots = BTreeMap::new();
        for (spec, repo) in selected.iter().zip(&repos) {
            let snapshot = RepoSnapshot::capture(repo, &self.config.tag_format)
                .map_err(|e| e.in_package(&spec.name))?;
            snapshots.insert(spec.name.clone(), snapshot);
        }

        let config = self.config;
        let plan = plan::plan_release(config, &selected, &snapshots, options.policy, |spec, pins| {
            manifest_would_change(config, spec, pins).map_err(|e| e.in_package(&spec.name))
        })?;

        for warning in &plan.warnings {
            formatter::display_boundary_warning(warning);
        }
        formatter::display_plan(&plan, &config.tag_format);

        let mut report = ReleaseReport {
            plan,
            outcomes: Vec::new(),
            aborted: false,
        };
        if options.dry_run {
            info!("dry run, no repository modified");
            return Ok(report);
        }

        for (package, repo) in report.plan.packages.iter().zip(&repos) {
            let outcome = self
                .release_package(package, repo)
                .map_err(|e| e.in_package(&package.spec.name))?;

            if let Some(result) = &outcome.result {
                pkgtags.record(result);
            }
            let cancelled = outcome.state == ReleaseState::Cancelled;
            report.outcomes.push(outcome);

            if cancelled && config.on_cancel == CancelPolicy::Abort {
                warn!(package = %package.spec.name, "commit cancelled, stopping the run");
                report.aborted = true;
                break;
            }
        }

        Ok(report)
    }

    /// Refuse repositories that are detached, on the wrong branch or dirty
    fn preflight<R: Repository>(
        &self,
        spec: &PackageSpec,
        repo: &R,
        options: &ReleaseOptions,
    ) -> Result<()> {
        if options.fetch {
            repo.fetch_from_remote("origin")?;
        }

        let branch = repo.current_branch()?;
        if branch != spec.branch {
            return Err(ConductorError::repo_state(format!(
                "on branch '{}', expected '{}'",
                branch, spec.branch
            )));
        }

        if !options.allow_dirty {
            let dirty: Vec<String> = repo
                .changed_files()?
                .into_iter()
                .filter(|change| !change.is_untracked())
                .map(|change| change.path)
                .collect();
            if !dirty.is_empty() {
                return Err(ConductorError::repo_state(format!(
                    "uncommitted changes in {} (use --allow-dirty to release anyway)",
                    dirty.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Rewrite pins and the static version; returns whether the file changed
    fn rewrite_manifest<R: Repository>(&self, plan: &PackagePlan, repo: &R) -> Result<bool> {
        let path = repo.workdir().join(&self.config.manifest);
        let Some(mut manifest) = Manifest::load_if_exists(&path)? else {
            if !plan.pins.is_empty() {
                warn!(path = %path.display(), "no manifest, dependency pins not rewritten");
            }
            return Ok(false);
        };

        let found = manifest.apply(
            &self.config.package_pattern,
            &plan.pins,
            Some(&plan.next_version),
        );
        for dependency in plan
            .pins
            .keys()
            .filter(|name| !found.contains(&normalize_name(name)))
        {
            formatter::display_boundary_warning(&BoundaryWarning::MissingPin {
                dependent: plan.spec.name.clone(),
                dependency: dependency.clone(),
            });
        }

        manifest.save()
    }

    fn release_package<R: Repository>(
        &mut self,
        plan: &PackagePlan,
        repo: &R,
    ) -> Result<PackageOutcome> {
        let name = plan.spec.name.as_str();
        let mut machine = StateMachine::new(name);
        let outcome = |machine: &StateMachine, result: Option<ReleaseResult>| PackageOutcome {
            package: name.to_string(),
            state: machine.state(),
            result,
        };

        if !plan.release {
            machine.transition(ReleaseState::Skipped)?;
            return Ok(outcome(&machine, None));
        }

        let tag = plan.new_tag(&self.config.tag_format);
        formatter::display_status(&format!("{}: preparing {}", name, tag));

        let manifest_changed = self.rewrite_manifest(plan, repo)?;
        let changes = repo.changed_files()?;
        let has_tracked_changes = changes.iter().any(|change| !change.is_untracked());

        if !has_tracked_changes {
            if plan.commits_since_tag == 0 {
                machine.transition(ReleaseState::Skipped)?;
                return Ok(outcome(&machine, None));
            }
            machine.transition(ReleaseState::Tagged)?;
        } else {
            machine.transition(ReleaseState::Staged)?;

            let selected = self.ui.select_files(name, repo.workdir(), &changes)?;
            let mut paths: Vec<String> = selected
                .into_iter()
                .filter_map(|i| changes.get(i))
                .map(|change| change.path.clone())
                .collect();
            if manifest_changed && !paths.contains(&self.config.manifest) {
                paths.push(self.config.manifest.clone());
            }
            if !paths.is_empty() {
                repo.stage(&paths)?;
            }

            if repo.staged_paths()?.is_empty() {
                if plan.commits_since_tag == 0 {
                    machine.transition(ReleaseState::Skipped)?;
                    return Ok(outcome(&machine, None));
                }
                machine.transition(ReleaseState::Tagged)?;
            } else {
                machine.transition(ReleaseState::AwaitingMessage)?;

                let status = repo.changed_files()?;
                let request = MessageRequest {
                    package: name,
                    tag: &tag,
                    workdir: repo.workdir(),
                    git_dir: repo.git_dir(),
                    status: &status,
                };
                let message = match self.ui.edit_message(&request)? {
                    EditOutcome::Edited(raw) => strip_comments(&raw),
                    EditOutcome::Aborted => String::new(),
                };
                if message.is_empty() {
                    machine.transition(ReleaseState::Cancelled)?;
                    formatter::display_error(&format!("{}: commit cancelled", name));
                    return Ok(outcome(&machine, None));
                }

                let commit = repo.commit(&format!("{}\n", message))?;
                info!(package = name, commit = %commit, "committed release");
                machine.transition(ReleaseState::Committed)?;
                machine.transition(ReleaseState::Tagged)?;
            }
        }

        repo.create_annotated_tag(&tag, &format!("Release {}", tag))?;
        let commit_sha = repo
            .head_oid()?
            .map(|oid| oid.to_string())
            .ok_or_else(|| ConductorError::repo_state("HEAD has no commit after tagging"))?;
        info!(package = name, tag = %tag, "tagged release");

        machine.transition(ReleaseState::Done)?;
        formatter::display_success(&format!("{}: released {}", name, tag));
        Ok(outcome(
            &machine,
            Some(ReleaseResult {
                package: name.to_string(),
                new_version: plan.next_version.clone(),
                new_tag: tag,
                commit_sha,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FileChange, MockRepository};
    use crate::ui::ScriptedUI;
    use std::path::Path;

    const CONFIG: &str = r#"
packagename_regex = "sa-[a-z]+"

[repos]
sa-foo = "scm"
sa-baz = "scm-base"

[dependency_graph]
sa-foo = ["sa-baz"]
sa-baz = []
"#;

    fn config() -> Config {
        Config::from_toml_str(CONFIG, Path::new("/nonexistent")).unwrap()
    }

    #[test]
    fn test_detached_head_aborts_before_any_change() {
        let config = config();
        let mut ui = ScriptedUI::new();
        let mut pkgtags = PkgTags::new();
        let err = Orchestrator::new(&config, &mut ui)
            .run(&ReleaseOptions::default(), &mut pkgtags, |spec| {
                let repo = MockRepository::new(&spec.repo_path);
                Ok(if spec.name == "sa-baz" {
                    repo.with_branch(None)
                } else {
                    repo
                })
            })
            .unwrap_err();

        assert_eq!(err.package(), Some("sa-baz"));
        assert_eq!(err.exit_code(), 2);
        assert!(ui.prompts().is_empty());
        assert!(pkgtags.is_empty());
    }

    #[test]
    fn test_wrong_branch_is_repo_state_error() {
        let config = config();
        let mut ui = ScriptedUI::new();
        let err = Orchestrator::new(&config, &mut ui)
            .run(&ReleaseOptions::default(), &mut PkgTags::new(), |spec| {
                Ok(MockRepository::new(&spec.repo_path).with_branch(Some("develop")))
            })
            .unwrap_err();
        assert!(err.to_string().contains("expected 'master'"));
    }

    #[test]
    fn test_dirty_tree_requires_allow_dirty() {
        let config = config();
        let dirty = || {
            vec![
                FileChange::new("setup.py", ' ', 'M'),
                FileChange::new("scratch.txt", '?', '?'),
            ]
        };

        let mut ui = ScriptedUI::new();
        let err = Orchestrator::new(&config, &mut ui)
            .run(&ReleaseOptions::default(), &mut PkgTags::new(), |spec| {
                Ok(MockRepository::new(&spec.repo_path).with_changes(dirty()))
            })
            .unwrap_err();
        assert!(err.to_string().contains("setup.py"));
        assert!(!err.to_string().contains("scratch.txt"));

        let options = ReleaseOptions {
            allow_dirty: true,
            ..Default::default()
        };
        let mut ui = ScriptedUI::new().with_message("Release with local fix");
        let mut pkgtags = PkgTags::new();
        let report = Orchestrator::new(&config, &mut ui)
            .run(&options, &mut pkgtags, |spec| {
                Ok(MockRepository::new(&spec.repo_path)
                    .with_tag("0.1.0")
                    .with_changes(dirty()))
            })
            .unwrap();
        assert_eq!(report.outcomes[0].state, ReleaseState::Done);
        assert_eq!(pkgtags.get("sa-foo"), Some("0.2.0"));
    }

    #[test]
    fn test_clean_tree_with_commits_tags_head() {
        let config = config();
        let mut ui = ScriptedUI::new();
        let mut pkgtags = PkgTags::new();
        let report = Orchestrator::new(&config, &mut ui)
            .run(&ReleaseOptions::default(), &mut pkgtags, |spec| {
                let repo = MockRepository::new(&spec.repo_path).with_tag("0.1.0");
                Ok(if spec.name == "sa-baz" {
                    repo.with_commits_since_tag(3)
                } else {
                    repo
                })
            })
            .unwrap();

        let states: Vec<ReleaseState> = report.outcomes.iter().map(|o| o.state).collect();
        assert_eq!(states, vec![ReleaseState::Skipped, ReleaseState::Done]);
        assert_eq!(pkgtags.get("sa-baz"), Some("0.2.0"));
        assert!(pkgtags.get("sa-foo").is_none());
        assert!(ui.prompts().is_empty());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let config = config();
        let mut ui = ScriptedUI::new();
        let mut pkgtags = PkgTags::new();
        let options = ReleaseOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = Orchestrator::new(&config, &mut ui)
            .run(&options, &mut pkgtags, |spec| {
                Ok(MockRepository::new(&spec.repo_path).with_commits_since_tag(1))
            })
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(report.plan.released().count(), 2);
        assert!(pkgtags.is_empty());
    }

    #[test]
    fn test_fetch_failure_aborts() {
        let config = config();
        let mut ui = ScriptedUI::new();
        let options = ReleaseOptions {
            fetch: true,
            ..Default::default()
        };
        let err = Orchestrator::new(&config, &mut ui)
            .run(&options, &mut PkgTags::new(), |spec| {
                Ok(MockRepository::new(&spec.repo_path).with_remotes(&["upstream"]))
            })
            .unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }
}
