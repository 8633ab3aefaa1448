//! Release planning: which packages get released and what their
//! dependents pin, decided before any repository is touched.
//!
//! A package is released when it has commits after its latest tag, has
//! uncommitted tracked changes, or when pinning the next versions of the
//! released packages it depends on would change its manifest. The last
//! rule feeds back into itself, so the release set is grown to a fixpoint.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::boundary::BoundaryWarning;
use crate::config::{Config, PackageSpec};
use crate::domain::version::{initial_version, latest_version};
use crate::domain::{dependents_to_update, resolve_next_version, BumpPolicy, TagPattern, Version};
use crate::error::Result;
use crate::git::Repository;

/// What a repository looks like before the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub latest_tag: Option<String>,
    pub current_version: Version,
    pub commits_since_tag: usize,
    /// Tracked files are modified or staged
    pub dirty: bool,
}

impl RepoSnapshot {
    /// Read tags, commit count and status from a repository
    pub fn capture<R: Repository>(repo: &R, tag_format: &TagPattern) -> Result<Self> {
        let tags = repo.list_tags()?;
        let latest = latest_version(tags.iter().map(String::as_str), tag_format)?;

        let (latest_tag, current_version, since) = match latest {
            Some((tag, version)) => {
                let target = repo.find_tag_target(&tag)?;
                (Some(tag), version, target)
            }
            None => (None, initial_version(), None),
        };

        let commits_since_tag = repo.count_commits_since(since)?;
        let dirty = repo
            .changed_files()?
            .iter()
            .any(|change| !change.is_untracked());

        Ok(RepoSnapshot {
            latest_tag,
            current_version,
            commits_since_tag,
            dirty,
        })
    }

    /// Whether the repository has something of its own to release
    pub fn has_changes(&self) -> bool {
        self.commits_since_tag > 0 || self.dirty
    }
}

/// The decision for one selected package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    pub spec: PackageSpec,
    pub latest_tag: Option<String>,
    pub current_version: Version,
    /// Equals `current_version` when the package is not released
    pub next_version: Version,
    pub commits_since_tag: usize,
    pub release: bool,
    /// Dependency name → version its pin is rewritten to
    pub pins: BTreeMap<String, Version>,
}

impl PackagePlan {
    pub fn new_tag(&self, tag_format: &TagPattern) -> String {
        tag_format.format(&self.next_version)
    }
}

/// The plan for a whole run, in processing order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePlan {
    pub policy: BumpPolicy,
    pub packages: Vec<PackagePlan>,
    pub warnings: Vec<BoundaryWarning>,
}

impl ReleasePlan {
    pub fn package(&self, name: &str) -> Option<&PackagePlan> {
        self.packages.iter().find(|p| p.spec.name == name)
    }

    /// Names of the packages that will be released
    pub fn released(&self) -> impl Iterator<Item = &str> {
        self.packages
            .iter()
            .filter(|p| p.release)
            .map(|p| p.spec.name.as_str())
    }
}

/// Pins for `dependent`: every released package it depends on, at its next version
fn pins_for(
    dependent: &str,
    updates: &BTreeMap<String, BTreeSet<String>>,
    next_versions: &BTreeMap<String, Version>,
) -> BTreeMap<String, Version> {
    updates
        .iter()
        .filter(|(_, dependents)| dependents.contains(dependent))
        .filter_map(|(dependency, _)| {
            next_versions
                .get(dependency)
                .map(|version| (dependency.clone(), version.clone()))
        })
        .collect()
}

/// Computes the release plan for `selected`.
///
/// `snapshots` must hold an entry for every selected package.
/// `manifest_changes(spec, pins)` reports whether rewriting `spec`'s
/// manifest with `pins` would change it; it must not write anything.
pub fn plan_release<F>(
    config: &Config,
    selected: &[PackageSpec],
    snapshots: &BTreeMap<String, RepoSnapshot>,
    policy: BumpPolicy,
    mut manifest_changes: F,
) -> Result<ReleasePlan>
where
    F: FnMut(&PackageSpec, &BTreeMap<String, Version>) -> Result<bool>,
{
    let snapshot_of = |name: &str| {
        snapshots.get(name).cloned().unwrap_or(RepoSnapshot {
            latest_tag: None,
            current_version: initial_version(),
            commits_since_tag: 0,
            dirty: false,
        })
    };

    for spec in selected {
        if config.graph.is_circular(&spec.name) {
            debug!(package = %spec.name, "package is part of a dependency cycle");
        }
    }

    let mut release: BTreeSet<String> = selected
        .iter()
        .filter(|spec| snapshot_of(&spec.name).has_changes())
        .map(|spec| spec.name.clone())
        .collect();

    let next_of = |name: &str| resolve_next_version(&snapshot_of(name).current_version, policy);

    loop {
        let next_versions = release
            .iter()
            .map(|name| Ok((name.clone(), next_of(name)?)))
            .collect::<Result<BTreeMap<String, Version>>>()?;
        let updates = dependents_to_update(&config.graph, &release);

        let candidates: Vec<&PackageSpec> = selected
            .iter()
            .filter(|s| !release.contains(&s.name))
            .collect();

        let mut grown = false;
        for spec in candidates {
            let pins = pins_for(&spec.name, &updates, &next_versions);
            if !pins.is_empty() && manifest_changes(spec, &pins)? {
                debug!(package = %spec.name, "released for updated dependency pins");
                release.insert(spec.name.clone());
                grown = true;
            }
        }

        if !grown {
            break;
        }
    }

    let next_versions = release
        .iter()
        .map(|name| Ok((name.clone(), next_of(name)?)))
        .collect::<Result<BTreeMap<String, Version>>>()?;
    let updates = dependents_to_update(&config.graph, &release);
    let selected_names: BTreeSet<&str> = selected.iter().map(|s| s.name.as_str()).collect();

    let mut warnings = Vec::new();
    for (dependency, dependents) in &updates {
        for dependent in dependents.iter().filter(|d| !selected_names.contains(d.as_str())) {
            warnings.push(BoundaryWarning::StalePin {
                dependent: dependent.clone(),
                dependency: dependency.clone(),
                version: next_versions[dependency].to_string(),
            });
        }
    }

    let packages = selected
        .iter()
        .map(|spec| -> Result<PackagePlan> {
            let snapshot = snapshot_of(&spec.name);
            let is_released = release.contains(&spec.name);
            if !is_released {
                if let Some(tag) = &snapshot.latest_tag {
                    warnings.push(BoundaryWarning::NoNewCommits {
                        package: spec.name.clone(),
                        latest_tag: tag.clone(),
                    });
                }
            }
            Ok(PackagePlan {
                spec: spec.clone(),
                latest_tag: snapshot.latest_tag,
                next_version: if is_released {
                    next_of(&spec.name)?
                } else {
                    snapshot.current_version.clone()
                },
                current_version: snapshot.current_version,
                commits_since_tag: snapshot.commits_since_tag,
                release: is_released,
                pins: pins_for(&spec.name, &updates, &next_versions),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        selected = selected.len(),
        released = release.len(),
        %policy,
        "release plan computed"
    );

    Ok(ReleasePlan {
        policy,
        packages,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FileChange, MockRepository};
    use std::path::Path;

    const SCM_CONFIG: &str = r#"
packagename_regex = "sa-[a-z]+"

[repos]
sa-foo = "scm"
sa-bar = "scm-dep"
sa-baz = "scm-base"

[dependency_graph]
sa-foo = ["sa-bar", "sa-baz"]
sa-bar = ["sa-foo", "sa-baz"]
sa-baz = []
"#;

    fn config() -> Config {
        Config::from_toml_str(SCM_CONFIG, Path::new("/work")).unwrap()
    }

    fn snapshot(tag: &str, commits: usize) -> RepoSnapshot {
        RepoSnapshot {
            latest_tag: Some(tag.to_string()),
            current_version: tag.parse().unwrap(),
            commits_since_tag: commits,
            dirty: false,
        }
    }

    fn scm_snapshots(foo: usize, bar: usize, baz: usize) -> BTreeMap<String, RepoSnapshot> {
        BTreeMap::from([
            ("sa-foo".to_string(), snapshot("0.3.1", foo)),
            ("sa-bar".to_string(), snapshot("0.1.0", bar)),
            ("sa-baz".to_string(), snapshot("0.1.0", baz)),
        ])
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_scm_scenario_minor_bump() {
        let config = config();
        let plan = plan_release(
            &config,
            &config.packages,
            &scm_snapshots(1, 1, 1),
            BumpPolicy::Minor,
            |_, _| Ok(true),
        )
        .unwrap();

        let next: Vec<(&str, Version)> = plan
            .packages
            .iter()
            .map(|p| (p.spec.name.as_str(), p.next_version.clone()))
            .collect();
        assert_eq!(
            next,
            vec![
                ("sa-foo", v("0.4.0")),
                ("sa-bar", v("0.2.0")),
                ("sa-baz", v("0.2.0")),
            ]
        );

        let foo = plan.package("sa-foo").unwrap();
        assert_eq!(
            foo.pins,
            BTreeMap::from([("sa-bar".to_string(), v("0.2.0")), ("sa-baz".to_string(), v("0.2.0"))])
        );
        let bar = plan.package("sa-bar").unwrap();
        assert_eq!(
            bar.pins,
            BTreeMap::from([("sa-baz".to_string(), v("0.2.0")), ("sa-foo".to_string(), v("0.4.0"))])
        );
        assert!(plan.package("sa-baz").unwrap().pins.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_dependency_release_propagates_through_pins() {
        let config = config();
        let plan = plan_release(
            &config,
            &config.packages,
            &scm_snapshots(0, 0, 2),
            BumpPolicy::Minor,
            |_, _| Ok(true),
        )
        .unwrap();

        assert_eq!(plan.released().collect::<Vec<_>>(), vec!["sa-foo", "sa-bar", "sa-baz"]);
        assert_eq!(plan.package("sa-foo").unwrap().new_tag(&config.tag_format), "0.4.0");
    }

    #[test]
    fn test_unchanged_pins_do_not_release() {
        let config = config();
        let mut asked = Vec::new();
        let plan = plan_release(
            &config,
            &config.packages,
            &scm_snapshots(0, 0, 2),
            BumpPolicy::Patch,
            |spec, _| {
                asked.push(spec.name.clone());
                Ok(false)
            },
        )
        .unwrap();

        assert_eq!(plan.released().collect::<Vec<_>>(), vec!["sa-baz"]);
        assert_eq!(asked, vec!["sa-foo", "sa-bar"]);
        let foo = plan.package("sa-foo").unwrap();
        assert!(!foo.release);
        assert_eq!(foo.next_version, foo.current_version);
        assert!(plan.warnings.contains(&BoundaryWarning::NoNewCommits {
            package: "sa-foo".to_string(),
            latest_tag: "0.3.1".to_string(),
        }));
    }

    #[test]
    fn test_nothing_changed_releases_nothing() {
        let config = config();
        let plan = plan_release(
            &config,
            &config.packages,
            &scm_snapshots(0, 0, 0),
            BumpPolicy::Minor,
            |_, _| panic!("no pins to preview"),
        )
        .unwrap();
        assert_eq!(plan.released().count(), 0);
    }

    #[test]
    fn test_unselected_dependents_get_stale_pin_warning() {
        let config = config();
        let selected: Vec<PackageSpec> = config.select(&crate::config::Selection::Only(vec![
            "sa-baz".to_string(),
        ]));
        let plan = plan_release(
            &config,
            &selected,
            &scm_snapshots(0, 0, 1),
            BumpPolicy::Minor,
            |_, _| Ok(true),
        )
        .unwrap();

        assert_eq!(plan.packages.len(), 1);
        let stale: Vec<&BoundaryWarning> = plan
            .warnings
            .iter()
            .filter(|w| matches!(w, BoundaryWarning::StalePin { .. }))
            .collect();
        assert_eq!(stale.len(), 2);
        assert_eq!(
            stale[0],
            &BoundaryWarning::StalePin {
                dependent: "sa-bar".to_string(),
                dependency: "sa-baz".to_string(),
                version: "0.2.0".to_string(),
            }
        );
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = config();
        let run = || {
            plan_release(
                &config,
                &config.packages,
                &scm_snapshots(0, 3, 0),
                BumpPolicy::Major,
                |_, _| Ok(true),
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_snapshot_from_repository() {
        let repo = MockRepository::new("/work/scm")
            .with_tag("0.3.1")
            .with_tag("docs")
            .with_commits_since_tag(2)
            .with_changes(vec![FileChange::new("notes.txt", '?', '?')]);
        let snap = RepoSnapshot::capture(&repo, &TagPattern::default()).unwrap();
        assert_eq!(snap.latest_tag.as_deref(), Some("0.3.1"));
        assert_eq!(snap.current_version, v("0.3.1"));
        assert_eq!(snap.commits_since_tag, 2);
        assert!(!snap.dirty);
    }

    #[test]
    fn test_snapshot_untagged_repository() {
        let repo = MockRepository::new("/work/scm");
        let snap = RepoSnapshot::capture(&repo, &TagPattern::default()).unwrap();
        assert_eq!(snap.latest_tag, None);
        assert_eq!(snap.current_version, initial_version());
        assert_eq!(snap.commits_since_tag, 1);
        assert!(snap.has_changes());
    }
}
