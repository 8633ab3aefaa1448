use std::fmt;

/// Warnings raised where one repository's release meets another's.
/// These are non-fatal issues that should be reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryWarning {
    /// Nothing changed since the latest tag; the package is skipped
    NoNewCommits { package: String, latest_tag: String },
    /// A dependent outside the selection keeps pinning an old version
    StalePin {
        dependent: String,
        dependency: String,
        version: String,
    },
    /// The graph declares a dependency the manifest does not list
    MissingPin {
        dependent: String,
        dependency: String,
    },
    /// A package named on the command line or in a pkgtags file is not configured
    UnknownPackage { name: String, source: String },
    /// A package sits on a dependency cycle
    CircularDependency { package: String },
    /// No workflow is configured, so nothing is dispatched
    NoWorkflowConfigured { section: String },
}

impl fmt::Display for BoundaryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryWarning::NoNewCommits {
                package,
                latest_tag,
            } => write!(
                f,
                "{}: no changes since tag '{}', skipping",
                package, latest_tag
            ),
            BoundaryWarning::StalePin {
                dependent,
                dependency,
                version,
            } => write!(
                f,
                "{} is not selected and keeps its old pin on {} (released as {})",
                dependent, dependency, version
            ),
            BoundaryWarning::MissingPin {
                dependent,
                dependency,
            } => write!(
                f,
                "{} declares a dependency on {} but its manifest does not list it",
                dependent, dependency
            ),
            BoundaryWarning::UnknownPackage { name, source } => {
                write!(f, "Ignoring unknown package '{}' from {}", name, source)
            }
            BoundaryWarning::CircularDependency { package } => {
                write!(f, "{} is part of a dependency cycle", package)
            }
            BoundaryWarning::NoWorkflowConfigured { section } => write!(
                f,
                "No [{}] section configured, skipping workflow dispatch",
                section
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_pin_display() {
        let warning = BoundaryWarning::StalePin {
            dependent: "sa-foo".to_string(),
            dependency: "sa-baz".to_string(),
            version: "0.2.0".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "sa-foo is not selected and keeps its old pin on sa-baz (released as 0.2.0)"
        );
    }

    #[test]
    fn test_no_new_commits_display() {
        let warning = BoundaryWarning::NoNewCommits {
            package: "sa-bar".to_string(),
            latest_tag: "0.1.0".to_string(),
        };
        assert!(warning.to_string().contains("'0.1.0'"));
    }
}
