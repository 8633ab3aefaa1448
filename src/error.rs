use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for conductor operations
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version parsing error: cannot parse tag '{tag}': {reason}")]
    VersionParse { tag: String, reason: String },

    #[error("Repository state error: {0}")]
    RepoState(String),

    #[error("Editor error: {0}")]
    Editor(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Manifest error in {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("Workflow dispatch failed: {0}")]
    Workflow(String),

    #[error("Invalid requirement spec: {0}")]
    InvalidRequirement(String),

    #[error("Cross-tests failed for: {}", .0.join(", "))]
    TestsFailed(Vec<String>),

    #[error("{package}: {source}")]
    Repository {
        package: String,
        #[source]
        source: Box<ConductorError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results in conductor
pub type Result<T> = std::result::Result<T, ConductorError>;

impl ConductorError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ConductorError::Config(msg.into())
    }

    /// Create a version parsing error for a tag
    pub fn version_parse(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        ConductorError::VersionParse {
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// Create a repository state error with context
    pub fn repo_state(msg: impl Into<String>) -> Self {
        ConductorError::RepoState(msg.into())
    }

    /// Create an editor error with context
    pub fn editor(msg: impl Into<String>) -> Self {
        ConductorError::Editor(msg.into())
    }

    /// Create a remote error with context
    pub fn remote(msg: impl Into<String>) -> Self {
        ConductorError::Remote(msg.into())
    }

    /// Create a manifest error for a file
    pub fn manifest(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        ConductorError::Manifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a workflow dispatch error with context
    pub fn workflow(msg: impl Into<String>) -> Self {
        ConductorError::Workflow(msg.into())
    }

    /// Attribute this error to a package's repository.
    ///
    /// Errors that already name a repository are returned unchanged.
    pub fn in_package(self, package: impl Into<String>) -> Self {
        match self {
            err @ ConductorError::Repository { .. } => err,
            err => ConductorError::Repository {
                package: package.into(),
                source: Box::new(err),
            },
        }
    }

    /// The package whose repository raised this error, if known
    pub fn package(&self) -> Option<&str> {
        match self {
            ConductorError::Repository { package, .. } => Some(package),
            _ => None,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ConductorError::Config(_) => 1,
            ConductorError::RepoState(_) => 2,
            ConductorError::Editor(_) => 3,
            ConductorError::VersionParse { .. } => 4,
            ConductorError::Git(_) | ConductorError::Remote(_) => 5,
            ConductorError::Workflow(_) => 6,
            ConductorError::InvalidRequirement(_) => 7,
            ConductorError::TestsFailed(_) => 8,
            ConductorError::Repository { source, .. } => source.exit_code(),
            ConductorError::Manifest { .. }
            | ConductorError::Io(_)
            | ConductorError::Json(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConductorError::config("missing 'repos'");
        assert_eq!(err.to_string(), "Configuration error: missing 'repos'");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ConductorError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_version_parse_names_tag() {
        let err = ConductorError::version_parse("v1.x.0", "invalid minor");
        let msg = err.to_string();
        assert!(msg.contains("v1.x.0"));
        assert!(msg.contains("invalid minor"));
    }

    #[test]
    fn test_in_package_wraps_once() {
        let err = ConductorError::repo_state("HEAD is detached")
            .in_package("sa-foo")
            .in_package("sa-bar");
        assert_eq!(err.package(), Some("sa-foo"));
        assert_eq!(
            err.to_string(),
            "sa-foo: Repository state error: HEAD is detached"
        );
    }

    #[test]
    fn test_reported_git_error_names_cause_once() {
        let err = anyhow::Error::from(
            ConductorError::from(git2::Error::from_str("config value 'user.name' was not found"))
                .in_package("sa-foo"),
        );
        let reported = err.to_string();
        assert!(reported.starts_with("sa-foo: Git operation failed"));
        assert_eq!(reported.matches("user.name").count(), 1);
    }

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let errors = vec![
            (ConductorError::config("x"), 1),
            (ConductorError::repo_state("x"), 2),
            (ConductorError::editor("x"), 3),
            (ConductorError::version_parse("x", "y"), 4),
            (ConductorError::remote("x"), 5),
            (ConductorError::workflow("x"), 6),
            (ConductorError::InvalidRequirement("x".to_string()), 7),
            (ConductorError::TestsFailed(vec!["sa-foo".to_string()]), 8),
        ];

        for (err, code) in errors {
            assert_eq!(err.exit_code(), code, "unexpected code for '{}'", err);
        }
    }

    #[test]
    fn test_wrapped_error_keeps_exit_code() {
        let err = ConductorError::editor("no editor").in_package("sa-baz");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_tests_failed_lists_packages() {
        let err = ConductorError::TestsFailed(vec!["sa-foo".to_string(), "sa-bar".to_string()]);
        assert_eq!(err.to_string(), "Cross-tests failed for: sa-foo, sa-bar");
    }
}
