//! Git operations abstraction layer
//!
//! The release orchestrator and the publisher only talk to repositories
//! through the [Repository] trait. Implementations:
//!
//! - [repository::Git2Repository]: a working copy opened with the `git2` crate
//! - [mock::MockRepository]: an in-memory stand-in for tests
//!
//! ```rust
//! # use conductor::git::Repository;
//! # fn example<R: Repository>(repo: &R) -> conductor::error::Result<()> {
//! let branch = repo.current_branch()?;
//! let tags = repo.list_tags()?;
//! println!("{} carries {} tags", branch, tags.len());
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::Git2Repository;

use std::fmt;
use std::path::Path;

use git2::Oid;

use crate::error::Result;

/// One entry of the working-tree status, in porcelain form.
///
/// `index` and `worktree` are the two status letters `git status --short`
/// prints (`' '` for unchanged, `'?'` for untracked).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub index: char,
    pub worktree: char,
}

impl FileChange {
    pub fn new(path: impl Into<String>, index: char, worktree: char) -> Self {
        FileChange {
            path: path.into(),
            index,
            worktree,
        }
    }

    /// Whether the file is unknown to git
    pub fn is_untracked(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    /// Whether the file has changes already recorded in the index
    pub fn is_staged(&self) -> bool {
        !self.is_untracked() && self.index != ' '
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.index, self.worktree, self.path)
    }
}

/// Common git operation trait for abstraction
///
/// All methods return [crate::error::Result<T>]; implementations map
/// `git2::Error` through `ConductorError::Git` and report unusable
/// repository states as `ConductorError::RepoState`.
///
/// Methods that modify the repository take `&self`: a repository handle is
/// a view onto on-disk state, not an owned value.
pub trait Repository {
    /// Root of the working tree
    fn workdir(&self) -> &Path;

    /// The `.git` directory
    fn git_dir(&self) -> &Path;

    /// Name of the checked-out branch.
    ///
    /// # Returns
    /// * `Err(RepoState)` - if HEAD is detached
    fn current_branch(&self) -> Result<String>;

    /// The commit HEAD points at, or `None` for a repository without commits
    fn head_oid(&self) -> Result<Option<Oid>>;

    /// All tag names in the repository
    fn list_tags(&self) -> Result<Vec<String>>;

    /// The commit a tag points at (annotated tags are peeled)
    ///
    /// # Returns
    /// * `Ok(None)` - if the tag doesn't exist
    fn find_tag_target(&self, tag_name: &str) -> Result<Option<Oid>>;

    /// Number of commits reachable from HEAD but not from `since`.
    ///
    /// With `since = None` every commit reachable from HEAD is counted.
    fn count_commits_since(&self, since: Option<Oid>) -> Result<usize>;

    /// Working-tree status, ignored files excluded, sorted by path
    fn changed_files(&self) -> Result<Vec<FileChange>>;

    /// Record the current content of `paths` in the index.
    ///
    /// Paths are relative to the working tree; deleted files are removed
    /// from the index.
    fn stage(&self, paths: &[String]) -> Result<()>;

    /// Paths whose index content differs from HEAD
    fn staged_paths(&self) -> Result<Vec<String>>;

    /// Commit the index on top of HEAD and return the new commit
    fn commit(&self, message: &str) -> Result<Oid>;

    /// Create an annotated tag on HEAD
    ///
    /// # Returns
    /// * `Err` - if the tag already exists
    fn create_annotated_tag(&self, name: &str, message: &str) -> Result<Oid>;

    /// Configured remote names, `origin` first and the rest sorted
    fn list_remotes(&self) -> Result<Vec<String>>;

    /// Fetch branches and tags from a remote
    fn fetch_from_remote(&self, remote: &str) -> Result<()>;

    /// Push full refspecs (e.g. `refs/tags/1.0.0:refs/tags/1.0.0`) to a remote
    fn push(&self, remote: &str, refspecs: &[String]) -> Result<()>;
}

/// Lets callers lend out a repository they keep ownership of
impl<R: Repository + ?Sized> Repository for &R {
    fn workdir(&self) -> &Path {
        (**self).workdir()
    }

    fn git_dir(&self) -> &Path {
        (**self).git_dir()
    }

    fn current_branch(&self) -> Result<String> {
        (**self).current_branch()
    }

    fn head_oid(&self) -> Result<Option<Oid>> {
        (**self).head_oid()
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        (**self).list_tags()
    }

    fn find_tag_target(&self, tag_name: &str) -> Result<Option<Oid>> {
        (**self).find_tag_target(tag_name)
    }

    fn count_commits_since(&self, since: Option<Oid>) -> Result<usize> {
        (**self).count_commits_since(since)
    }

    fn changed_files(&self) -> Result<Vec<FileChange>> {
        (**self).changed_files()
    }

    fn stage(&self, paths: &[String]) -> Result<()> {
        (**self).stage(paths)
    }

    fn staged_paths(&self) -> Result<Vec<String>> {
        (**self).staged_paths()
    }

    fn commit(&self, message: &str) -> Result<Oid> {
        (**self).commit(message)
    }

    fn create_annotated_tag(&self, name: &str, message: &str) -> Result<Oid> {
        (**self).create_annotated_tag(name, message)
    }

    fn list_remotes(&self) -> Result<Vec<String>> {
        (**self).list_remotes()
    }

    fn fetch_from_remote(&self, remote: &str) -> Result<()> {
        (**self).fetch_from_remote(remote)
    }

    fn push(&self, remote: &str, refspecs: &[String]) -> Result<()> {
        (**self).push(remote, refspecs)
    }
}

/// Refspec that pushes a local branch to the same name on the remote
pub fn branch_refspec(branch: &str) -> String {
    format!("refs/heads/{0}:refs/heads/{0}", branch)
}

/// Refspec that pushes a tag to the same name on the remote
pub fn tag_refspec(tag: &str) -> String {
    format!("refs/tags/{0}:refs/tags/{0}", tag)
}

/// Order remote names with `origin` first, then alphabetically
pub(crate) fn sort_remotes(remotes: &mut [String]) {
    remotes.sort_by(|a, b| {
        if a == "origin" {
            std::cmp::Ordering::Less
        } else if b == "origin" {
            std::cmp::Ordering::Greater
        } else {
            a.cmp(b)
        }
    });
}
