use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::Oid;

use crate::error::{ConductorError, Result};
use crate::git::{sort_remotes, FileChange, Repository};

/// Mock repository for testing without actual git operations.
///
/// Mutating calls are recorded so tests can assert on them; commits and
/// tags get synthetic object ids.
pub struct MockRepository {
    workdir: PathBuf,
    git_dir: PathBuf,
    branch: Option<String>,
    head: RefCell<Option<Oid>>,
    tags: RefCell<BTreeMap<String, Oid>>,
    commits_since_tag: usize,
    changes: RefCell<Vec<FileChange>>,
    staged: RefCell<Vec<String>>,
    remotes: Vec<String>,
    failing_remotes: Vec<String>,
    commits: RefCell<Vec<String>>,
    fetches: RefCell<Vec<String>>,
    pushes: RefCell<Vec<(String, Vec<String>)>>,
    next_id: RefCell<u8>,
}

impl MockRepository {
    /// Create a mock repository on branch `master` with one commit and no tags
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        MockRepository {
            git_dir: workdir.join(".git"),
            workdir,
            branch: Some("master".to_string()),
            head: RefCell::new(Some(Self::oid(1))),
            tags: RefCell::new(BTreeMap::new()),
            commits_since_tag: 0,
            changes: RefCell::new(Vec::new()),
            staged: RefCell::new(Vec::new()),
            remotes: vec!["origin".to_string()],
            failing_remotes: Vec::new(),
            commits: RefCell::new(Vec::new()),
            fetches: RefCell::new(Vec::new()),
            pushes: RefCell::new(Vec::new()),
            next_id: RefCell::new(2),
        }
    }

    fn oid(n: u8) -> Oid {
        Oid::from_bytes(&[n; 20]).unwrap_or_else(|_| Oid::zero())
    }

    fn allocate_oid(&self) -> Oid {
        let mut next = self.next_id.borrow_mut();
        let oid = Self::oid(*next);
        *next = next.wrapping_add(1);
        oid
    }

    /// Check out a branch (`None` detaches HEAD)
    pub fn with_branch(mut self, branch: Option<&str>) -> Self {
        self.branch = branch.map(String::from);
        self
    }

    /// Add a tag pointing at the current HEAD
    pub fn with_tag(self, name: impl Into<String>) -> Self {
        let head = self.head.borrow().unwrap_or_else(Oid::zero);
        self.tags.borrow_mut().insert(name.into(), head);
        self
    }

    /// Number of commits reported after any tag
    pub fn with_commits_since_tag(mut self, count: usize) -> Self {
        self.commits_since_tag = count;
        self
    }

    /// Working-tree changes reported by `changed_files`
    pub fn with_changes(self, changes: Vec<FileChange>) -> Self {
        *self.changes.borrow_mut() = changes;
        self
    }

    /// Replace the configured remotes
    pub fn with_remotes(mut self, remotes: &[&str]) -> Self {
        self.remotes = remotes.iter().map(|r| r.to_string()).collect();
        sort_remotes(&mut self.remotes);
        self
    }

    /// Make pushes to `remote` fail
    pub fn with_failing_remote(mut self, remote: &str) -> Self {
        self.failing_remotes.push(remote.to_string());
        self
    }

    /// Messages of commits created through the trait
    pub fn commits(&self) -> Vec<String> {
        self.commits.borrow().clone()
    }

    /// Remotes fetched from, in call order
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.borrow().clone()
    }

    /// (remote, refspecs) pairs pushed, in call order
    pub fn pushes(&self) -> Vec<(String, Vec<String>)> {
        self.pushes.borrow().clone()
    }
}

impl Repository for MockRepository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn current_branch(&self) -> Result<String> {
        self.branch
            .clone()
            .ok_or_else(|| ConductorError::repo_state("HEAD is detached"))
    }

    fn head_oid(&self) -> Result<Option<Oid>> {
        Ok(*self.head.borrow())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self.tags.borrow().keys().cloned().collect())
    }

    fn find_tag_target(&self, tag_name: &str) -> Result<Option<Oid>> {
        Ok(self.tags.borrow().get(tag_name).copied())
    }

    fn count_commits_since(&self, since: Option<Oid>) -> Result<usize> {
        Ok(match since {
            Some(_) => self.commits_since_tag,
            None => self.commits_since_tag + 1,
        })
    }

    fn changed_files(&self) -> Result<Vec<FileChange>> {
        Ok(self.changes.borrow().clone())
    }

    fn stage(&self, paths: &[String]) -> Result<()> {
        let mut changes = self.changes.borrow_mut();
        for path in paths {
            if let Some(change) = changes.iter_mut().find(|c| &c.path == path) {
                change.index = if change.is_untracked() { 'A' } else { 'M' };
                change.worktree = ' ';
            }
        }
        self.staged.borrow_mut().extend(paths.iter().cloned());
        Ok(())
    }

    fn staged_paths(&self) -> Result<Vec<String>> {
        Ok(self.staged.borrow().clone())
    }

    fn commit(&self, message: &str) -> Result<Oid> {
        let oid = self.allocate_oid();
        *self.head.borrow_mut() = Some(oid);
        self.commits.borrow_mut().push(message.to_string());
        self.staged.borrow_mut().clear();
        self.changes.borrow_mut().retain(|c| !c.is_staged());
        Ok(oid)
    }

    fn create_annotated_tag(&self, name: &str, _message: &str) -> Result<Oid> {
        let head = self
            .head
            .borrow()
            .ok_or_else(|| ConductorError::repo_state("Cannot tag a repository without commits"))?;
        let mut tags = self.tags.borrow_mut();
        if tags.contains_key(name) {
            return Err(ConductorError::Git(git2::Error::from_str(&format!(
                "tag '{}' already exists",
                name
            ))));
        }
        tags.insert(name.to_string(), head);
        Ok(self.allocate_oid())
    }

    fn list_remotes(&self) -> Result<Vec<String>> {
        Ok(self.remotes.clone())
    }

    fn fetch_from_remote(&self, remote: &str) -> Result<()> {
        if !self.remotes.iter().any(|r| r == remote) {
            return Err(ConductorError::remote(format!("Remote '{}' not found", remote)));
        }
        self.fetches.borrow_mut().push(remote.to_string());
        Ok(())
    }

    fn push(&self, remote: &str, refspecs: &[String]) -> Result<()> {
        if self.failing_remotes.iter().any(|r| r == remote) {
            return Err(ConductorError::remote(format!("Failed to push to '{}'", remote)));
        }
        self.pushes
            .borrow_mut()
            .push((remote.to_string(), refspecs.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_repository_defaults() {
        let repo = MockRepository::new("/work/scm");
        assert_eq!(repo.current_branch().unwrap(), "master");
        assert!(repo.list_tags().unwrap().is_empty());
        assert_eq!(repo.git_dir(), Path::new("/work/scm/.git"));
        assert_eq!(repo.list_remotes().unwrap(), vec!["origin"]);
    }

    #[test]
    fn test_mock_repository_detached() {
        let repo = MockRepository::new("/work").with_branch(None);
        assert!(matches!(
            repo.current_branch().unwrap_err(),
            ConductorError::RepoState(_)
        ));
    }

    #[test]
    fn test_mock_repository_commit_and_tag() {
        let repo = MockRepository::new("/work")
            .with_tag("0.1.0")
            .with_changes(vec![FileChange::new("pyproject.toml", ' ', 'M')]);
        let tagged = repo.find_tag_target("0.1.0").unwrap();

        repo.stage(&["pyproject.toml".to_string()]).unwrap();
        let commit = repo.commit("Release 0.2.0").unwrap();
        assert_ne!(Some(commit), tagged);
        assert!(repo.changed_files().unwrap().is_empty());

        repo.create_annotated_tag("0.2.0", "Release 0.2.0").unwrap();
        assert_eq!(repo.find_tag_target("0.2.0").unwrap(), Some(commit));
        assert!(repo.create_annotated_tag("0.2.0", "again").is_err());
        assert_eq!(repo.commits(), vec!["Release 0.2.0"]);
    }

    #[test]
    fn test_mock_repository_records_pushes() {
        let repo = MockRepository::new("/work").with_remotes(&["upstream", "origin"]);
        repo.push("upstream", &["refs/tags/1.0.0:refs/tags/1.0.0".to_string()])
            .unwrap();
        assert_eq!(repo.list_remotes().unwrap(), vec!["origin", "upstream"]);
        assert_eq!(repo.pushes()[0].0, "upstream");
    }

    #[test]
    fn test_mock_repository_failing_remote() {
        let repo = MockRepository::new("/work").with_failing_remote("origin");
        assert!(repo.push("origin", &[]).is_err());
        assert!(repo.fetch_from_remote("nowhere").is_err());
    }
}
