use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Commit, ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Status, StatusOptions};
use git2::Repository as Git2Repo;
use tracing::debug;

use crate::error::{ConductorError, Result};
use crate::git::{sort_remotes, FileChange};

/// Wrapper around git2::Repository with our trait interface
pub struct Git2Repository {
    repo: Git2Repo,
    workdir: PathBuf,
}

impl Git2Repository {
    /// Open the working copy rooted at `path`.
    ///
    /// Unlike discovery, parent directories are not searched: a configured
    /// repository path must be the root of its working tree.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let repo = Git2Repo::open(path).map_err(|e| {
            ConductorError::repo_state(format!(
                "Cannot open repository at {}: {}",
                path.display(),
                e.message()
            ))
        })?;
        Self::from_git2(repo)
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Git2Repo) -> Result<Self> {
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConductorError::repo_state("Repository has no working tree"))?;
        Ok(Git2Repository { repo, workdir })
    }

    /// Clone `url` into `into` with `branch` checked out
    pub fn clone_from(url: &str, into: &Path, branch: &str) -> Result<Self> {
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks());

        let repo = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fetch_options)
            .clone(url, into)
            .map_err(|e| {
                ConductorError::remote(format!("Failed to clone '{}': {}", url, e.message()))
            })?;
        debug!(url, path = %into.display(), branch, "cloned repository");
        Self::from_git2(repo)
    }

    /// Check out `revision` (a tag, branch or commit) with a detached HEAD.
    ///
    /// Local modifications are overwritten.
    pub fn checkout_detached(&self, revision: &str) -> Result<()> {
        let commit = self
            .repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map_err(|e| {
                ConductorError::repo_state(format!(
                    "Cannot resolve '{}' in {}: {}",
                    revision,
                    self.workdir.display(),
                    e.message()
                ))
            })?;

        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head_detached(commit.id())?;
        debug!(revision, commit = %commit.id(), "checked out detached HEAD");
        Ok(())
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Credential callbacks shared by fetch, push and clone.
///
/// Supports SSH authentication via SSH keys from ~/.ssh/, the SSH agent,
/// or the default credential helper.
fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        let username = username_from_url.unwrap_or("git");

        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            if let Some(home) = dirs::home_dir() {
                for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let path = home.join(".ssh").join(key);
                    if path.exists() {
                        if let Ok(cred) = git2::Cred::ssh_key(username, None, &path, None) {
                            return Ok(cred);
                        }
                    }
                }
            }

            if let Ok(cred) = git2::Cred::ssh_key_from_agent(username) {
                return Ok(cred);
            }
        }

        git2::Cred::default()
    });
    callbacks
}

fn index_status(status: Status) -> char {
    if status.contains(Status::INDEX_NEW) {
        'A'
    } else if status.contains(Status::INDEX_MODIFIED) {
        'M'
    } else if status.contains(Status::INDEX_DELETED) {
        'D'
    } else if status.contains(Status::INDEX_RENAMED) {
        'R'
    } else if status.contains(Status::INDEX_TYPECHANGE) {
        'T'
    } else {
        ' '
    }
}

fn worktree_status(status: Status) -> char {
    if status.contains(Status::WT_MODIFIED) {
        'M'
    } else if status.contains(Status::WT_DELETED) {
        'D'
    } else if status.contains(Status::WT_RENAMED) {
        'R'
    } else if status.contains(Status::WT_TYPECHANGE) {
        'T'
    } else {
        ' '
    }
}

impl super::Repository for Git2Repository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    fn current_branch(&self) -> Result<String> {
        if self.repo.head_detached()? {
            return Err(ConductorError::repo_state(format!(
                "HEAD is detached in {}",
                self.workdir.display()
            )));
        }

        let head = self.repo.find_reference("HEAD")?;
        let target = head.symbolic_target().ok_or_else(|| {
            ConductorError::repo_state(format!("HEAD is detached in {}", self.workdir.display()))
        })?;

        Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_string())
    }

    fn head_oid(&self) -> Result<Option<Oid>> {
        Ok(self.head_commit()?.map(|commit| commit.id()))
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let tags = self.repo.tag_names(None)?;

        Ok(tags.iter().flatten().map(|s| s.to_string()).collect())
    }

    fn find_tag_target(&self, tag_name: &str) -> Result<Option<Oid>> {
        let reference_name = format!("refs/tags/{}", tag_name);

        match self.repo.find_reference(&reference_name) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn count_commits_since(&self, since: Option<Oid>) -> Result<usize> {
        if self.head_commit()?.is_none() {
            return Ok(0);
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        if let Some(oid) = since {
            revwalk.hide(oid)?;
        }

        let mut count = 0;
        for oid in revwalk {
            oid?;
            count += 1;
        }
        Ok(count)
    }

    fn changed_files(&self) -> Result<Vec<FileChange>> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut options))?;
        let mut changes: Vec<FileChange> = statuses
            .iter()
            .filter_map(|entry| {
                let status = entry.status();
                let path = entry.path()?.to_string();
                if status.contains(Status::WT_NEW) && index_status(status) == ' ' {
                    return Some(FileChange::new(path, '?', '?'));
                }
                let change = FileChange::new(path, index_status(status), worktree_status(status));
                (change.index != ' ' || change.worktree != ' ').then_some(change)
            })
            .collect();

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn stage(&self, paths: &[String]) -> Result<()> {
        let mut index = self.repo.index()?;
        for path in paths {
            if self.workdir.join(path).exists() {
                index.add_path(Path::new(path))?;
            } else {
                index.remove_path(Path::new(path))?;
            }
        }
        index.write()?;
        debug!(files = paths.len(), "staged files");
        Ok(())
    }

    fn staged_paths(&self) -> Result<Vec<String>> {
        let tree = match self.head_commit()? {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };
        let diff = self.repo.diff_tree_to_index(tree.as_ref(), None, None)?;

        Ok(diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn commit(&self, message: &str) -> Result<Oid> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.repo.signature()?;

        let parent = self.head_commit()?;
        let parents: Vec<&Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        debug!(commit = %oid, "created commit");
        Ok(oid)
    }

    fn create_annotated_tag(&self, name: &str, message: &str) -> Result<Oid> {
        let head = self
            .head_commit()?
            .ok_or_else(|| ConductorError::repo_state("Cannot tag a repository without commits"))?;
        let signature = self.repo.signature()?;

        let oid = self
            .repo
            .tag(name, head.as_object(), &signature, message, false)?;
        debug!(tag = name, commit = %head.id(), "created annotated tag");
        Ok(oid)
    }

    fn list_remotes(&self) -> Result<Vec<String>> {
        let remote_names = self.repo.remotes()?;
        let mut remotes: Vec<String> = remote_names.iter().flatten().map(String::from).collect();

        sort_remotes(&mut remotes);
        Ok(remotes)
    }

    fn fetch_from_remote(&self, remote_name: &str) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .map_err(|_| ConductorError::remote(format!("Remote '{}' not found", remote_name)))?;

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks());

        let refspec_heads = format!("+refs/heads/*:refs/remotes/{}/*", remote_name);
        let refspecs = [refspec_heads.as_str(), "+refs/tags/*:refs/tags/*"];
        remote
            .fetch(&refspecs, Some(&mut fetch_options), None)
            .map_err(|e| {
                ConductorError::remote(format!(
                    "Failed to fetch from remote '{}': {}",
                    remote_name,
                    e.message()
                ))
            })?;

        debug!(remote = remote_name, "fetched");
        Ok(())
    }

    fn push(&self, remote_name: &str, refspecs: &[String]) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .map_err(|_| ConductorError::remote(format!("No remote named '{}' found", remote_name)))?;

        let mut callbacks = remote_callbacks();
        callbacks.push_update_reference(|refname, status| match status {
            Some(status) => Err(git2::Error::from_str(&format!(
                "Push rejected for {}: {}",
                refname, status
            ))),
            None => Ok(()),
        });

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(callbacks);

        let refspec_strs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
        remote
            .push(&refspec_strs, Some(&mut push_options))
            .map_err(|e| match e.class() {
                git2::ErrorClass::Net => {
                    ConductorError::remote(format!("Network error during push: {}", e.message()))
                }
                git2::ErrorClass::Reference => {
                    ConductorError::remote(format!("Reference error during push: {}", e.message()))
                }
                _ => ConductorError::remote(format!(
                    "Failed to push to '{}': {}",
                    remote_name,
                    e.message()
                )),
            })?;

        debug!(remote = remote_name, refs = ?refspecs, "pushed");
        Ok(())
    }
}
