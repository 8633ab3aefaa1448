// Shared fixtures: a workspace of small git repositories on disk.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo_path(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Write `conductor.toml` at the workspace root and return its path
    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.path().join("conductor.toml");
        fs::write(&path, content).unwrap();
        path
    }

    /// A repository on `master` with one commit holding a `pyproject.toml`
    pub fn add_package(&self, name: &str, version: &str, dependencies: &[&str]) -> Repository {
        let path = self.repo_path(name);
        fs::create_dir_all(&path).unwrap();
        let repo = init_repo(&path);
        write_file(&path, "pyproject.toml", &pyproject(name, version, dependencies));
        write_file(&path, "README.md", &format!("# {}\n", name));
        commit_all(&repo, "Initial commit");
        repo
    }
}

pub fn pyproject(name: &str, version: &str, dependencies: &[&str]) -> String {
    let deps: Vec<String> = dependencies.iter().map(|d| format!("    \"{}\",", d)).collect();
    format!(
        "[project]\nname = \"{}\"\nversion = \"{}\"\ndependencies = [\n{}\n]\n",
        name,
        version,
        deps.join("\n")
    )
}

pub fn init_repo(path: &Path) -> Repository {
    let mut options = RepositoryInitOptions::new();
    options.initial_head("master");
    let repo = Repository::init_opts(path, &options).unwrap();
    {
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Release Bot").unwrap();
        config.set_str("user.email", "release@example.com").unwrap();
    }
    repo
}

pub fn write_file(repo_dir: &Path, relative: &str, content: &str) {
    let path = repo_dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("Release Bot", "release@example.com").unwrap();
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

pub fn tag_head(repo: &Repository, name: &str) {
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    let signature = Signature::now("Release Bot", "release@example.com").unwrap();
    repo.tag(name, head.as_object(), &signature, &format!("Release {}", name), false)
        .unwrap();
}

pub fn head_message(repo: &Repository) -> String {
    repo.head()
        .unwrap()
        .peel_to_commit()
        .unwrap()
        .message()
        .unwrap_or_default()
        .to_string()
}

pub fn tag_points_at_head(repo: &Repository, name: &str) -> bool {
    let head = repo.head().unwrap().peel_to_commit().unwrap().id();
    repo.find_reference(&format!("refs/tags/{}", name))
        .and_then(|r| r.peel_to_commit())
        .map(|commit| commit.id() == head)
        .unwrap_or(false)
}
