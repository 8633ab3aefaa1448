//! External editor integration for commit messages.
//!
//! The editor is looked up once: an explicit command (the `EDITOR` value
//! the binary read at startup), then git's `core.editor`, then common
//! editors found on `PATH`.
//!
//! While the editor runs, Ctrl-C belongs to it: the handler installed by
//! [`install_interrupt_handler`] leaves the process alive, and an editor
//! killed by the interrupt counts as an aborted edit.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{ConductorError, Result};
use crate::git::FileChange;

/// Name of the message file inside the `.git` directory
pub const COMMIT_MSG_FILE: &str = "COMMIT_EDITMSG";

/// Exit status after Ctrl-C outside an editing session
pub const EXIT_SIGINT: i32 = 130;

/// How long an interrupt aimed at a failed editor may still be in flight
const INTERRUPT_GRACE: Duration = Duration::from_millis(100);

static EDITING: AtomicBool = AtomicBool::new(false);

/// Install the process-wide Ctrl-C handler.
///
/// Outside an editing session the process exits with [`EXIT_SIGINT`].
pub fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        if EDITING.load(Ordering::SeqCst) {
            debug!("interrupt left to the editor");
            return;
        }
        std::process::exit(EXIT_SIGINT);
    })
    .map_err(|e| ConductorError::editor(format!("Cannot install interrupt handler: {}", e)))
}

/// Marks an editing session for the interrupt handler
struct EditingGuard;

impl EditingGuard {
    fn enter() -> Self {
        EDITING.store(true, Ordering::SeqCst);
        EditingGuard
    }
}

impl Drop for EditingGuard {
    fn drop(&mut self) {
        EDITING.store(false, Ordering::SeqCst);
    }
}

const COMMIT_HEADER: &str = "\
# Please enter the commit message for your changes. Lines starting
# with '#' will be ignored, and an empty message aborts the commit.
#";

/// A resolved editor command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    program: PathBuf,
    args: Vec<String>,
}

/// Result of one editing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The editor exited successfully; raw file content, comments included
    Edited(String),
    /// The editor failed or was interrupted
    Aborted,
}

impl Editor {
    /// Parse an editor command such as `code --wait`
    pub fn from_command(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace();
        let program = words.next()?;
        Some(Editor {
            program: PathBuf::from(program),
            args: words.map(String::from).collect(),
        })
    }

    /// Find the editor to use.
    ///
    /// Order: `explicit`, git `core.editor`, then the first platform
    /// fallback present on `PATH`.
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        if let Some(editor) = explicit.and_then(Self::from_command) {
            return Ok(editor);
        }

        if let Some(editor) = git2::Config::open_default()
            .and_then(|config| config.get_string("core.editor"))
            .ok()
            .and_then(|command| Self::from_command(&command))
        {
            return Ok(editor);
        }

        let fallbacks: &[&str] = if cfg!(windows) {
            &["notepad"]
        } else {
            &["vim", "vi", "nano"]
        };
        fallbacks
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|program| Editor {
                program,
                args: Vec::new(),
            })
            .ok_or_else(|| {
                ConductorError::editor("No editor found. Set $EDITOR or git's core.editor.")
            })
    }

    /// Open `path` in the editor and wait for it to exit
    pub fn edit_file(&self, path: &Path) -> Result<EditOutcome> {
        debug!(editor = %self.program.display(), file = %path.display(), "launching editor");
        let _editing = EditingGuard::enter();
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .map_err(|e| {
                ConductorError::editor(format!(
                    "Failed to launch '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !status.success() {
            debug!(%status, "editor failed or was interrupted");
            thread::sleep(INTERRUPT_GRACE);
            return Ok(EditOutcome::Aborted);
        }
        Ok(EditOutcome::Edited(fs::read_to_string(path)?))
    }

    /// Write `template` to `COMMIT_EDITMSG` under `git_dir` and edit it
    pub fn edit_commit_message(&self, git_dir: &Path, template: &str) -> Result<EditOutcome> {
        let path = git_dir.join(COMMIT_MSG_FILE);
        fs::write(&path, template)?;
        self.edit_file(&path)
    }
}

/// The initial commit message shown to the operator
pub fn commit_template(tag: &str, workdir: &Path, status: &[FileChange]) -> String {
    let mut template = format!(
        "Release {}\n\n\n{}\n# Repository: {}\n",
        tag,
        COMMIT_HEADER,
        workdir.display()
    );
    for change in status {
        template.push_str("# ");
        template.push_str(&change.to_string());
        template.push('\n');
    }
    template
}

/// Drops comment lines and surrounding blank lines.
///
/// An empty result means the commit was abandoned.
pub fn strip_comments(message: &str) -> String {
    let kept: Vec<&str> = message
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim_end)
        .collect();
    kept.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_splits_arguments() {
        let editor = Editor::from_command("code --wait").unwrap();
        assert_eq!(editor.program, PathBuf::from("code"));
        assert_eq!(editor.args, vec!["--wait"]);
        assert!(Editor::from_command("   ").is_none());
    }

    #[test]
    fn test_explicit_editor_wins() {
        let editor = Editor::resolve(Some("nano -w")).unwrap();
        assert_eq!(editor, Editor::from_command("nano -w").unwrap());
    }

    #[test]
    fn test_commit_template() {
        let status = vec![FileChange::new("pyproject.toml", 'M', ' ')];
        let template = commit_template("0.2.0", Path::new("/work/scm"), &status);
        assert!(template.starts_with("Release 0.2.0\n\n\n# Please enter"));
        assert!(template.contains("# Repository: /work/scm\n"));
        assert!(template.ends_with("# M  pyproject.toml\n"));
    }

    #[test]
    fn test_strip_comments() {
        let template = commit_template("0.2.0", Path::new("/work"), &[]);
        assert_eq!(strip_comments(&template), "Release 0.2.0");
        assert_eq!(strip_comments("# only\n#comments\n\n"), "");
        assert_eq!(
            strip_comments("Release 1.0.0\n\nBody  \n# note\n"),
            "Release 1.0.0\n\nBody"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_edit_outcome_follows_exit_status() {
        let dir = tempfile::TempDir::new().unwrap();

        let ok = Editor::from_command("true").unwrap();
        let outcome = ok.edit_commit_message(dir.path(), "Release 0.1.0\n").unwrap();
        assert_eq!(outcome, EditOutcome::Edited("Release 0.1.0\n".to_string()));

        let failing = Editor::from_command("false").unwrap();
        let outcome = failing.edit_commit_message(dir.path(), "x").unwrap();
        assert_eq!(outcome, EditOutcome::Aborted);
    }

    #[cfg(unix)]
    #[test]
    fn test_editor_killed_by_signal_is_aborted() {
        let dir = tempfile::TempDir::new().unwrap();
        let editor = Editor {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "kill -INT $$".to_string()],
        };
        let outcome = editor.edit_commit_message(dir.path(), "Release 0.1.0\n").unwrap();
        assert_eq!(outcome, EditOutcome::Aborted);
    }

    #[test]
    fn test_missing_editor_binary_is_editor_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let editor = Editor::from_command("conductor-no-such-editor-binary").unwrap();
        let err = editor.edit_commit_message(dir.path(), "x").unwrap_err();
        assert!(matches!(err, ConductorError::Editor(_)));
    }
}
