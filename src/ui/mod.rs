//! User interface module - interaction (prompts) and formatting.
//!
//! Separates concerns:
//! - `formatter` - Pure formatting functions
//! - `scripted` - Canned answers for tests and non-interactive runs
//! - This module - The [CommitUI] capability and its terminal implementation

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::editor::{commit_template, EditOutcome, Editor};
use crate::error::{ConductorError, Result};
use crate::git::FileChange;

pub mod formatter;
pub mod scripted;

pub use formatter::{
    display_boundary_warning, display_error, display_file_changes, display_plan,
    display_publish_instruction, display_release_summary, display_status, display_success,
};
pub use scripted::ScriptedUI;

/// Everything the operator needs to write a release commit message
#[derive(Debug, Clone, Copy)]
pub struct MessageRequest<'a> {
    pub package: &'a str,
    pub tag: &'a str,
    pub workdir: &'a Path,
    pub git_dir: &'a Path,
    pub status: &'a [FileChange],
}

impl MessageRequest<'_> {
    /// The editor template for this request
    pub fn template(&self) -> String {
        commit_template(self.tag, self.workdir, self.status)
    }
}

/// Operator interaction during release and publish.
pub trait CommitUI {
    /// Choose which changed files to stage, as indices into `changes`.
    ///
    /// An empty selection stages nothing.
    fn select_files(
        &mut self,
        package: &str,
        workdir: &Path,
        changes: &[FileChange],
    ) -> Result<Vec<usize>>;

    /// Let the operator write the commit message.
    ///
    /// Returns the raw text; comment stripping is up to the caller.
    fn edit_message(&mut self, request: &MessageRequest<'_>) -> Result<EditOutcome>;

    /// Choose a remote among several (listed `origin` first)
    fn select_remote(&mut self, package: &str, remotes: &[String]) -> Result<String>;
}

/// Parses a comma/space separated list of indices below `count`.
///
/// # Examples
///
/// ```
/// # use conductor::ui::parse_selection;
/// assert_eq!(parse_selection("0, 2 3", 4).unwrap(), vec![0, 2, 3]);
/// assert!(parse_selection("7", 4).is_err());
/// ```
pub fn parse_selection(input: &str, count: usize) -> std::result::Result<Vec<usize>, String> {
    let mut selected = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let index: usize = token
            .parse()
            .map_err(|_| format!("'{}' is not a number", token))?;
        if index >= count {
            return Err(format!("{} is out of range (0-{})", index, count.saturating_sub(1)));
        }
        if !selected.contains(&index) {
            selected.push(index);
        }
    }
    Ok(selected)
}

/// Interactive implementation reading from stdin and launching the editor
pub struct TerminalUI {
    editor_command: Option<String>,
    editor: Option<Editor>,
}

impl TerminalUI {
    /// `editor_command` is the `EDITOR` value read at startup, if any
    pub fn new(editor_command: Option<String>) -> Self {
        TerminalUI {
            editor_command,
            editor: None,
        }
    }

    fn editor(&mut self) -> Result<&Editor> {
        if self.editor.is_none() {
            self.editor = Some(Editor::resolve(self.editor_command.as_deref())?);
        }
        self.editor
            .as_ref()
            .ok_or_else(|| ConductorError::editor("No editor available"))
    }

    /// Print `prompt` and read one line; `None` at end of input
    fn read_line(prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }
}

impl CommitUI for TerminalUI {
    fn select_files(
        &mut self,
        package: &str,
        workdir: &Path,
        changes: &[FileChange],
    ) -> Result<Vec<usize>> {
        formatter::display_file_changes(package, workdir, changes);

        loop {
            let Some(input) =
                Self::read_line("\nSelect the files to add (comma/space separated list): ")?
            else {
                return Ok(Vec::new());
            };
            match parse_selection(&input, changes.len()) {
                Ok(selected) => return Ok(selected),
                Err(e) => formatter::display_error(&e),
            }
        }
    }

    fn edit_message(&mut self, request: &MessageRequest<'_>) -> Result<EditOutcome> {
        let template = request.template();
        let git_dir = request.git_dir.to_path_buf();
        self.editor()?.edit_commit_message(&git_dir, &template)
    }

    /// If only one remote exists, returns it directly without prompting.
    /// Default selection is the first remote if the user presses Enter.
    fn select_remote(&mut self, package: &str, remotes: &[String]) -> Result<String> {
        match remotes {
            [] => return Err(ConductorError::remote(format!("{} has no remotes", package))),
            [only] => return Ok(only.clone()),
            _ => {}
        }

        println!("\n{} {}:", console::style("Available remotes for").bold(), package);
        for (i, remote) in remotes.iter().enumerate() {
            println!("  {}. {}", i + 1, remote);
        }

        let prompt = format!("\nSelect a remote to push to (1-{}) [default: 1]: ", remotes.len());
        let selection = Self::read_line(&prompt)?.unwrap_or_default();

        let index = if selection.is_empty() {
            1
        } else {
            selection.parse::<usize>().unwrap_or(0)
        };

        if index > 0 && index <= remotes.len() {
            Ok(remotes[index - 1].clone())
        } else {
            Err(ConductorError::remote(format!(
                "Invalid remote selection '{}'",
                selection
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection_separators() {
        assert_eq!(parse_selection("1,2", 3).unwrap(), vec![1, 2]);
        assert_eq!(parse_selection("2 0", 3).unwrap(), vec![2, 0]);
        assert_eq!(parse_selection(" 0 ,, 1 ", 3).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_parse_selection_empty_selects_nothing() {
        assert!(parse_selection("", 3).unwrap().is_empty());
    }

    #[test]
    fn test_parse_selection_deduplicates() {
        assert_eq!(parse_selection("1 1,1", 2).unwrap(), vec![1]);
    }

    #[test]
    fn test_parse_selection_rejects_invalid() {
        assert!(parse_selection("x", 3).is_err());
        assert!(parse_selection("3", 3).is_err());
        assert!(parse_selection("-1", 3).is_err());
    }

    #[test]
    fn test_single_remote_needs_no_prompt() {
        let mut ui = TerminalUI::new(None);
        let remote = ui
            .select_remote("sa-foo", &["origin".to_string()])
            .unwrap();
        assert_eq!(remote, "origin");
        assert!(ui.select_remote("sa-foo", &[]).is_err());
    }

    #[test]
    fn test_message_request_template() {
        let request = MessageRequest {
            package: "sa-foo",
            tag: "0.4.0",
            workdir: Path::new("/work/scm"),
            git_dir: Path::new("/work/scm/.git"),
            status: &[],
        };
        assert!(request.template().starts_with("Release 0.4.0\n"));
    }
}
