use std::collections::VecDeque;
use std::path::Path;

use crate::editor::EditOutcome;
use crate::error::{ConductorError, Result};
use crate::git::FileChange;
use crate::ui::{CommitUI, MessageRequest};

/// How a scripted file selection picks files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChoice {
    /// Every listed change
    All,
    /// Nothing
    None,
    /// Changes with these paths (unknown paths are ignored)
    Paths(Vec<String>),
}

/// A [CommitUI] that answers from queues instead of a terminal.
///
/// File selections and messages are consumed one per call, in order. When a
/// queue runs dry the defaults apply: select every file, accept the
/// template unchanged, pick the first remote.
#[derive(Debug, Default)]
pub struct ScriptedUI {
    files: VecDeque<FileChoice>,
    messages: VecDeque<EditOutcome>,
    remotes: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(mut self, choice: FileChoice) -> Self {
        self.files.push_back(choice);
        self
    }

    /// Queue a message as if typed into the editor (comments allowed)
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push_back(EditOutcome::Edited(message.into()));
        self
    }

    /// Queue an editor that exits unsuccessfully
    pub fn with_aborted_editor(mut self) -> Self {
        self.messages.push_back(EditOutcome::Aborted);
        self
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remotes.push_back(remote.into());
        self
    }

    /// Packages the UI was asked about, as `"<kind>:<package>"`, in call order
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl CommitUI for ScriptedUI {
    fn select_files(
        &mut self,
        package: &str,
        _workdir: &Path,
        changes: &[FileChange],
    ) -> Result<Vec<usize>> {
        self.prompts.push(format!("files:{}", package));
        let choice = self.files.pop_front().unwrap_or(FileChoice::All);
        Ok(match choice {
            FileChoice::All => (0..changes.len()).collect(),
            FileChoice::None => Vec::new(),
            FileChoice::Paths(paths) => changes
                .iter()
                .enumerate()
                .filter(|(_, change)| paths.contains(&change.path))
                .map(|(i, _)| i)
                .collect(),
        })
    }

    fn edit_message(&mut self, request: &MessageRequest<'_>) -> Result<EditOutcome> {
        self.prompts.push(format!("message:{}", request.package));
        Ok(self
            .messages
            .pop_front()
            .unwrap_or_else(|| EditOutcome::Edited(request.template())))
    }

    fn select_remote(&mut self, package: &str, remotes: &[String]) -> Result<String> {
        self.prompts.push(format!("remote:{}", package));
        let wanted = self.remotes.pop_front();
        match wanted {
            Some(remote) if remotes.contains(&remote) => Ok(remote),
            Some(remote) => Err(ConductorError::remote(format!(
                "Invalid remote selection '{}'",
                remote
            ))),
            None => remotes
                .first()
                .cloned()
                .ok_or_else(|| ConductorError::remote(format!("{} has no remotes", package))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes() -> Vec<FileChange> {
        vec![
            FileChange::new("pyproject.toml", ' ', 'M'),
            FileChange::new("README.md", ' ', 'M'),
        ]
    }

    #[test]
    fn test_scripted_file_choices_in_order() {
        let mut ui = ScriptedUI::new()
            .with_files(FileChoice::Paths(vec!["README.md".to_string()]))
            .with_files(FileChoice::None);
        let dir = Path::new("/work");

        assert_eq!(ui.select_files("a", dir, &changes()).unwrap(), vec![1]);
        assert!(ui.select_files("b", dir, &changes()).unwrap().is_empty());
        assert_eq!(ui.select_files("c", dir, &changes()).unwrap(), vec![0, 1]);
        assert_eq!(ui.prompts(), ["files:a", "files:b", "files:c"]);
    }

    #[test]
    fn test_scripted_message_defaults_to_template() {
        let mut ui = ScriptedUI::new().with_aborted_editor();
        let request = MessageRequest {
            package: "sa-foo",
            tag: "0.4.0",
            workdir: Path::new("/work"),
            git_dir: Path::new("/work/.git"),
            status: &[],
        };
        assert_eq!(ui.edit_message(&request).unwrap(), EditOutcome::Aborted);
        match ui.edit_message(&request).unwrap() {
            EditOutcome::Edited(text) => assert!(text.starts_with("Release 0.4.0")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_scripted_remote_must_exist() {
        let remotes = vec!["origin".to_string(), "upstream".to_string()];
        let mut ui = ScriptedUI::new().with_remote("upstream").with_remote("fork");
        assert_eq!(ui.select_remote("a", &remotes).unwrap(), "upstream");
        assert!(ui.select_remote("a", &remotes).is_err());
        assert_eq!(ui.select_remote("a", &remotes).unwrap(), "origin");
    }
}
