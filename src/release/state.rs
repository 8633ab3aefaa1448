use std::fmt;

use tracing::trace;

use crate::error::{ConductorError, Result};

/// Where one repository is in its release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseState {
    Pending,
    Staged,
    AwaitingMessage,
    Committed,
    Tagged,
    Done,
    Skipped,
    Cancelled,
}

impl ReleaseState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReleaseState::Done | ReleaseState::Skipped | ReleaseState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Besides the linear path, a repository whose HEAD already carries
    /// unreleased commits may go straight to `Tagged` when there is nothing
    /// left to commit.
    pub fn can_transition_to(self, next: ReleaseState) -> bool {
        use ReleaseState::*;
        matches!(
            (self, next),
            (Pending, Staged | Tagged | Skipped)
                | (Staged, AwaitingMessage | Tagged | Skipped)
                | (AwaitingMessage, Committed | Cancelled)
                | (Committed, Tagged)
                | (Tagged, Done)
        )
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseState::Pending => "PENDING",
            ReleaseState::Staged => "STAGED",
            ReleaseState::AwaitingMessage => "AWAITING_MESSAGE",
            ReleaseState::Committed => "COMMITTED",
            ReleaseState::Tagged => "TAGGED",
            ReleaseState::Done => "DONE",
            ReleaseState::Skipped => "SKIPPED",
            ReleaseState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one repository and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct StateMachine {
    package: String,
    history: Vec<ReleaseState>,
}

impl StateMachine {
    pub fn new(package: impl Into<String>) -> Self {
        StateMachine {
            package: package.into(),
            history: vec![ReleaseState::Pending],
        }
    }

    pub fn state(&self) -> ReleaseState {
        self.history
            .last()
            .copied()
            .unwrap_or(ReleaseState::Pending)
    }

    /// Every state visited so far, starting with `Pending`
    pub fn history(&self) -> &[ReleaseState] {
        &self.history
    }

    pub fn transition(&mut self, next: ReleaseState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(ConductorError::repo_state(format!(
                "{}: illegal release transition {} -> {}",
                self.package, current, next
            )));
        }
        trace!(package = %self.package, from = %current, to = %next, "release transition");
        self.history.push(next);
        Ok(())
    }
}
