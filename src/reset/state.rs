//! States of a single reset run.
use std::fmt;

/// Position of the orchestrator in its strictly sequential state machine.
///
/// `Failed` is terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetState {
    /// Privileges and inputs not yet checked.
    Init,
    /// Terminating running application instances.
    Guarding,
    /// Installed version read and strategy chosen.
    StrategySelected,
    /// Every artifact about to change has been snapshotted.
    BackedUp,
    /// Every mutation has been applied.
    Mutated,
    /// Every mutation has been read back.
    Verified,
    /// Run completed successfully.
    Done,
    /// Run aborted; remaining steps were not attempted.
    Failed,
}

impl ResetState {
    /// The state that follows on success, `None` for terminal states.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Guarding),
            Self::Guarding => Some(Self::StrategySelected),
            Self::StrategySelected => Some(Self::BackedUp),
            Self::BackedUp => Some(Self::Mutated),
            Self::Mutated => Some(Self::Verified),
            Self::Verified => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Step name used in logs and the run summary.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "initialize",
            Self::Guarding => "terminate running instances",
            Self::StrategySelected => "select strategy",
            Self::BackedUp => "back up artifacts",
            Self::Mutated => "apply identity changes",
            Self::Verified => "verify identity changes",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ResetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "Init",
            Self::Guarding => "Guarding",
            Self::StrategySelected => "StrategySelected",
            Self::BackedUp => "BackedUp",
            Self::Mutated => "Mutated",
            Self::Verified => "Verified",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_strictly_sequential() {
        let mut state = ResetState::Init;
        let mut walked = vec![state];
        while let Some(next) = state.next() {
            walked.push(next);
            state = next;
        }
        assert_eq!(
            walked,
            vec![
                ResetState::Init,
                ResetState::Guarding,
                ResetState::StrategySelected,
                ResetState::BackedUp,
                ResetState::Mutated,
                ResetState::Verified,
                ResetState::Done,
            ]
        );
    }

    #[test]
    fn terminal_states() {
        assert!(ResetState::Done.is_terminal());
        assert!(ResetState::Failed.is_terminal());
        assert!(ResetState::Failed.next().is_none());
        assert!(!ResetState::Mutated.is_terminal());
    }
}
