use std::fmt;

use crate::error::{PipelineError, Result};

/// Lifecycle location of a document. A document lives in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentState {
    Pending,
    Finished,
    Failed,
    Skipped,
}

/// What happened to a pending document during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Token budget exceeded.
    Skip,
    /// Response was not valid JSON.
    Fail,
    /// Result persisted.
    Success,
}

impl DocumentState {
    pub const ALL: [DocumentState; 4] = [
        DocumentState::Pending,
        DocumentState::Finished,
        DocumentState::Failed,
        DocumentState::Skipped,
    ];

    /// Directory name under the data root.
    pub fn dir_name(self) -> &'static str {
        match self {
            DocumentState::Pending => "to_analyze",
            DocumentState::Finished => "finished_sites",
            DocumentState::Failed => "failed_jsons",
            DocumentState::Skipped => "skipped_sites",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != DocumentState::Pending
    }

    /// Routing transition. Only pending documents are routed.
    pub fn after(self, outcome: Outcome) -> Result<DocumentState> {
        let to = match outcome {
            Outcome::Skip => DocumentState::Skipped,
            Outcome::Fail => DocumentState::Failed,
            Outcome::Success => DocumentState::Finished,
        };
        if self.is_terminal() {
            return Err(PipelineError::InvalidTransition { from: self, to });
        }
        Ok(to)
    }

    /// Explicit re-queue. Finished documents already have a result and stay put.
    pub fn requeue(self) -> Result<DocumentState> {
        match self {
            DocumentState::Failed | DocumentState::Skipped => Ok(DocumentState::Pending),
            from => Err(PipelineError::InvalidTransition {
                from,
                to: DocumentState::Pending,
            }),
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentState::Pending => "pending",
            DocumentState::Finished => "finished",
            DocumentState::Failed => "failed",
            DocumentState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Drive identities through transitions without touching the filesystem.
    fn apply(
        ledger: &mut HashMap<&'static str, DocumentState>,
        id: &'static str,
        outcome: Outcome,
    ) -> Result<DocumentState> {
        let current = ledger[id];
        let next = current.after(outcome)?;
        ledger.insert(id, next);
        Ok(next)
    }

    #[test]
    fn pending_routes_to_each_terminal_state() {
        assert_eq!(
            DocumentState::Pending.after(Outcome::Skip).unwrap(),
            DocumentState::Skipped
        );
        assert_eq!(
            DocumentState::Pending.after(Outcome::Fail).unwrap(),
            DocumentState::Failed
        );
        assert_eq!(
            DocumentState::Pending.after(Outcome::Success).unwrap(),
            DocumentState::Finished
        );
    }

    #[test]
    fn terminal_states_are_one_way() {
        for state in DocumentState::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(matches!(
                state.after(Outcome::Success),
                Err(PipelineError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn each_identity_lands_in_exactly_one_state() {
        let mut ledger = HashMap::from([
            ("small", DocumentState::Pending),
            ("huge", DocumentState::Pending),
            ("garbled", DocumentState::Pending),
        ]);
        apply(&mut ledger, "small", Outcome::Success).unwrap();
        apply(&mut ledger, "huge", Outcome::Skip).unwrap();
        apply(&mut ledger, "garbled", Outcome::Fail).unwrap();
        // second routing of the same identity is rejected and leaves the ledger alone
        assert!(apply(&mut ledger, "small", Outcome::Fail).is_err());

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger["small"], DocumentState::Finished);
        assert_eq!(ledger["huge"], DocumentState::Skipped);
        assert_eq!(ledger["garbled"], DocumentState::Failed);
    }

    #[test]
    fn requeue_only_from_failed_or_skipped() {
        assert_eq!(
            DocumentState::Failed.requeue().unwrap(),
            DocumentState::Pending
        );
        assert_eq!(
            DocumentState::Skipped.requeue().unwrap(),
            DocumentState::Pending
        );
        assert!(DocumentState::Finished.requeue().is_err());
        assert!(DocumentState::Pending.requeue().is_err());
    }
}
