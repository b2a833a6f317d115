//! The predicate contract: named, ordered, side-effect-free checks.

use serde::{Deserialize, Serialize};

use crate::error::PredicateError;
use crate::event::{Event, EventKind};
use crate::state::SessionState;
use crate::verdict::Verdict;

/// What the engine does with a predicate's internal failure.
///
/// Fail-closed predicates guard safety-critical decisions: their failures
/// become blocks. Fail-open (advisory) predicates log and allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailClosed,
    FailOpen,
}

impl FailurePolicy {
    pub fn is_fail_open(&self) -> bool {
        matches!(self, FailurePolicy::FailOpen)
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailClosed => write!(f, "fail-closed"),
            FailurePolicy::FailOpen => write!(f, "fail-open"),
        }
    }
}

/// A named check evaluated by the gate engine.
///
/// `evaluate` must be side-effect-free and bounded: no network, no LLM
/// calls, no filesystem writes. Judgment that needs semantics is requested
/// via a [`Verdict::Delegate`], never performed in-line. Predicates read
/// session state as an input and never mutate it; all writes happen in the
/// engine.
///
/// Returning `Ok(None)` means the predicate has no opinion on this event.
/// Most predicates abstain most of the time; the engine treats a chain of
/// abstentions as an allow.
pub trait Predicate: Send + Sync {
    /// Unique name, used for registration, logs, and failure reasons.
    fn name(&self) -> &str;

    /// Event kinds this predicate applies to.
    fn events(&self) -> &[EventKind];

    /// Failure policy. Explicit, never inferred; defaults to fail-closed.
    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed
    }

    /// Bypass predicates short-circuit the whole chain on `Allow`: when one
    /// allows, no further predicate runs for the event. Used for exemptions
    /// (subagent sessions), not ordinary checks.
    fn bypass(&self) -> bool {
        false
    }

    fn evaluate(&self, event: &Event, state: &SessionState)
        -> Result<Option<Verdict>, PredicateError>;
}
