//! Subagent session exemption.

use crate::error::PredicateError;
use crate::event::{Event, EventKind};
use crate::predicate::{FailurePolicy, Predicate};
use crate::state::SessionState;
use crate::verdict::Verdict;

/// Allows everything in subagent sessions, short-circuiting the chain.
///
/// Subagents are themselves part of the gate (hydrator, custodiet); gating
/// their tool use would recurse. Registered first so the exemption applies
/// before any other check.
pub struct SubagentBypass;

impl Predicate for SubagentBypass {
    fn name(&self) -> &str {
        "subagent_bypass"
    }

    fn events(&self) -> &[EventKind] {
        EventKind::all()
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn bypass(&self) -> bool {
        true
    }

    fn evaluate(
        &self,
        event: &Event,
        _state: &SessionState,
    ) -> Result<Option<Verdict>, PredicateError> {
        match event.agent_type.as_deref() {
            Some(agent) if !agent.is_empty() => {
                tracing::debug!(agent, "subagent session, gating bypassed");
                Ok(Some(Verdict::Allow))
            }
            _ => Ok(None),
        }
    }
}
