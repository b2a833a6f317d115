//! Prompt-hydration gate.

use crate::builtin::subagents;
use crate::config::GateMode;
use crate::error::PredicateError;
use crate::event::{Event, EventKind};
use crate::predicate::{FailurePolicy, Predicate};
use crate::state::SessionState;
use crate::verdict::{DelegateMode, DelegateSpec, Verdict};

/// Holds the first prompt of a session until the hydrator subagent has
/// enriched it with project context.
///
/// Prompts starting with `.` or `/` skip the gate: the dot is the explicit
/// user escape hatch, the slash is a command rather than a prompt. In warn
/// mode the gate only flags the missing hydration instead of delegating.
pub struct HydrationGate {
    mode: GateMode,
    timeout_secs: u64,
}

impl HydrationGate {
    pub fn new(mode: GateMode, timeout_secs: u64) -> Self {
        HydrationGate { mode, timeout_secs }
    }
}

impl Predicate for HydrationGate {
    fn name(&self) -> &str {
        "hydration_gate"
    }

    fn events(&self) -> &[EventKind] {
        &[EventKind::UserPromptSubmit]
    }

    fn policy(&self) -> FailurePolicy {
        match self.mode {
            GateMode::Block => FailurePolicy::FailClosed,
            GateMode::Warn => FailurePolicy::FailOpen,
        }
    }

    fn evaluate(
        &self,
        event: &Event,
        state: &SessionState,
    ) -> Result<Option<Verdict>, PredicateError> {
        if !state.hydration_pending {
            return Ok(None);
        }
        let Some(prompt) = event.prompt.as_deref() else {
            return Ok(None);
        };
        if prompt.starts_with('.') || prompt.starts_with('/') {
            tracing::debug!("hydration gate skipped by prompt prefix");
            return Ok(None);
        }

        match self.mode {
            GateMode::Block => Ok(Some(Verdict::Delegate(DelegateSpec {
                subagent: subagents::HYDRATOR.to_string(),
                reason: "prompt hydration pending".to_string(),
                mode: DelegateMode::Sync,
                timeout_secs: self.timeout_secs,
            }))),
            GateMode::Warn => Ok(Some(Verdict::Warn(
                "prompt hydration pending; project context may be missing".to_string(),
            ))),
        }
    }
}
