//! Periodic session audit.

use crate::builtin::subagents;
use crate::config::GateMode;
use crate::error::PredicateError;
use crate::event::{Event, EventKind};
use crate::predicate::{FailurePolicy, Predicate};
use crate::state::{counters, SessionState};
use crate::tools::tool_category;
use crate::verdict::{DelegateMode, DelegateSpec, Verdict};

/// Dispatches a background custodiet audit every N effective tool calls.
///
/// Read-only tools do not advance the counter; inspecting a codebase is not
/// auditable activity. The counter itself is advanced and reset by the
/// engine; this predicate only reads it, counting the current call as one.
///
/// While an audit is still unresolved and another full interval elapses,
/// the gate escalates instead of stacking delegates: warn mode nags, block
/// mode refuses further tool use until the verdict lands.
pub struct PeriodicAudit {
    mode: GateMode,
    interval: u64,
    timeout_secs: u64,
}

impl PeriodicAudit {
    pub fn new(mode: GateMode, interval: u64, timeout_secs: u64) -> Self {
        PeriodicAudit {
            mode,
            interval: interval.max(1),
            timeout_secs,
        }
    }
}

impl Predicate for PeriodicAudit {
    fn name(&self) -> &str {
        "periodic_audit"
    }

    fn events(&self) -> &[EventKind] {
        &[EventKind::PostToolUse]
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(
        &self,
        event: &Event,
        state: &SessionState,
    ) -> Result<Option<Verdict>, PredicateError> {
        let Some(tool) = event.tool_name.as_deref() else {
            return Ok(None);
        };
        if tool_category(tool).is_read_only() {
            return Ok(None);
        }

        // The engine bumps the counter after evaluation, so count this call.
        let calls = state.counter(counters::TOOL_CALLS_SINCE_AUDIT) + 1;
        if calls < self.interval {
            return Ok(None);
        }

        let audit_pending = state
            .pending_delegates
            .iter()
            .any(|p| p.subagent == subagents::CUSTODIET);
        if audit_pending {
            let message = format!(
                "periodic audit overdue: {calls} tool calls while a custodiet verdict is outstanding"
            );
            return Ok(Some(match self.mode {
                GateMode::Block => Verdict::Block(message),
                GateMode::Warn => Verdict::Warn(message),
            }));
        }

        Ok(Some(Verdict::Delegate(DelegateSpec {
            subagent: subagents::CUSTODIET.to_string(),
            reason: format!("{calls} tool calls since the last audit"),
            mode: DelegateMode::Async,
            timeout_secs: self.timeout_secs,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PendingDelegate;
    use chrono::Utc;
    use serde_json::json;

    fn post_tool(tool: &str) -> Event {
        Event::new(EventKind::PostToolUse, "s1").with_tool(tool, json!({}))
    }

    fn state_with_calls(calls: u64) -> SessionState {
        let mut state = SessionState::new("s1");
        for _ in 0..calls {
            state.bump_counter(counters::TOOL_CALLS_SINCE_AUDIT);
        }
        state
    }

    #[test]
    fn fires_exactly_at_the_interval() {
        let audit = PeriodicAudit::new(GateMode::Warn, 7, 120);
        assert_eq!(
            audit.evaluate(&post_tool("Edit"), &state_with_calls(5)).unwrap(),
            None
        );
        let verdict = audit
            .evaluate(&post_tool("Edit"), &state_with_calls(6))
            .unwrap();
        let Some(Verdict::Delegate(spec)) = verdict else {
            panic!("expected a delegate verdict, got {verdict:?}");
        };
        assert_eq!(spec.subagent, "custodiet");
        assert_eq!(spec.mode, DelegateMode::Async);
    }

    #[test]
    fn read_only_tools_never_trigger() {
        let audit = PeriodicAudit::new(GateMode::Warn, 7, 120);
        assert_eq!(
            audit.evaluate(&post_tool("Read"), &state_with_calls(20)).unwrap(),
            None
        );
    }

    #[test]
    fn outstanding_audit_escalates_instead_of_stacking() {
        let mut state = state_with_calls(6);
        state.record_pending_delegate(PendingDelegate {
            subagent: "custodiet".to_string(),
            predicate: "periodic_audit".to_string(),
            mode: DelegateMode::Async,
            fail_open: true,
            issued_at: Utc::now(),
        });

        let warn = PeriodicAudit::new(GateMode::Warn, 7, 120);
        assert!(matches!(
            warn.evaluate(&post_tool("Edit"), &state).unwrap(),
            Some(Verdict::Warn(_))
        ));

        let block = PeriodicAudit::new(GateMode::Block, 7, 120);
        assert!(matches!(
            block.evaluate(&post_tool("Edit"), &state).unwrap(),
            Some(Verdict::Block(_))
        ));
    }

    #[test]
    fn outstanding_audit_is_quiet_below_the_interval() {
        let mut state = state_with_calls(2);
        state.record_pending_delegate(PendingDelegate {
            subagent: "custodiet".to_string(),
            predicate: "periodic_audit".to_string(),
            mode: DelegateMode::Async,
            fail_open: true,
            issued_at: Utc::now(),
        });
        let audit = PeriodicAudit::new(GateMode::Block, 7, 120);
        assert_eq!(audit.evaluate(&post_tool("Edit"), &state).unwrap(), None);
    }
}
