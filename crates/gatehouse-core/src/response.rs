//! Hook response envelope: the JSON printed to stdout plus the exit code.
//!
//! Shapes by event kind:
//! - permission events (PreToolUse) answer with `permissionDecision`
//!   `allow`/`deny`/`ask` and a reason;
//! - context events (SessionStart, UserPromptSubmit) answer with
//!   `additionalContext`, or a top-level `decision: block` to refuse;
//! - delegations ride along as a `delegate` directive the runtime executes.
//!
//! Exit codes mirror the verdict: 0 allow (including issued delegations),
//! 1 warn, 2 block.

use std::path::PathBuf;

use serde::Serialize;

use crate::engine::EngineOutcome;
use crate::event::EventKind;
use crate::verdict::{DelegateMode, DelegateSpec, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Deny,
    Ask,
}

/// The `hookSpecificOutput` member carrying per-event-kind fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<PermissionDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

/// Instruction for the runtime to run a subagent against a context payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateDirective {
    pub subagent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_path: Option<PathBuf>,
    pub mode: DelegateMode,
    pub timeout_secs: u64,
}

/// The full response envelope. Fields stay off the wire unless set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
    /// Top-level refusal for non-permission events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Operator-visible message, shown alongside the agent's transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate: Option<DelegateDirective>,
    #[serde(skip)]
    pub exit_code: i32,
}

impl HookOutput {
    fn allow(kind: EventKind) -> Self {
        HookOutput {
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: kind.display_name().to_string(),
                permission_decision: permission_event(kind).then_some(PermissionDecision::Allow),
                permission_decision_reason: None,
                additional_context: None,
            }),
            decision: None,
            reason: None,
            system_message: None,
            delegate: None,
            exit_code: 0,
        }
    }

    /// Render the engine's outcome for one event into the wire envelope.
    pub fn render(kind: EventKind, outcome: &EngineOutcome) -> Self {
        let mut output = Self::allow(kind);

        match &outcome.verdict {
            Verdict::Allow => {}
            Verdict::Warn(message) => {
                output.exit_code = 1;
                output.system_message = Some(join_warnings(&outcome.warnings, message));
            }
            Verdict::Block(reason) => {
                output.exit_code = 2;
                if permission_event(kind) {
                    if let Some(specific) = output.hook_specific_output.as_mut() {
                        specific.permission_decision = Some(PermissionDecision::Deny);
                        specific.permission_decision_reason = Some(reason.clone());
                    }
                } else {
                    output.decision = Some("block".to_string());
                    output.reason = Some(reason.clone());
                }
            }
            Verdict::Delegate(spec) => {
                output.delegate = Some(directive(spec, outcome));
                if permission_event(kind) && spec.mode == DelegateMode::Sync {
                    // The action waits on the subagent's judgment
                    if let Some(specific) = output.hook_specific_output.as_mut() {
                        specific.permission_decision = Some(PermissionDecision::Ask);
                        specific.permission_decision_reason =
                            Some(format!("awaiting {} verdict: {}", spec.subagent, spec.reason));
                    }
                }
            }
        }

        if output.system_message.is_none() && !outcome.warnings.is_empty() {
            output.system_message = Some(outcome.warnings.join(" | "));
        }
        output
    }

    /// Attach context text for context-injecting event kinds.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if let Some(specific) = self.hook_specific_output.as_mut() {
            specific.additional_context = Some(context.into());
        }
        self
    }
}

fn permission_event(kind: EventKind) -> bool {
    kind == EventKind::PreToolUse
}

fn directive(spec: &DelegateSpec, outcome: &EngineOutcome) -> DelegateDirective {
    DelegateDirective {
        subagent: spec.subagent.clone(),
        context_path: outcome
            .payload
            .as_ref()
            .and_then(|p| p.temp_path.clone()),
        mode: spec.mode,
        timeout_secs: spec.timeout_secs,
    }
}

fn join_warnings(warnings: &[String], fallback: &str) -> String {
    if warnings.is_empty() {
        fallback.to_string()
    } else {
        warnings.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;
    use crate::verdict::DelegateMode;

    fn outcome(verdict: Verdict) -> EngineOutcome {
        EngineOutcome {
            session_id: "s1".to_string(),
            verdict,
            warnings: Vec::new(),
            payload: None,
            state: SessionState::new("s1"),
        }
    }

    #[test]
    fn block_on_pre_tool_use_denies_with_reason() {
        let output = HookOutput::render(
            EventKind::PreToolUse,
            &outcome(Verdict::Block("destructive command blocked".to_string())),
        );
        assert_eq!(output.exit_code, 2);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json["hookSpecificOutput"]["permissionDecision"],
            serde_json::json!("deny")
        );
        assert_eq!(
            json["hookSpecificOutput"]["permissionDecisionReason"],
            serde_json::json!("destructive command blocked")
        );
        assert_eq!(json["hookSpecificOutput"]["hookEventName"], "PreToolUse");
        assert!(json.get("decision").is_none());
    }

    #[test]
    fn block_on_stop_uses_the_top_level_decision() {
        let output = HookOutput::render(
            EventKind::Stop,
            &outcome(Verdict::Block("unfinished work".to_string())),
        );
        assert_eq!(output.exit_code, 2);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["decision"], "block");
        assert_eq!(json["reason"], "unfinished work");
    }

    #[test]
    fn warn_exits_one_with_a_system_message() {
        let mut o = outcome(Verdict::Warn("careful".to_string()));
        o.warnings.push("careful".to_string());
        let output = HookOutput::render(EventKind::PostToolUse, &o);
        assert_eq!(output.exit_code, 1);
        assert_eq!(output.system_message.as_deref(), Some("careful"));
    }

    #[test]
    fn allow_is_clean_and_exits_zero() {
        let output = HookOutput::render(EventKind::PreToolUse, &outcome(Verdict::Allow));
        assert_eq!(output.exit_code, 0);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json["hookSpecificOutput"]["permissionDecision"],
            serde_json::json!("allow")
        );
        assert!(json.get("systemMessage").is_none());
    }

    #[test]
    fn sync_delegate_on_pre_tool_use_asks_and_carries_the_directive() {
        let spec = DelegateSpec {
            subagent: "hydrator".to_string(),
            reason: "prompt hydration pending".to_string(),
            mode: DelegateMode::Sync,
            timeout_secs: 120,
        };
        let output = HookOutput::render(EventKind::PreToolUse, &outcome(Verdict::Delegate(spec)));
        assert_eq!(output.exit_code, 0);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json["hookSpecificOutput"]["permissionDecision"],
            serde_json::json!("ask")
        );
        assert_eq!(json["delegate"]["subagent"], "hydrator");
        assert_eq!(json["delegate"]["mode"], "sync");
        assert_eq!(json["delegate"]["timeoutSecs"], 120);
    }

    #[test]
    fn async_delegate_allows_and_carries_the_directive() {
        let spec = DelegateSpec {
            subagent: "custodiet".to_string(),
            reason: "7 tool calls since the last audit".to_string(),
            mode: DelegateMode::Async,
            timeout_secs: 120,
        };
        let mut o = outcome(Verdict::Delegate(spec));
        o.payload = Some(crate::context::ContextPayload {
            subagent: "custodiet".to_string(),
            body: String::new(),
            temp_path: Some(PathBuf::from("/tmp/gatehouse/custodiet_x.md")),
        });

        let output = HookOutput::render(EventKind::PostToolUse, &o);
        assert_eq!(output.exit_code, 0);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["delegate"]["mode"], "async");
        assert_eq!(
            json["delegate"]["contextPath"],
            serde_json::json!("/tmp/gatehouse/custodiet_x.md")
        );
    }

    #[test]
    fn additional_context_rides_the_specific_output() {
        let output = HookOutput::render(EventKind::SessionStart, &outcome(Verdict::Allow))
            .with_context("project uses workspace lints");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json["hookSpecificOutput"]["additionalContext"],
            serde_json::json!("project uses workspace lints")
        );
        // Context events carry no permission decision
        assert!(json["hookSpecificOutput"].get("permissionDecision").is_none());
    }
}
