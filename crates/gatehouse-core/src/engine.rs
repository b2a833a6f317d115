//! The gate engine: one event in, one verdict out.
//!
//! Per event the engine runs a fixed sequence: evaluate the applicable
//! predicates in priority order, reduce their verdicts to one, apply the
//! session-state transitions the event and verdict imply. Predicates never
//! write state; every mutation in the pipeline happens here, inside a
//! single serialized [`SessionStore::mutate`] call per event, so two events
//! on the same session can never interleave their effects.

use std::sync::Arc;

use crate::builtin::subagents;
use crate::config::GateConfig;
use crate::context::{ContextBuilder, ContextPayload};
use crate::error::{EngineError, StoreError};
use crate::event::{Event, EventKind};
use crate::registry::PredicateRegistry;
use crate::state::{counters, BlockFlag, PendingDelegate, SessionState, SessionStore};
use crate::tools::tool_category;
use crate::verdict::{parse_subagent_verdict, DelegateSpec, Verdict};

/// The result of gating one event.
#[derive(Debug)]
pub struct EngineOutcome {
    /// Session the event was keyed under (generated on bootstrap starts).
    pub session_id: String,
    /// Final reduced verdict.
    pub verdict: Verdict,
    /// Warn messages accumulated along the way, decisive or not.
    pub warnings: Vec<String>,
    /// Context payload written for a delegate verdict.
    pub payload: Option<ContextPayload>,
    /// Session state after the event's transitions were applied.
    pub state: SessionState,
}

/// Working result of the evaluation phase.
struct Evaluation {
    verdict: Verdict,
    warnings: Vec<String>,
    payload: Option<ContextPayload>,
    bypassed: bool,
    /// Predicate that produced a decisive delegate, for the pending record.
    issued_by: Option<String>,
    issued_fail_open: bool,
}

impl Evaluation {
    fn allow() -> Self {
        Evaluation {
            verdict: Verdict::Allow,
            warnings: Vec::new(),
            payload: None,
            bypassed: false,
            issued_by: None,
            issued_fail_open: false,
        }
    }
}

pub struct GateEngine {
    registry: Arc<PredicateRegistry>,
    store: Arc<dyn SessionStore>,
    context: ContextBuilder,
    config: GateConfig,
}

impl GateEngine {
    pub fn new(
        registry: Arc<PredicateRegistry>,
        store: Arc<dyn SessionStore>,
        context: ContextBuilder,
        config: GateConfig,
    ) -> Self {
        GateEngine {
            registry,
            store,
            context,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Gate one event. Malformed input and session-init faults surface as
    /// [`EngineError`]; everything predicate-related is converted to a
    /// verdict instead.
    pub fn handle(&self, event: Event) -> Result<EngineOutcome, EngineError> {
        let session_id = if event.session_id.is_empty() {
            // Bootstrap SessionStart: the runtime has no id yet
            uuid::Uuid::new_v4().to_string()
        } else {
            event.session_id.clone()
        };
        tracing::debug!(session_id = %session_id, kind = %event.kind, "gate event received");

        match event.kind {
            EventKind::SessionStart => {
                let resuming = event.source.as_deref() == Some("resume");
                match self.store.init(&session_id) {
                    Ok(_) => {}
                    Err(StoreError::DuplicateSession(_)) if resuming => {
                        tracing::info!(session_id = %session_id, "resuming live session");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            EventKind::SubagentStop => {
                // A verdict for a torn-down session is dropped, not revived
                if matches!(self.store.get(&session_id), Err(StoreError::NotFound(_))) {
                    tracing::debug!(
                        session_id = %session_id,
                        subagent = event.subagent.as_deref().unwrap_or("unknown"),
                        "subagent verdict for unknown session dropped"
                    );
                    let state = SessionState::new(&session_id);
                    return Ok(EngineOutcome {
                        session_id,
                        verdict: Verdict::Allow,
                        warnings: Vec::new(),
                        payload: None,
                        state,
                    });
                }
            }
            _ => {}
        }

        let mut evaluation: Option<Evaluation> = None;
        let state = self.store.mutate(&session_id, &mut |state| {
            evaluation = Some(self.process(&event, state));
        })?;
        let Evaluation {
            verdict,
            warnings,
            payload,
            ..
        } = evaluation.unwrap_or_else(Evaluation::allow);

        if event.kind == EventKind::Stop && !matches!(verdict, Verdict::Block(_)) {
            self.store.teardown(&session_id)?;
        }

        tracing::info!(
            session_id = %session_id,
            kind = %event.kind,
            verdict = verdict.label(),
            "gate decision"
        );
        Ok(EngineOutcome {
            session_id,
            verdict,
            warnings,
            payload,
            state,
        })
    }

    /// All three phases for one event, inside the session's mutate lock.
    fn process(&self, event: &Event, state: &mut SessionState) -> Evaluation {
        let mut eval = self.evaluate_predicates(event, state);

        if event.kind == EventKind::SubagentStop && !eval.bypassed {
            self.ingest_subagent_verdict(event, state, &mut eval);
        }

        if let Verdict::Delegate(spec) = eval.verdict.clone() {
            match self.materialize_delegate(&spec, state, event) {
                Ok(contents) => {
                    state.record_pending_delegate(PendingDelegate {
                        subagent: spec.subagent.clone(),
                        predicate: eval.issued_by.clone().unwrap_or_default(),
                        mode: spec.mode,
                        fail_open: eval.issued_fail_open,
                        issued_at: event.timestamp,
                    });
                    if spec.subagent == subagents::CUSTODIET {
                        state.reset_counter(counters::TOOL_CALLS_SINCE_AUDIT);
                    }
                    eval.payload = Some(contents);
                }
                Err(err) => {
                    tracing::warn!(
                        subagent = %spec.subagent,
                        error = %err,
                        "context build failed, delegation dropped"
                    );
                    eval.verdict =
                        Verdict::Block(format!("delegate to {} failed: {err}", spec.subagent));
                }
            }
        }

        self.record_transitions(event, &eval.verdict, state);
        eval
    }

    /// Priority-ordered evaluation with short-circuiting and per-predicate
    /// failure isolation.
    fn evaluate_predicates(&self, event: &Event, state: &SessionState) -> Evaluation {
        let mut eval = Evaluation::allow();
        let mut verdicts: Vec<Verdict> = Vec::new();

        for registration in self.registry.predicates_for(event.kind) {
            let predicate = registration.predicate.as_ref();
            match predicate.evaluate(event, state) {
                Ok(None) => {}
                Ok(Some(Verdict::Allow)) => {
                    if predicate.bypass() {
                        tracing::debug!(
                            predicate = predicate.name(),
                            "bypass allow, chain short-circuited"
                        );
                        eval.bypassed = true;
                        eval.verdict = Verdict::Allow;
                        return eval;
                    }
                }
                Ok(Some(Verdict::Warn(message))) => {
                    eval.warnings.push(message.clone());
                    verdicts.push(Verdict::Warn(message));
                }
                Ok(Some(decisive)) => {
                    tracing::debug!(
                        predicate = predicate.name(),
                        verdict = decisive.label(),
                        "decisive verdict, evaluation stopped"
                    );
                    if matches!(decisive, Verdict::Delegate(_)) {
                        eval.issued_by = Some(predicate.name().to_string());
                        eval.issued_fail_open = predicate.policy().is_fail_open();
                    }
                    verdicts.push(decisive);
                    break;
                }
                Err(err) => {
                    if predicate.policy().is_fail_open() {
                        tracing::warn!(
                            predicate = predicate.name(),
                            error = %err,
                            "advisory predicate failed, treated as allow"
                        );
                    } else {
                        tracing::warn!(
                            predicate = predicate.name(),
                            error = %err,
                            "predicate failed, failing closed"
                        );
                        verdicts.push(Verdict::Block(format!(
                            "predicate failure: {}: {err}",
                            predicate.name()
                        )));
                    }
                }
            }
        }

        eval.verdict = Verdict::reduce_all(verdicts);
        eval
    }

    /// Fold a subagent's reported verdict into the event and apply its
    /// standing effects: blocks raise the session flag, allows resolve the
    /// pending delegate that asked.
    fn ingest_subagent_verdict(
        &self,
        event: &Event,
        state: &mut SessionState,
        eval: &mut Evaluation,
    ) {
        let subagent = event
            .subagent
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let text = event.subagent_response.as_deref().unwrap_or("");
        let verdict = parse_subagent_verdict(text);
        tracing::info!(
            subagent = %subagent,
            verdict = verdict.label(),
            "subagent verdict ingested"
        );

        let resolved = state.resolve_pending_delegate(&subagent);
        if resolved.is_none() {
            tracing::debug!(subagent = %subagent, "verdict without a matching pending delegate");
        }

        match &verdict {
            Verdict::Block(reason) => {
                state.block_flag = Some(BlockFlag {
                    reason: reason.clone(),
                    source: subagent.clone(),
                    set_at: event.timestamp,
                });
            }
            Verdict::Allow => {
                let from_hydrator = subagent == subagents::HYDRATOR
                    || resolved
                        .as_ref()
                        .is_some_and(|p| p.predicate == "hydration_gate");
                if from_hydrator {
                    state.hydration_pending = false;
                }
            }
            Verdict::Warn(message) => eval.warnings.push(message.clone()),
            Verdict::Delegate(_) => {}
        }
        state.push_history(
            event.timestamp,
            format!("{subagent} verdict: {}", verdict.label()),
            self.config.history_limit,
        );

        let prior = std::mem::replace(&mut eval.verdict, Verdict::Allow);
        eval.verdict = verdict.reduce(prior);
    }

    /// Build and persist the context payload a delegate runs against.
    fn materialize_delegate(
        &self,
        spec: &DelegateSpec,
        state: &SessionState,
        event: &Event,
    ) -> Result<ContextPayload, crate::error::ContextError> {
        let mut payload = self.context.build(spec, state, event)?;
        let path = self.context.persist(&mut payload)?;
        tracing::info!(
            subagent = %spec.subagent,
            mode = ?spec.mode,
            path = %path.display(),
            "delegation issued"
        );
        Ok(payload)
    }

    /// Session-state transitions implied by the event itself.
    fn record_transitions(&self, event: &Event, verdict: &Verdict, state: &mut SessionState) {
        state.last_event_at = event.timestamp;
        let cap = self.config.history_limit;

        match event.kind {
            EventKind::SessionStart => {
                let resuming = event.source.as_deref() == Some("resume");
                if !resuming && event.agent_type.is_none() {
                    state.hydration_pending = true;
                }
                let source = event.source.as_deref().unwrap_or("startup");
                state.push_history(event.timestamp, format!("session started ({source})"), cap);
            }
            EventKind::UserPromptSubmit => {
                state.bump_counter(counters::PROMPTS);
                let prompt = event.prompt.as_deref().unwrap_or("");
                state.push_history(
                    event.timestamp,
                    format!("prompt: {}", snippet(prompt, 80)),
                    cap,
                );
            }
            EventKind::PreToolUse => {
                if let Some(tool) = event.tool_name.as_deref() {
                    if tool == "Task" {
                        self.note_task_dispatch(event, state);
                    }
                    if matches!(verdict, Verdict::Block(_)) {
                        state.push_history(event.timestamp, format!("blocked {tool}"), cap);
                    }
                }
            }
            EventKind::PostToolUse => {
                if let Some(tool) = event.tool_name.as_deref() {
                    state.bump_counter(counters::TOOL_CALLS_TOTAL);
                    let audit_dispatched = matches!(
                        verdict,
                        Verdict::Delegate(spec) if spec.subagent == subagents::CUSTODIET
                    );
                    if !tool_category(tool).is_read_only() && !audit_dispatched {
                        state.bump_counter(counters::TOOL_CALLS_SINCE_AUDIT);
                    }
                    if tool == "Task" {
                        self.note_task_dispatch(event, state);
                    }
                    let summary = tool_summary(event);
                    let line = if summary.is_empty() {
                        format!("tool {tool}")
                    } else {
                        format!("tool {tool}: {summary}")
                    };
                    state.push_history(event.timestamp, line, cap);
                }
            }
            EventKind::Stop => {
                state.push_history(event.timestamp, "turn ended", cap);
            }
            // History and flags handled during ingestion
            EventKind::SubagentStop => {}
        }
    }

    /// The runtime can run gate subagents itself via the Task tool; treat
    /// that the same as a resolved delegation.
    fn note_task_dispatch(&self, event: &Event, state: &mut SessionState) {
        let Some(subagent_type) = event.task_subagent_type() else {
            return;
        };
        if subagent_type.contains(subagents::HYDRATOR) {
            state.hydration_pending = false;
        }
        if subagent_type.contains(subagents::CUSTODIET) && event.kind == EventKind::PostToolUse {
            state.reset_counter(counters::TOOL_CALLS_SINCE_AUDIT);
        }
    }
}

fn snippet(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

fn tool_summary(event: &Event) -> String {
    event
        .command()
        .or_else(|| event.file_path())
        .or_else(|| event.task_subagent_type())
        .map(|s| snippet(s, 60))
        .unwrap_or_default()
}
