//! The `hook` subcommand: gate one event end to end.

use std::io::Read;
use std::sync::Arc;

use anyhow::Result;

use gatehouse_core::{
    ContextBuilder, DelegateDirective, DelegateMode, DelegateSpec, EngineOutcome, Event, GateConfig,
    GateEngine, HookOutput, SessionStore, SubagentRunner, Verdict,
};

/// Read one event from stdin, gate it, print the envelope, and return the
/// exit code. Anything that prevents a verdict fails closed with a
/// diagnostic on stderr.
pub async fn run(
    config: &GateConfig,
    store: Arc<dyn SessionStore>,
    run_delegates: bool,
) -> Result<i32> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let json: serde_json::Value = match serde_json::from_str(&input) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("gatehouse: event is not valid JSON: {err}");
            return Ok(2);
        }
    };
    let event = match Event::from_json(json) {
        Ok(event) => event,
        Err(err) => {
            eprintln!("gatehouse: {err}");
            return Ok(2);
        }
    };
    let kind = event.kind;

    let registry = gatehouse_core::standard_registry(config)?;
    let engine = GateEngine::new(
        Arc::new(registry),
        store,
        ContextBuilder::new(config)?,
        config.clone(),
    );

    let mut outcome = match engine.handle(event) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("gatehouse: {err}");
            return Ok(2);
        }
    };

    if run_delegates {
        if let Verdict::Delegate(spec) = outcome.verdict.clone() {
            if spec.mode == DelegateMode::Sync {
                let runner = SubagentRunner::new(config);
                outcome = resolve_sync_delegate(&engine, &runner, outcome, &spec).await?;
            }
        }
    }

    let output = HookOutput::render(kind, &outcome);
    println!("{}", serde_json::to_string(&output)?);
    if let Some(message) = &output.system_message {
        if output.exit_code == 1 {
            eprintln!("gatehouse: {message}");
        }
    }
    Ok(output.exit_code)
}

/// Run a sync delegate to completion and feed its verdict back through the
/// engine, so the response reflects the subagent's judgment instead of a
/// directive. Runner failures resolve per the issuing predicate's policy.
async fn resolve_sync_delegate(
    engine: &GateEngine,
    runner: &SubagentRunner,
    outcome: EngineOutcome,
    spec: &DelegateSpec,
) -> Result<EngineOutcome> {
    let directive = DelegateDirective {
        subagent: spec.subagent.clone(),
        context_path: outcome.payload.as_ref().and_then(|p| p.temp_path.clone()),
        mode: spec.mode,
        timeout_secs: spec.timeout_secs,
    };

    match runner.run(&directive).await {
        Ok(text) => {
            let stop = Event::new(gatehouse_core::EventKind::SubagentStop, &outcome.session_id)
                .with_subagent_response(spec.subagent.clone(), text);
            engine.handle(stop).map_err(Into::into)
        }
        Err(err) => {
            let fail_open = outcome
                .state
                .pending_delegates
                .iter()
                .find(|p| p.subagent == spec.subagent)
                .map(|p| p.fail_open)
                .unwrap_or(false);
            tracing::warn!(
                subagent = %spec.subagent,
                error = %err,
                fail_open,
                "sync delegate failed"
            );

            // The delegation is over either way; drop the pending record
            engine.store().mutate(&outcome.session_id, &mut |state| {
                state.resolve_pending_delegate(&spec.subagent);
            })?;

            let verdict = if fail_open {
                Verdict::Warn(format!("{} unavailable: {err}", spec.subagent))
            } else {
                Verdict::Block(format!("{} failed: {err}", spec.subagent))
            };
            Ok(EngineOutcome { verdict, ..outcome })
        }
    }
}
