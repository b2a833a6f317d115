//! Context payloads for delegated subagents.
//!
//! When a predicate delegates, the builder fills the subagent's template
//! with the delegation reason, the current event, session facts, and
//! bounded recent history, then writes the result to a scratch file the
//! subagent is told to read ("read exactly this path", never "guess a
//! path").
//!
//! Truncation is deterministic: history is dropped oldest-first to fit the
//! configured cap, and the current event's details are never silently
//! dropped (oversized fields are cut with an explicit marker).

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::GateConfig;
use crate::error::ContextError;
use crate::event::{Event, EventKind};
use crate::state::SessionState;
use crate::verdict::DelegateSpec;

/// Scratch files older than this are swept when a new payload is written.
const SCRATCH_MAX_AGE: Duration = Duration::from_secs(3600);
/// Cap applied to single event fields (tool input, prompt) inside the
/// otherwise-untruncated current-event section.
const EVENT_FIELD_CAP: usize = 2_000;

/// A named context template. The body may reference `{reason}`, `{event}`,
/// `{session}`, and `{history}`.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub description: String,
    body: String,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Template {
            name: name.into(),
            description: description.into(),
            body: body.into(),
        }
    }

    /// Parse a `---` front-mattered markdown template file.
    fn parse(content: &str, path: &Path) -> Result<Self, ContextError> {
        let bad = |reason: &str| ContextError::BadTemplate {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let rest = content
            .strip_prefix("---\n")
            .ok_or_else(|| bad("missing front matter"))?;
        let (front, body) = rest
            .split_once("\n---\n")
            .ok_or_else(|| bad("unterminated front matter"))?;

        #[derive(Deserialize)]
        struct FrontMatter {
            name: String,
            #[serde(default)]
            description: String,
        }
        let front: FrontMatter = serde_yaml::from_str(front)
            .map_err(|e| bad(&format!("invalid front matter: {e}")))?;

        Ok(Template {
            name: front.name,
            description: front.description,
            body: body.trim_start().to_string(),
        })
    }
}

const CUSTODIET_TEMPLATE: &str = "\
# Compliance audit

{reason}

Review the session activity below and judge whether the agent is operating
within its rules. Respond with `APPROVED`, `WARN: <note>`, or
`BLOCK: <reason>`.

## Current event

{event}

## Session

{session}

## Recent activity

{history}
";

const HYDRATOR_TEMPLATE: &str = "\
# Prompt hydration

{reason}

Enrich the prompt below with the task context it needs before the turn
proceeds. Respond with `PROCEED` once the context is prepared, or
`BLOCK: <reason>` if the prompt cannot be safely hydrated.

## Current event

{event}

## Session

{session}

## Recent activity

{history}
";

/// Assembles bounded [`ContextPayload`]s for delegated subagents.
pub struct ContextBuilder {
    templates: HashMap<String, Template>,
    scratch_dir: PathBuf,
    max_chars: usize,
}

/// The assembled payload. Ephemeral: safe to discard once the subagent has
/// responded.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPayload {
    pub subagent: String,
    pub body: String,
    pub temp_path: Option<PathBuf>,
}

impl ContextBuilder {
    /// Built-in templates plus any overrides found in the configured
    /// template directory.
    pub fn new(config: &GateConfig) -> Result<Self, ContextError> {
        let mut templates = HashMap::new();
        for template in [
            Template::new("custodiet", "periodic compliance audit", CUSTODIET_TEMPLATE),
            Template::new("hydrator", "prompt hydration", HYDRATOR_TEMPLATE),
        ] {
            templates.insert(template.name.clone(), template);
        }

        let mut builder = ContextBuilder {
            templates,
            scratch_dir: config.scratch_dir.clone(),
            max_chars: config.max_context_chars,
        };
        if let Some(dir) = &config.template_dir {
            builder.load_overrides(dir)?;
        }
        Ok(builder)
    }

    /// Register (or replace) a template.
    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    pub fn has_template(&self, subagent: &str) -> bool {
        self.templates.contains_key(subagent)
    }

    fn load_overrides(&mut self, dir: &Path) -> Result<(), ContextError> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let template = Template::parse(&content, &path)?;
            debug!(name = %template.name, path = %path.display(), "loaded context template");
            self.templates.insert(template.name.clone(), template);
        }
        Ok(())
    }

    /// Fill the subagent's template. Fails fast when no template is
    /// registered; the engine converts that into a block rather than
    /// sending a subagent an empty payload.
    pub fn build(
        &self,
        spec: &DelegateSpec,
        state: &SessionState,
        event: &Event,
    ) -> Result<ContextPayload, ContextError> {
        let template = self
            .templates
            .get(&spec.subagent)
            .ok_or_else(|| ContextError::TemplateMissing(spec.subagent.clone()))?;

        let event_section = render_event(event);
        let session_section = render_session(state);

        let skeleton = template
            .body
            .replace("{reason}", &spec.reason)
            .replace("{event}", &event_section)
            .replace("{session}", &session_section);

        // Whatever the cap leaves after the fixed sections goes to history,
        // newest entries kept first.
        let budget = self
            .max_chars
            .saturating_sub(skeleton.len().saturating_sub("{history}".len()));
        let history_section = render_history(state, budget);

        Ok(ContextPayload {
            subagent: spec.subagent.clone(),
            body: skeleton.replace("{history}", &history_section),
            temp_path: None,
        })
    }

    /// Write the payload body to a scratch file and record its path.
    /// Sweeps stale payload files as a side effect.
    pub fn persist(&self, payload: &mut ContextPayload) -> Result<PathBuf, ContextError> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        self.sweep_stale();

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}_", payload.subagent))
            .suffix(".md")
            .tempfile_in(&self.scratch_dir)?;
        file.write_all(payload.body.as_bytes())?;
        let (_, path) = file.keep().map_err(|e| ContextError::Io(e.error))?;

        payload.temp_path = Some(path.clone());
        Ok(path)
    }

    /// Best-effort removal of payload files past [`SCRATCH_MAX_AGE`].
    fn sweep_stale(&self) {
        let Ok(entries) = std::fs::read_dir(&self.scratch_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            let stale = modified
                .elapsed()
                .map(|age| age >= SCRATCH_MAX_AGE)
                .unwrap_or(false);
            if stale && std::fs::remove_file(entry.path()).is_ok() {
                debug!(path = %entry.path().display(), "swept stale context payload");
            }
        }
    }
}

fn render_event(event: &Event) -> String {
    let mut out = format!("- kind: {}\n- session: {}", event.kind, event.session_id);
    if let Some(tool) = &event.tool_name {
        out.push_str(&format!("\n- tool: {tool}"));
        if !event.tool_input.is_null() {
            let input = serde_json::to_string(&event.tool_input).unwrap_or_default();
            out.push_str(&format!("\n- input: {}", cap_field(&input)));
        }
    }
    if let Some(prompt) = &event.prompt {
        out.push_str(&format!("\n- prompt: {}", cap_field(prompt)));
    }
    if event.kind == EventKind::SubagentStop {
        if let Some(subagent) = &event.subagent {
            out.push_str(&format!("\n- subagent: {subagent}"));
        }
    }
    out
}

fn render_session(state: &SessionState) -> String {
    let mut out = format!("- hydration_pending: {}", state.hydration_pending);
    match &state.block_flag {
        Some(flag) => out.push_str(&format!("\n- block_flag: {} ({})", flag.reason, flag.source)),
        None => out.push_str("\n- block_flag: none"),
    }
    for (name, value) in &state.counters {
        out.push_str(&format!("\n- counter {name}: {value}"));
    }
    for pending in &state.pending_delegates {
        out.push_str(&format!(
            "\n- pending delegate: {} (from {})",
            pending.subagent, pending.predicate
        ));
    }
    out
}

/// Render history newest-first into `budget` chars, then restore
/// chronological order. Dropped entries are the oldest and are announced
/// with an explicit marker.
fn render_history(state: &SessionState, budget: usize) -> String {
    if state.history.is_empty() {
        return "(no recorded activity)".to_string();
    }

    let mut kept: Vec<String> = Vec::new();
    let mut used = 0usize;
    for entry in state.history.iter().rev() {
        let line = format!("- {} {}", entry.at.format("%H:%M:%S"), entry.summary);
        let cost = line.len() + 1;
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(line);
    }
    kept.reverse();

    let dropped = state.history.len() - kept.len();
    let mut out = String::new();
    if dropped > 0 {
        out.push_str(&format!("[... {dropped} older entries omitted ...]\n"));
    }
    out.push_str(&kept.join("\n"));
    out
}

fn cap_field(text: &str) -> String {
    if text.len() <= EVENT_FIELD_CAP {
        return text.to_string();
    }
    let boundary = floor_char_boundary(text, EVENT_FIELD_CAP);
    format!("{}[... truncated ...]", &text[..boundary])
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::DelegateMode;
    use chrono::Utc;
    use serde_json::json;

    fn config_with(dir: &Path, max_chars: usize) -> GateConfig {
        GateConfig {
            scratch_dir: dir.to_path_buf(),
            max_context_chars: max_chars,
            ..GateConfig::default()
        }
    }

    fn audit_spec() -> DelegateSpec {
        DelegateSpec {
            subagent: "custodiet".to_string(),
            reason: "7 tool calls since the last audit".to_string(),
            mode: DelegateMode::Async,
            timeout_secs: 120,
        }
    }

    #[test]
    fn missing_template_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(&config_with(dir.path(), 10_000)).unwrap();
        let spec = DelegateSpec {
            subagent: "gatekeeper".to_string(),
            ..audit_spec()
        };
        let err = builder
            .build(&spec, &SessionState::new("s1"), &Event::new(EventKind::Stop, "s1"))
            .unwrap_err();
        assert!(matches!(err, ContextError::TemplateMissing(name) if name == "gatekeeper"));
    }

    #[test]
    fn payload_contains_current_event_and_session_facts() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(&config_with(dir.path(), 10_000)).unwrap();

        let mut state = SessionState::new("s1");
        state.hydration_pending = true;
        state.bump_counter(crate::state::counters::TOOL_CALLS_TOTAL);
        let event = Event::new(EventKind::PostToolUse, "s1")
            .with_tool("Edit", json!({"file_path": "src/main.rs"}));

        let payload = builder.build(&audit_spec(), &state, &event).unwrap();
        assert!(payload.body.contains("7 tool calls since the last audit"));
        assert!(payload.body.contains("tool: Edit"));
        assert!(payload.body.contains("hydration_pending: true"));
        assert!(payload.body.contains("counter tool_calls_total: 1"));
        assert!(payload.temp_path.is_none());
    }

    #[test]
    fn truncation_drops_oldest_history_first() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(&config_with(dir.path(), 900)).unwrap();

        let mut state = SessionState::new("s1");
        for i in 0..50 {
            state.push_history(Utc::now(), format!("tool call number {i:03}"), 100);
        }
        let event = Event::new(EventKind::PostToolUse, "s1").with_tool("Bash", json!({}));

        let payload = builder.build(&audit_spec(), &state, &event).unwrap();
        assert!(payload.body.contains("older entries omitted"));
        assert!(payload.body.contains("tool call number 049"));
        assert!(!payload.body.contains("tool call number 000"));
        // the current event never drops
        assert!(payload.body.contains("tool: Bash"));
    }

    #[test]
    fn builds_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(&config_with(dir.path(), 600)).unwrap();

        let mut state = SessionState::new("s1");
        let at = Utc::now();
        for i in 0..20 {
            state.push_history(at, format!("entry {i}"), 100);
        }
        let event = Event::new(EventKind::PostToolUse, "s1").with_tool("Write", json!({}));

        let first = builder.build(&audit_spec(), &state, &event).unwrap();
        let second = builder.build(&audit_spec(), &state, &event).unwrap();
        assert_eq!(first.body, second.body);
    }

    #[test]
    fn persist_writes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(&config_with(dir.path(), 10_000)).unwrap();

        let mut payload = builder
            .build(
                &audit_spec(),
                &SessionState::new("s1"),
                &Event::new(EventKind::PostToolUse, "s1"),
            )
            .unwrap();
        let path = builder.persist(&mut payload).unwrap();

        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("custodiet_") && name.ends_with(".md"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), payload.body);
        assert_eq!(payload.temp_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn template_overrides_replace_builtins() {
        let scratch = tempfile::tempdir().unwrap();
        let overrides = tempfile::tempdir().unwrap();
        std::fs::write(
            overrides.path().join("custodiet.md"),
            "---\nname: custodiet\ndescription: local audit\n---\nAudit now: {reason}\n",
        )
        .unwrap();

        let mut config = config_with(scratch.path(), 10_000);
        config.template_dir = Some(overrides.path().to_path_buf());
        let builder = ContextBuilder::new(&config).unwrap();

        let payload = builder
            .build(
                &audit_spec(),
                &SessionState::new("s1"),
                &Event::new(EventKind::PostToolUse, "s1"),
            )
            .unwrap();
        assert!(payload.body.starts_with("Audit now:"));
    }

    #[test]
    fn malformed_override_is_fatal() {
        let scratch = tempfile::tempdir().unwrap();
        let overrides = tempfile::tempdir().unwrap();
        std::fs::write(overrides.path().join("broken.md"), "no front matter here").unwrap();

        let mut config = config_with(scratch.path(), 10_000);
        config.template_dir = Some(overrides.path().to_path_buf());
        assert!(matches!(
            ContextBuilder::new(&config),
            Err(ContextError::BadTemplate { .. })
        ));
    }
}
