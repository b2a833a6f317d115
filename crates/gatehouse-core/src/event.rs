//! Lifecycle events fed into the gate pipeline.
//!
//! The external runtime emits one JSON object per lifecycle boundary
//! (`{session_id, hook_event_name, ...}`). Events are consumed once by the
//! engine and never persisted verbatim; only derived session state survives.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::EngineError;

/// The lifecycle boundary an event was emitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A session is starting (or resuming)
    SessionStart,
    /// The user submitted a prompt
    UserPromptSubmit,
    /// A tool is about to run, can be blocked
    PreToolUse,
    /// A tool finished running
    PostToolUse,
    /// The session's main turn is ending
    Stop,
    /// A delegated subagent finished and reported its verdict
    SubagentStop,
}

impl EventKind {
    /// All event kinds, in lifecycle order.
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::SessionStart,
            EventKind::UserPromptSubmit,
            EventKind::PreToolUse,
            EventKind::PostToolUse,
            EventKind::Stop,
            EventKind::SubagentStop,
        ]
    }

    /// Wire name, as carried in `hook_event_name`.
    pub fn display_name(&self) -> &'static str {
        match self {
            EventKind::SessionStart => "SessionStart",
            EventKind::UserPromptSubmit => "UserPromptSubmit",
            EventKind::PreToolUse => "PreToolUse",
            EventKind::PostToolUse => "PostToolUse",
            EventKind::Stop => "Stop",
            EventKind::SubagentStop => "SubagentStop",
        }
    }

    /// Parse from the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SessionStart" => Some(EventKind::SessionStart),
            "UserPromptSubmit" => Some(EventKind::UserPromptSubmit),
            "PreToolUse" => Some(EventKind::PreToolUse),
            "PostToolUse" => Some(EventKind::PostToolUse),
            "Stop" => Some(EventKind::Stop),
            "SubagentStop" => Some(EventKind::SubagentStop),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Raw wire shape. Unknown fields are ignored; validation happens in
/// [`Event::from_json`].
#[derive(Debug, Default, Deserialize)]
struct WireEvent {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    hook_event_name: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_input: Value,
    #[serde(default)]
    tool_response: Option<Value>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    subagent: Option<String>,
    #[serde(default)]
    subagent_response: Option<String>,
}

/// A single validated lifecycle event.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Tool name for PreToolUse/PostToolUse
    pub tool_name: Option<String>,
    /// Tool input object for PreToolUse/PostToolUse
    pub tool_input: Value,
    /// Tool output for PostToolUse
    pub tool_response: Option<Value>,
    /// Prompt text for UserPromptSubmit
    pub prompt: Option<String>,
    pub cwd: Option<String>,
    /// Set when the event originates from a subagent session
    pub agent_type: Option<String>,
    /// SessionStart origin: "startup", "resume", "clear"
    pub source: Option<String>,
    /// Reporting subagent for SubagentStop
    pub subagent: Option<String>,
    /// Verdict text from the subagent for SubagentStop
    pub subagent_response: Option<String>,
}

impl Event {
    /// Validate and build an event from its wire JSON.
    ///
    /// A missing or unrecognized `hook_event_name` is malformed. So is an
    /// empty `session_id`, except on a bootstrap SessionStart.
    pub fn from_json(json: Value) -> Result<Self, EngineError> {
        let wire: WireEvent = serde_json::from_value(json)
            .map_err(|e| EngineError::MalformedEvent(e.to_string()))?;

        let kind = EventKind::parse(&wire.hook_event_name).ok_or_else(|| {
            EngineError::MalformedEvent(format!(
                "unknown hook_event_name: '{}'",
                wire.hook_event_name
            ))
        })?;

        if wire.session_id.is_empty() && kind != EventKind::SessionStart {
            return Err(EngineError::MalformedEvent(format!(
                "missing session_id for {kind} event"
            )));
        }

        Ok(Event {
            kind,
            session_id: wire.session_id,
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            tool_name: wire.tool_name,
            tool_input: wire.tool_input,
            tool_response: wire.tool_response,
            prompt: wire.prompt,
            cwd: wire.cwd,
            agent_type: wire.agent_type,
            source: wire.source,
            subagent: wire.subagent,
            subagent_response: wire.subagent_response,
        })
    }

    /// Bare event for a kind and session, used by builders and tests.
    pub fn new(kind: EventKind, session_id: impl Into<String>) -> Self {
        Event {
            kind,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            tool_name: None,
            tool_input: Value::Null,
            tool_response: None,
            prompt: None,
            cwd: None,
            agent_type: None,
            source: None,
            subagent: None,
            subagent_response: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, input: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_input = input;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn with_subagent_response(
        mut self,
        subagent: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.subagent = Some(subagent.into());
        self.subagent_response = Some(response.into());
        self
    }

    /// Shell command for Bash tool calls.
    pub fn command(&self) -> Option<&str> {
        self.tool_input.get("command").and_then(|c| c.as_str())
    }

    /// Target path for file tools (Write/Edit/Read).
    pub fn file_path(&self) -> Option<&str> {
        self.tool_input.get("file_path").and_then(|p| p.as_str())
    }

    /// Subagent type for Task tool invocations.
    pub fn task_subagent_type(&self) -> Option<&str> {
        self.tool_input
            .get("subagent_type")
            .and_then(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pre_tool_use() {
        let event = Event::from_json(json!({
            "session_id": "s1",
            "hook_event_name": "PreToolUse",
            "tool_name": "Bash",
            "tool_input": {"command": "ls -la"},
            "unknown_field": 42,
        }))
        .unwrap();

        assert_eq!(event.kind, EventKind::PreToolUse);
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.command(), Some("ls -la"));
    }

    #[test]
    fn rejects_unknown_event_name() {
        let err = Event::from_json(json!({
            "session_id": "s1",
            "hook_event_name": "Notification",
        }))
        .unwrap_err();

        assert!(err.to_string().contains("unknown hook_event_name"));
    }

    #[test]
    fn rejects_missing_event_name() {
        let err = Event::from_json(json!({"session_id": "s1"})).unwrap_err();
        assert!(matches!(err, EngineError::MalformedEvent(_)));
    }

    #[test]
    fn requires_session_id_except_bootstrap_start() {
        let err = Event::from_json(json!({"hook_event_name": "PreToolUse"})).unwrap_err();
        assert!(err.to_string().contains("session_id"));

        let bootstrap = Event::from_json(json!({"hook_event_name": "SessionStart"})).unwrap();
        assert_eq!(bootstrap.kind, EventKind::SessionStart);
        assert!(bootstrap.session_id.is_empty());
    }

    #[test]
    fn event_kind_round_trips_wire_names() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::parse(kind.display_name()), Some(*kind));
        }
        assert_eq!(EventKind::parse("NotAnEvent"), None);
    }

    #[test]
    fn extracts_task_subagent_type() {
        let event = Event::new(EventKind::PreToolUse, "s1")
            .with_tool("Task", json!({"subagent_type": "hydrator", "prompt": "go"}));
        assert_eq!(event.task_subagent_type(), Some("hydrator"));
    }
}
