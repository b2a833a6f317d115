//! Protected-path screen for file-writing tools.

use std::path::Path;

use glob::Pattern;

use crate::error::{ConfigError, PredicateError};
use crate::event::{Event, EventKind};
use crate::predicate::Predicate;
use crate::state::SessionState;
use crate::tools::{tool_category, ToolCategory};
use crate::verdict::Verdict;

/// Blocks write-shaped tools from touching configured glob patterns.
///
/// Defaults cover the agent's own configuration directories, so a session
/// cannot edit the rules that gate it. Read access stays open.
#[derive(Debug)]
pub struct ProtectedPath {
    patterns: Vec<Pattern>,
}

impl ProtectedPath {
    /// Compile the configured patterns. A malformed pattern is fatal at
    /// startup, never silently skipped.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProtectedPath { patterns: compiled })
    }

    fn matches(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.patterns.iter().any(|p| p.matches_path(path))
    }
}

impl Predicate for ProtectedPath {
    fn name(&self) -> &str {
        "protected_path"
    }

    fn events(&self) -> &[EventKind] {
        &[EventKind::PreToolUse]
    }

    fn evaluate(
        &self,
        event: &Event,
        _state: &SessionState,
    ) -> Result<Option<Verdict>, PredicateError> {
        let Some(tool) = event.tool_name.as_deref() else {
            return Ok(None);
        };
        if tool_category(tool) != ToolCategory::Write {
            return Ok(None);
        }
        let Some(path) = event.file_path() else {
            return Ok(None);
        };
        if self.matches(path) {
            tracing::warn!(tool, path, "write to protected path blocked");
            return Ok(Some(Verdict::Block(format!("protected path: {path}"))));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate() -> ProtectedPath {
        ProtectedPath::new(&[
            "**/.gatehouse/**".to_string(),
            "**/.claude/**".to_string(),
        ])
        .unwrap()
    }

    fn write_event(path: &str) -> Event {
        Event::new(EventKind::PreToolUse, "s1").with_tool("Write", json!({ "file_path": path }))
    }

    #[test]
    fn blocks_writes_inside_protected_dirs() {
        let verdict = gate()
            .evaluate(&write_event("/home/u/.claude/settings.json"), &SessionState::new("s1"))
            .unwrap();
        assert!(matches!(verdict, Some(Verdict::Block(_))));
    }

    #[test]
    fn allows_ordinary_writes() {
        let verdict = gate()
            .evaluate(&write_event("/home/u/project/src/main.rs"), &SessionState::new("s1"))
            .unwrap();
        assert_eq!(verdict, None);
    }

    #[test]
    fn read_tools_are_exempt() {
        let event = Event::new(EventKind::PreToolUse, "s1")
            .with_tool("Read", json!({ "file_path": "/home/u/.claude/settings.json" }));
        assert_eq!(gate().evaluate(&event, &SessionState::new("s1")).unwrap(), None);
    }

    #[test]
    fn malformed_pattern_is_fatal() {
        let err = ProtectedPath::new(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
