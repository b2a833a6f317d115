//! Verdicts, their reduction, and the subagent verdict-text parser.
//!
//! Reduction precedence is Block > Delegate > Warn > Allow; the most
//! restrictive verdict wins and ties keep the earlier one, so with the
//! engine's priority-ordered evaluation the first decisive verdict decides
//! the event.

use serde::{Deserialize, Serialize};

/// How a delegated subagent runs relative to the session timeline.
///
/// Sync delegates gate the current action until the verdict is collected.
/// Async delegates run in background; their verdict re-enters the pipeline
/// later as a SubagentStop event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegateMode {
    Sync,
    Async,
}

/// Request to hand judgment to a named subagent.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateSpec {
    pub subagent: String,
    /// Why the delegation was issued; included in the context payload.
    pub reason: String,
    pub mode: DelegateMode,
    /// Seconds a sync caller may wait before applying the issuing
    /// predicate's failure policy.
    pub timeout_secs: u64,
}

/// Outcome of one predicate evaluation, or of a whole event after reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow,
    Warn(String),
    Block(String),
    Delegate(DelegateSpec),
}

impl Verdict {
    /// Decisive verdicts end evaluation for the event.
    pub fn is_decisive(&self) -> bool {
        matches!(self, Verdict::Block(_) | Verdict::Delegate(_))
    }

    fn severity(&self) -> u8 {
        match self {
            Verdict::Allow => 0,
            Verdict::Warn(_) => 1,
            Verdict::Delegate(_) => 2,
            Verdict::Block(_) => 3,
        }
    }

    /// Keep the more restrictive of two verdicts; ties keep `self`.
    pub fn reduce(self, other: Verdict) -> Verdict {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Reduce a list of verdicts to one. Empty input is Allow.
    pub fn reduce_all<I: IntoIterator<Item = Verdict>>(verdicts: I) -> Verdict {
        verdicts
            .into_iter()
            .fold(Verdict::Allow, |acc, v| acc.reduce(v))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Warn(_) => "warn",
            Verdict::Block(_) => "block",
            Verdict::Delegate(_) => "delegate",
        }
    }
}

// ── Subagent verdict text ────────────────────────────────────────────────

const UNPARSEABLE_REASON: &str = "unparseable subagent response";

/// Parse a subagent's free-text verdict into a [`Verdict`].
///
/// Accepted forms, first match wins:
/// - a JSON object with a `verdict` field (`proceed`/`allow`/`ok`/`approved`,
///   `warn`, `block`/`deny`/`violation`/`rejected`), reason taken from a
///   `reason` or `message` field;
/// - a leading keyword line: `OK`, `APPROVED`, `PROCEED`, `WARN: ...`,
///   `BLOCK: ...`, `VIOLATION: ...`, `DENY: ...`, `REJECTED: ...`.
///
/// Anything else is fail-closed: ambiguous text never becomes an Allow.
pub fn parse_subagent_verdict(text: &str) -> Verdict {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Verdict::Block(UNPARSEABLE_REASON.to_string());
    }

    if trimmed.starts_with('{') {
        if let Some(verdict) = parse_json_verdict(trimmed) {
            return verdict;
        }
        return Verdict::Block(UNPARSEABLE_REASON.to_string());
    }

    let Some(first_line) = trimmed.lines().find(|l| !l.trim().is_empty()) else {
        return Verdict::Block(UNPARSEABLE_REASON.to_string());
    };
    let line = first_line.trim();
    let upper = line.to_uppercase();

    for keyword in ["OK", "APPROVED", "PROCEED"] {
        if keyword_matches(&upper, keyword) {
            return Verdict::Allow;
        }
    }
    if keyword_matches(&upper, "WARN") {
        let message = keyword_rest(line, "WARN");
        let message = if message.is_empty() {
            rest_of(trimmed, first_line)
        } else {
            message
        };
        return Verdict::Warn(non_empty_or(message, "subagent warning"));
    }
    for keyword in ["BLOCK", "VIOLATION", "DENY", "REJECTED"] {
        if keyword_matches(&upper, keyword) {
            let reason = keyword_rest(line, keyword);
            let reason = if reason.is_empty() {
                rest_of(trimmed, first_line)
            } else {
                reason
            };
            return Verdict::Block(non_empty_or(reason, "subagent blocked"));
        }
    }

    Verdict::Block(UNPARSEABLE_REASON.to_string())
}

fn parse_json_verdict(text: &str) -> Option<Verdict> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let verdict = value.get("verdict")?.as_str()?.to_lowercase();
    let reason = value
        .get("reason")
        .or_else(|| value.get("message"))
        .and_then(|r| r.as_str())
        .map(str::to_string);

    match verdict.as_str() {
        "proceed" | "allow" | "ok" | "approved" => Some(Verdict::Allow),
        "warn" => Some(Verdict::Warn(non_empty_or(
            reason.unwrap_or_default(),
            "subagent warning",
        ))),
        "block" | "deny" | "violation" | "rejected" => Some(Verdict::Block(non_empty_or(
            reason.unwrap_or_default(),
            "subagent blocked",
        ))),
        _ => None,
    }
}

/// The keyword must be the whole first word, optionally followed by
/// punctuation (`BLOCK: reason`, `APPROVED.`).
fn keyword_matches(upper_line: &str, keyword: &str) -> bool {
    if !upper_line.starts_with(keyword) {
        return false;
    }
    match upper_line[keyword.len()..].chars().next() {
        None => true,
        Some(c) => c == ':' || c == '.' || c == '!' || c.is_whitespace(),
    }
}

fn keyword_rest(line: &str, keyword: &str) -> String {
    line[keyword.len()..]
        .trim_start_matches([':', '.', '!'])
        .trim()
        .to_string()
}

/// Everything after the keyword line, for verdicts whose detail follows on
/// later lines.
fn rest_of(full: &str, first_line: &str) -> String {
    match full.split_once(first_line) {
        Some((_, rest)) => rest.trim().to_string(),
        None => String::new(),
    }
}

fn non_empty_or(s: String, fallback: &str) -> String {
    if s.is_empty() {
        fallback.to_string()
    } else {
        s
    }
}
