//! Tool categorization for gating decisions.
//!
//! The runtime's tool set is open-ended (MCP servers add arbitrary names),
//! so categorization is by known name with a conservative default: an
//! unknown tool is assumed to write.

/// Broad effect class of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Inspects state without changing it; exempt from audit counting.
    ReadOnly,
    /// Mutates files, runs commands, or touches the network.
    Write,
    /// Orchestration tools (subagent dispatch, plan bookkeeping).
    Meta,
}

/// Categorize a tool by its wire name.
pub fn tool_category(name: &str) -> ToolCategory {
    match name {
        "Read" | "Glob" | "Grep" | "NotebookRead" | "WebFetch" | "WebSearch" | "TodoRead" => {
            ToolCategory::ReadOnly
        }
        "Task" | "Skill" | "TodoWrite" | "ExitPlanMode" => ToolCategory::Meta,
        _ => ToolCategory::Write,
    }
}

impl ToolCategory {
    pub fn is_read_only(&self) -> bool {
        matches!(self, ToolCategory::ReadOnly)
    }
}
