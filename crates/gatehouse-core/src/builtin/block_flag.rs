//! Standing-block enforcement.

use crate::error::PredicateError;
use crate::event::{Event, EventKind};
use crate::predicate::Predicate;
use crate::state::SessionState;
use crate::verdict::Verdict;

/// Blocks guarded events while the session carries a block flag.
///
/// The flag is set when a subagent files a violation verdict and cleared by
/// teardown or an operator reset; until then tool use and new prompts are
/// refused with the recorded reason.
pub struct BlockFlagGate;

impl Predicate for BlockFlagGate {
    fn name(&self) -> &str {
        "block_flag"
    }

    fn events(&self) -> &[EventKind] {
        &[EventKind::PreToolUse, EventKind::UserPromptSubmit]
    }

    fn evaluate(
        &self,
        _event: &Event,
        state: &SessionState,
    ) -> Result<Option<Verdict>, PredicateError> {
        let Some(flag) = &state.block_flag else {
            return Ok(None);
        };
        Ok(Some(Verdict::Block(format!(
            "session blocked by {}: {}",
            flag.source, flag.reason
        ))))
    }
}
