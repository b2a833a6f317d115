//! Built-in predicate set.
//!
//! The stock gate: cheap deterministic screens first, stateful gates after,
//! delegating gates last. All of them go through the ordinary [`Predicate`]
//! contract; nothing here is special-cased in the engine.

mod audit;
mod block_flag;
mod bypass;
mod hydration;
mod paths;
mod safety;

pub use audit::PeriodicAudit;
pub use block_flag::BlockFlagGate;
pub use bypass::SubagentBypass;
pub use hydration::HydrationGate;
pub use paths::ProtectedPath;
pub use safety::DangerousCommand;

use std::sync::Arc;

use crate::config::GateConfig;
use crate::error::ConfigError;
use crate::predicate::Predicate;
use crate::registry::PredicateRegistry;

/// Subagent names the built-in delegating predicates dispatch to.
pub mod subagents {
    /// Enriches the first prompt of a session with project context.
    pub const HYDRATOR: &str = "hydrator";
    /// Periodic session auditor.
    pub const CUSTODIET: &str = "custodiet";
}

/// Build the standard registry from a config.
///
/// Priorities ascend in evaluation order: the subagent exemption runs
/// before everything, command screens before delegating gates.
pub fn standard_registry(config: &GateConfig) -> Result<PredicateRegistry, ConfigError> {
    let mut registry = PredicateRegistry::new();
    registry.register(Arc::new(SubagentBypass), 10)?;
    registry.register(Arc::new(BlockFlagGate), 20)?;
    registry.register(Arc::new(DangerousCommand), 30)?;
    registry.register(
        Arc::new(ProtectedPath::new(&config.protected_paths)?),
        40,
    )?;
    registry.register(
        Arc::new(HydrationGate::new(
            config.hydration_mode,
            config.delegate_timeout_secs,
        )),
        50,
    )?;
    registry.register(
        Arc::new(PeriodicAudit::new(
            config.audit_mode,
            config.audit_interval,
            config.delegate_timeout_secs,
        )),
        60,
    )?;
    Ok(registry)
}
