//! Gatehouse core: an event-driven policy gate for coding-agent sessions.
//!
//! The agent runtime emits lifecycle events (session start, prompt, tool
//! use, stop); the gate evaluates an ordered set of predicates against each
//! event plus per-session state, reduces their verdicts to one (block over
//! delegate over warn over allow), applies the state transitions, and
//! answers over the hook protocol. Semantic judgment is never made in-line:
//! predicates that need it delegate to subagents whose verdicts re-enter
//! the pipeline as events of their own.
//!
//! ## Layout
//! - [`event`] / [`verdict`]: the two vocabularies everything shares
//! - [`predicate`] / [`registry`]: the check contract and its ordered set
//! - [`engine`]: evaluation, reduction, application
//! - [`state`]: per-session stores (in-memory and SQLite)
//! - [`context`]: bounded payloads for delegated subagents
//! - [`builtin`]: the stock predicate set
//! - [`runner`] / [`response`]: process execution and the wire envelope

pub mod builtin;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod predicate;
pub mod registry;
pub mod response;
pub mod runner;
pub mod state;
pub mod tools;
pub mod verdict;

pub use builtin::standard_registry;
pub use config::{GateConfig, GateMode};
pub use context::{ContextBuilder, ContextPayload, Template};
pub use engine::{EngineOutcome, GateEngine};
pub use error::{
    ConfigError, ContextError, EngineError, PredicateError, RegistryError, RunnerError, StoreError,
};
pub use event::{Event, EventKind};
pub use predicate::{FailurePolicy, Predicate};
pub use registry::{PredicateRegistry, Registration};
pub use response::{DelegateDirective, HookOutput, HookSpecificOutput, PermissionDecision};
pub use runner::SubagentRunner;
pub use state::{
    BlockFlag, HistoryEntry, MemoryStore, PendingDelegate, SessionState, SessionStore, SqliteStore,
};
pub use verdict::{parse_subagent_verdict, DelegateMode, DelegateSpec, Verdict};
