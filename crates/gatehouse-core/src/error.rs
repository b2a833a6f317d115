//! Error taxonomy for the gate pipeline.
//!
//! Registration and session-init failures are fatal; predicate failures are
//! caught per-predicate and converted to verdicts by the engine; a missing
//! session degrades to default state instead of erroring the chain.

use thiserror::Error;

/// Registration-time configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("predicate name already registered: {0}")]
    DuplicateName(String),
}

/// Session state store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session already initialized: {0}")]
    DuplicateSession(String),

    #[error("no state for session: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Context builder errors. Template lookup is fail-fast: a delegate with no
/// template becomes a block, never an empty payload.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no context template registered for subagent: {0}")]
    TemplateMissing(String),

    #[error("malformed template front matter in {path}: {reason}")]
    BadTemplate { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A failure inside a single predicate's `evaluate`. Never propagates past
/// the engine; converted to Block or Allow per the predicate's policy.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("{0}")]
    Evaluation(String),

    #[error("shell tokenization failed: {0}")]
    Tokenize(#[from] shell_words::ParseError),
}

/// Subagent runner errors, resolved per the issuing predicate's policy.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no command configured for subagent: {0}")]
    NoCommand(String),

    #[error("failed to spawn subagent command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("subagent timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid gate mode '{0}': expected 'block' or 'warn'")]
    InvalidMode(String),

    #[error("invalid protected-path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Engine-level failures: malformed input events and session-init faults.
/// These propagate to the caller unmodified.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
