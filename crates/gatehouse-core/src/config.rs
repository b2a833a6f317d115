//! Gate configuration.
//!
//! Defaults in code, overlaid by an optional `gatehouse.toml` (under
//! `~/.gatehouse` unless an explicit path is given), overlaid by
//! `GATEHOUSE_*` environment variables. Loaded once at startup; malformed
//! values are fatal rather than silently defaulted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// How a delegating gate enforces its check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Enforce: gate the action on the check
    Block,
    /// Advise: surface a warning, let the action proceed
    Warn,
}

impl GateMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "block" => Some(GateMode::Block),
            "warn" => Some(GateMode::Warn),
            _ => None,
        }
    }
}

/// Optional config-file shape; every field falls back to the default.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    hydration_mode: Option<GateMode>,
    audit_mode: Option<GateMode>,
    audit_interval: Option<u64>,
    max_context_chars: Option<usize>,
    history_limit: Option<usize>,
    delegate_timeout_secs: Option<u64>,
    scratch_dir: Option<PathBuf>,
    state_path: Option<PathBuf>,
    protected_paths: Option<Vec<String>>,
    template_dir: Option<PathBuf>,
    #[serde(default)]
    subagents: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Prompt-hydration gate: Block delegates to the hydrator before the
    /// turn proceeds, Warn only annotates.
    pub hydration_mode: GateMode,
    /// Periodic-audit gate: Block refuses tool calls while an audit is
    /// overdue, Warn only annotates.
    pub audit_mode: GateMode,
    /// Dispatch an audit every N non-read-only tool calls.
    pub audit_interval: u64,
    /// Character cap for context payload bodies.
    pub max_context_chars: usize,
    /// Recent-history entries retained per session.
    pub history_limit: usize,
    /// Timeout handed to sync delegates.
    pub delegate_timeout_secs: u64,
    /// Where context payload scratch files are written.
    pub scratch_dir: PathBuf,
    /// SQLite session store location.
    pub state_path: PathBuf,
    /// Glob patterns write tools may not touch.
    pub protected_paths: Vec<String>,
    /// Optional directory of template overrides.
    pub template_dir: Option<PathBuf>,
    /// Subagent name -> shell command template for the in-process runner.
    pub subagents: BTreeMap<String, String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            hydration_mode: GateMode::Block,
            audit_mode: GateMode::Warn,
            audit_interval: 7,
            max_context_chars: 24_000,
            history_limit: 32,
            delegate_timeout_secs: 120,
            scratch_dir: std::env::temp_dir().join("gatehouse"),
            state_path: Self::data_dir().join("sessions.db"),
            protected_paths: vec![
                "**/.gatehouse/**".to_string(),
                "**/.claude/**".to_string(),
            ],
            template_dir: None,
            subagents: BTreeMap::new(),
        }
    }
}

impl GateConfig {
    /// `~/.gatehouse`, falling back to the working directory when no home
    /// directory exists (containers).
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".gatehouse"))
            .unwrap_or_else(|| PathBuf::from(".gatehouse"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("gatehouse.toml")
    }

    /// Defaults, the default config file if present, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = GateConfig::default();
        let path = Self::default_config_path();
        if path.exists() {
            config.apply_file(&path)?;
        }
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults, an explicit config file (which must exist), then the
    /// environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = GateConfig::default();
        config.apply_file(path)?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(mode) = file.hydration_mode {
            self.hydration_mode = mode;
        }
        if let Some(mode) = file.audit_mode {
            self.audit_mode = mode;
        }
        if let Some(interval) = file.audit_interval {
            self.audit_interval = interval;
        }
        if let Some(cap) = file.max_context_chars {
            self.max_context_chars = cap;
        }
        if let Some(limit) = file.history_limit {
            self.history_limit = limit;
        }
        if let Some(timeout) = file.delegate_timeout_secs {
            self.delegate_timeout_secs = timeout;
        }
        if let Some(dir) = file.scratch_dir {
            self.scratch_dir = dir;
        }
        if let Some(path) = file.state_path {
            self.state_path = path;
        }
        if let Some(paths) = file.protected_paths {
            self.protected_paths = paths;
        }
        if let Some(dir) = file.template_dir {
            self.template_dir = Some(dir);
        }
        self.subagents.extend(file.subagents);
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_pairs(|name| std::env::var(name).ok())
    }

    fn apply_env_pairs(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = get("GATEHOUSE_HYDRATION_MODE") {
            self.hydration_mode =
                GateMode::parse(&raw).ok_or(ConfigError::InvalidMode(raw))?;
        }
        if let Some(raw) = get("GATEHOUSE_AUDIT_MODE") {
            self.audit_mode = GateMode::parse(&raw).ok_or(ConfigError::InvalidMode(raw))?;
        }
        if let Some(raw) = get("GATEHOUSE_AUDIT_INTERVAL") {
            if let Ok(interval) = raw.parse() {
                self.audit_interval = interval;
            }
        }
        if let Some(dir) = get("GATEHOUSE_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("GATEHOUSE_STATE_PATH") {
            self.state_path = PathBuf::from(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sound() {
        let config = GateConfig::default();
        assert_eq!(config.hydration_mode, GateMode::Block);
        assert_eq!(config.audit_mode, GateMode::Warn);
        assert_eq!(config.audit_interval, 7);
        assert!(config.scratch_dir.ends_with("gatehouse"));
    }

    #[test]
    fn file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
hydration_mode = "warn"
audit_interval = 3
protected_paths = ["**/secrets/**"]

[subagents]
custodiet = "claude-agent custodiet"
"#
        )
        .unwrap();

        let config = GateConfig::load_from(&path).unwrap();
        assert_eq!(config.hydration_mode, GateMode::Warn);
        assert_eq!(config.audit_interval, 3);
        assert_eq!(config.protected_paths, vec!["**/secrets/**"]);
        assert_eq!(
            config.subagents.get("custodiet").map(String::as_str),
            Some("claude-agent custodiet")
        );
        // untouched fields keep their defaults
        assert_eq!(config.audit_mode, GateMode::Warn);
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.toml");
        std::fs::write(&path, "audit_interval = \"seven\"").unwrap();
        assert!(matches!(
            GateConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = GateConfig::default();
        config
            .apply_env_pairs(|name| match name {
                "GATEHOUSE_HYDRATION_MODE" => Some("warn".to_string()),
                "GATEHOUSE_AUDIT_INTERVAL" => Some("11".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.hydration_mode, GateMode::Warn);
        assert_eq!(config.audit_interval, 11);
    }

    #[test]
    fn invalid_env_mode_is_fatal() {
        let mut config = GateConfig::default();
        let err = config
            .apply_env_pairs(|name| {
                (name == "GATEHOUSE_AUDIT_MODE").then(|| "maybe".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode(raw) if raw == "maybe"));
    }
}
