//! Engine configuration (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::audit::{AuditError, AuditSink, JsonlAuditSink, MemoryAuditSink};
use crate::core::escalation::EscalationPolicy;
use crate::core::lexicon::{Lexicon, LoadReport, BUNDLED_LEXICON};
use crate::core::scanner::SignalScanner;
use crate::{
    DEFAULT_AUDIT_MEMORY_CAPACITY, DEFAULT_COOLDOWN_MS, DEFAULT_DEBOUNCE_MS, DEFAULT_LEXICON_VERSION, DEFAULT_NEGATION_WINDOW,
    DEFAULT_REQUIRE_ACKNOWLEDGE, MAX_COOLDOWN_MS, MAX_NEGATION_WINDOW,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("debounce_ms must be greater than 0")]
    ZeroDebounce,
    #[error("cooldown_ms must be greater than 0")]
    ZeroCooldown,
    #[error("cooldown_ms {0} exceeds maximum of {max}", max = MAX_COOLDOWN_MS)]
    CooldownTooLarge(u64),
    #[error("negation_window {0} exceeds maximum of {max}", max = MAX_NEGATION_WINDOW)]
    NegationWindowTooLarge(usize),
    #[error("audit_memory_capacity must be greater than 0")]
    ZeroAuditCapacity,
}

/// Everything the engine can be tuned with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Lexicon file; bundled lexicon when absent
    pub lexicon_path: Option<PathBuf>,
    /// Version the lexicon file must declare
    pub lexicon_version: String,
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
    /// Tokens before a match searched for negation cues
    pub negation_window: usize,
    pub require_acknowledge: bool,
    /// JSON-lines audit file; in-memory sink when absent
    pub audit_log_path: Option<PathBuf>,
    /// Rows the in-memory sink keeps before evicting the oldest
    pub audit_memory_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lexicon_path: None,
            lexicon_version: DEFAULT_LEXICON_VERSION.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            negation_window: DEFAULT_NEGATION_WINDOW,
            require_acknowledge: DEFAULT_REQUIRE_ACKNOWLEDGE,
            audit_log_path: None,
            audit_memory_capacity: DEFAULT_AUDIT_MEMORY_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroDebounce);
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::ZeroCooldown);
        }
        if self.cooldown_ms > MAX_COOLDOWN_MS {
            return Err(ConfigError::CooldownTooLarge(self.cooldown_ms));
        }
        if self.negation_window > MAX_NEGATION_WINDOW {
            return Err(ConfigError::NegationWindowTooLarge(self.negation_window));
        }
        if self.audit_memory_capacity == 0 {
            return Err(ConfigError::ZeroAuditCapacity);
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            cooldown: chrono::Duration::milliseconds(self.cooldown_ms.min(MAX_COOLDOWN_MS) as i64),
            require_acknowledge: self.require_acknowledge,
        }
    }

    /// Load the configured lexicon. Load failures give an unavailable
    /// scanner rather than an error.
    pub fn build_scanner(&self) -> (SignalScanner, Option<LoadReport>) {
        let loaded = match &self.lexicon_path {
            Some(path) => Lexicon::load(path, Some(&self.lexicon_version)),
            None => Lexicon::from_json_str(BUNDLED_LEXICON, Some(&self.lexicon_version)),
        };

        SignalScanner::from_load(loaded, self.negation_window)
    }

    /// Audit sink for this config
    pub fn build_audit_sink(&self) -> Result<Arc<dyn AuditSink>, AuditError> {
        match &self.audit_log_path {
            Some(path) => Ok(Arc::new(JsonlAuditSink::open(path)?)),
            None => Ok(Arc::new(MemoryAuditSink::with_capacity(self.audit_memory_capacity))),
        }
    }
}
