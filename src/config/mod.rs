// src/config/mod.rs
// ============================================================================
// Module: Triage Pipeline Configuration
// Description: TOML-backed configuration tree for the triage pipeline.
// Purpose: Load, validate, and expose every pipeline configuration key.
// Dependencies: serde, toml, std::time
// ============================================================================

//! ## Overview
//! Configuration loads as a nested, `#[serde(default)]`-annotated tree from a
//! TOML document (file path or inline string), then runs an exhaustive
//! bottom-up [`PipelineConfig::validate`] pass so misconfiguration is caught
//! at startup rather than silently ignored. Secrets (`reasoning.api_key`,
//! `communication.api_key`) are never read from the TOML file; they are only
//! ever sourced from the `TRIAGE_REASONING_API_KEY` /
//! `TRIAGE_COMMUNICATION_API_KEY` environment variables so a config file
//! checked into a repo cannot leak a credential.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Maximum configuration file size accepted by [`PipelineConfig::load`].
const MAX_CONFIG_FILE_SIZE: usize = 256 * 1024;

/// Environment variable carrying the reasoning backend API key.
const REASONING_API_KEY_ENV: &str = "TRIAGE_REASONING_API_KEY";
/// Environment variable carrying the communication backend API key.
const COMMUNICATION_API_KEY_ENV: &str = "TRIAGE_COMMUNICATION_API_KEY";

/// Top-level configuration for the triage pipeline.
///
/// Every field corresponds to one configuration key family; all fields
/// are optional with documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Multimodal Clinical Reasoning backend configuration.
    pub reasoning: BackendConfig,
    /// Communication rewrite backend configuration.
    pub communication: BackendConfig,
    /// Shared circuit-breaker tuning, applied per endpoint.
    pub circuit: CircuitConfig,
    /// Policy pack loader configuration.
    pub policy: PolicyConfig,
    /// PHI-guard toggle.
    pub phi_guard: PhiGuardConfig,
    /// Per-request size/deadline limits.
    pub request: RequestConfig,
    /// Intake Structuring catalog tuning.
    pub intake: IntakeConfig,
}

impl PipelineConfig {
    /// Loads configuration from a TOML file, applying environment overrides
    /// for API key secrets, then validates the result.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the
    /// size limit, fails to parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let text =
            std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(text)
    }

    /// Parses configuration from an in-memory TOML document, applying
    /// environment overrides for API key secrets, then validates the
    /// result.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the document fails to parse or fails
    /// validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overrides secret fields from environment variables. Called
    /// automatically by [`Self::load`] / [`Self::from_toml_str`]; exposed so
    /// callers constructing a [`PipelineConfig`] programmatically (e.g. in
    /// tests) can opt in explicitly.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var(REASONING_API_KEY_ENV) {
            if !key.is_empty() {
                self.reasoning.api_key = Some(key);
            }
        }
        if let Ok(key) = env::var(COMMUNICATION_API_KEY_ENV) {
            if !key.is_empty() {
                self.communication.api_key = Some(key);
            }
        }
    }

    /// Validates every nested section.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first invariant
    /// violation encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reasoning.validate("reasoning")?;
        self.communication.validate("communication")?;
        self.circuit.validate()?;
        self.policy.validate()?;
        self.request.validate()?;
        self.intake.validate()?;
        Ok(())
    }
}

/// Selects which reasoning/communication implementation answers a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process deterministic rules only.
    Deterministic,
    /// External chat-completions HTTP endpoint, with deterministic
    /// fallback on any failure.
    External,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Deterministic
    }
}

/// Configuration shared by the reasoning and communication external
/// adapters (TOML tables `reasoning.*` / `communication.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackendConfig {
    /// Which implementation answers this stage.
    pub backend: BackendKind,
    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    pub base_url: Option<String>,
    /// Model name passed in the request body.
    pub model: Option<String>,
    /// Bearer API key. Never loaded from a TOML file on disk; see
    /// [`PipelineConfig::apply_env_overrides`].
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Whether to include image data URIs in the request.
    pub send_images: bool,
    /// Maximum number of images to include when `send_images` is set.
    pub max_images: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum response tokens requested.
    pub max_tokens: u32,
    /// Per-attempt timeout, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum retry attempts after the first.
    pub max_retries: u32,
    /// Initial retry backoff, in milliseconds (doubles each attempt).
    pub retry_backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_url: None,
            model: None,
            api_key: None,
            send_images: false,
            max_images: 2,
            temperature: 0.2,
            max_tokens: 600,
            timeout_ms: 30_000,
            max_retries: 1,
            retry_backoff_ms: 500,
        }
    }
}

impl BackendConfig {
    /// Returns the per-attempt timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the initial retry backoff as a [`Duration`].
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Validates this backend configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `backend == External` and
    /// `base_url`/`model` are unset, when `max_images` exceeds 8, or when
    /// `timeout_ms` is zero.
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if matches!(self.backend, BackendKind::External) {
            if self.base_url.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Invalid(format!("{section}.base_url is required when backend=external")));
            }
            if self.model.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Invalid(format!("{section}.model is required when backend=external")));
            }
        }
        if self.max_images > 8 {
            return Err(ConfigError::Invalid(format!("{section}.max_images must be <= 8")));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(format!("{section}.timeout_ms must be non-zero")));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!("{section}.temperature must be in 0.0..=2.0")));
        }
        Ok(())
    }
}

/// Circuit-breaker tuning shared by every adapter endpoint (TOML table
/// `circuit.*`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CircuitConfig {
    /// Consecutive failures within `window_ms` before the circuit opens.
    pub failures_threshold: u32,
    /// Cooldown duration once open, in milliseconds.
    pub cooldown_ms: u64,
    /// Sliding window over which failures are counted, in milliseconds.
    pub window_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failures_threshold: 2,
            cooldown_ms: 15_000,
            window_ms: 60_000,
        }
    }
}

impl CircuitConfig {
    /// Returns the cooldown as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Returns the sliding window as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Validates this circuit-breaker configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `failures_threshold` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failures_threshold == 0 {
            return Err(ConfigError::Invalid("circuit.failures_threshold must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Policy-pack loader configuration (TOML table `policy.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicyConfig {
    /// Filesystem path to a policy pack JSON document. When unset, the
    /// embedded default pack is used.
    pub pack_path: Option<String>,
    /// Maximum number of matching policies selected per request.
    pub top_k: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pack_path: None,
            top_k: 2,
        }
    }
}

impl PolicyConfig {
    /// Validates this policy configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `top_k` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("policy.top_k must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// PHI-guard toggle (TOML key `phi_guard.enabled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhiGuardConfig {
    /// When `true` (default), detected PHI blocks any external adapter
    /// call.
    pub enabled: bool,
}

impl Default for PhiGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
        }
    }
}

/// Per-request size and deadline limits (TOML table `request.*`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RequestConfig {
    /// Maximum accepted serialized intake size, in bytes.
    pub max_bytes: usize,
    /// Overall per-request deadline, in milliseconds.
    pub deadline_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024,
            deadline_ms: 5_000,
        }
    }
}

impl RequestConfig {
    /// Returns the overall per-request deadline as a [`Duration`].
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Validates this request configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `max_bytes` or `deadline_ms`
    /// is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid("request.max_bytes must be >= 1".to_string()));
        }
        if self.deadline_ms == 0 {
            return Err(ConfigError::Invalid("request.deadline_ms must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Intake Structuring catalog tuning; exposes the negation-window size as
/// a documented, overridable parameter rather than a hardcoded constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IntakeConfig {
    /// Number of words a negation cue (e.g. "no", "denies") suppresses a
    /// following symptom/risk-factor match over.
    pub negation_window: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            negation_window: 4,
        }
    }
}

impl IntakeConfig {
    /// Validates this intake configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `negation_window` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.negation_window == 0 {
            return Err(ConfigError::Invalid("intake.negation_window must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading the configuration file.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::default();
        config.validate().expect("default config is valid");
    }

    #[test]
    fn external_backend_requires_base_url_and_model() {
        let mut config = PipelineConfig::default();
        config.reasoning.backend = BackendKind::External;
        let err = config.validate().expect_err("missing base_url/model");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    #[allow(unsafe_code, reason = "env mutation is process-global")]
    fn env_override_sets_api_key_without_touching_toml() {
        let toml_text = "[reasoning]\nbackend = \"external\"\nbase_url = \"https://example.test\"\nmodel = \"m\"\n";
        // SAFETY: this test does not run concurrently with anything else that reads this var.
        unsafe {
            env::set_var(REASONING_API_KEY_ENV, "secret-key");
        }
        let config = PipelineConfig::from_toml_str(toml_text).expect("parses and validates");
        assert_eq!(config.reasoning.api_key.as_deref(), Some("secret-key"));
        // SAFETY: this test does not run concurrently with anything else that reads this var.
        unsafe {
            env::remove_var(REASONING_API_KEY_ENV);
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = PipelineConfig::from_toml_str("bogus = true\n").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
