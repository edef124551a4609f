use crate::credential::AccessToken;
use crate::error::{PolicyError, Result};
use crate::identity::StackIdentity;
use crate::paths;
use crate::policy::{FieldPolicies, StackSettingsArgs};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_base_url() -> String {
    "https://api.pulumi.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_max_parallel() -> usize {
    4
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_parallel: default_max_parallel(),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for `Pulumi-Webhook-Signature` verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_port() -> u16 {
    8787
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            secret: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ManagedStack
// ---------------------------------------------------------------------------

/// A stack listed in the config file, with per-stack option overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedStack {
    /// `org/project/stack`; kept raw so `validate` can report bad entries.
    pub stack: String,
    #[serde(default)]
    pub settings: StackSettingsArgs,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub api: ApiConfig,
    /// Stack whose deployment settings new stacks are derived from.
    #[serde(default = "default_template_stack")]
    pub template_stack: String,
    #[serde(default = "default_review_pattern")]
    pub review_stack_pattern: String,
    #[serde(default = "paths::default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub field_policies: FieldPolicies,
    #[serde(default)]
    pub defaults: StackSettingsArgs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<ManagedStack>,
}

fn default_version() -> u32 {
    1
}

fn default_template_stack() -> String {
    "dev".to_string()
}

fn default_review_pattern() -> String {
    "pr-{org}-{project}".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            api: ApiConfig::default(),
            template_stack: default_template_stack(),
            review_stack_pattern: default_review_pattern(),
            store_path: paths::default_store_path(),
            schedule: ScheduleConfig::default(),
            webhook: WebhookConfig::default(),
            field_policies: FieldPolicies::default(),
            defaults: StackSettingsArgs::default(),
            stacks: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PolicyError::NotInitialized(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(PolicyError::NotInitialized(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Config-listed stacks with defaults applied underneath their overrides.
    pub fn managed_stacks(&self) -> Result<Vec<(StackIdentity, StackSettingsArgs)>> {
        self.stacks
            .iter()
            .map(|m| Ok((m.stack.parse::<StackIdentity>()?, m.settings.merged_over(&self.defaults))))
            .collect()
    }

    /// Options for `id`: its config entry merged over defaults, or just the
    /// defaults for stacks not listed in the file.
    pub fn settings_for(&self, id: &StackIdentity) -> StackSettingsArgs {
        self.stacks
            .iter()
            .find(|m| m.stack.parse::<StackIdentity>().ok().as_ref() == Some(id))
            .map(|m| m.settings.merged_over(&self.defaults))
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Tokens set on individual `stacks` entries. Entries that only inherit
    /// `defaults.pulumiAccessToken` are not listed.
    pub fn stack_tokens(&self) -> HashMap<StackIdentity, AccessToken> {
        self.stacks
            .iter()
            .filter_map(|m| {
                let id = m.stack.parse::<StackIdentity>().ok()?;
                match m.settings.access_token() {
                    AccessToken::Absent => None,
                    token => Some((id, token)),
                }
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.api.max_attempts == 0 {
            warnings.push(ConfigWarning::error(
                "api.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.api.timeout_secs == 0 {
            warnings.push(ConfigWarning::error(
                "api.timeout_secs must be at least 1".to_string(),
            ));
        }

        if !self.review_stack_pattern.contains("{org}")
            || !self.review_stack_pattern.contains("{project}")
        {
            warnings.push(ConfigWarning::warning(format!(
                "review_stack_pattern '{}' has no {{org}}/{{project}} placeholder; \
                 review stacks of other projects may match",
                self.review_stack_pattern
            )));
        }

        if self.schedule.interval_secs < 60 {
            warnings.push(ConfigWarning::warning(format!(
                "schedule.interval_secs={} is shorter than a minute",
                self.schedule.interval_secs
            )));
        }
        if self.schedule.max_parallel == 0 {
            warnings.push(ConfigWarning::error(
                "schedule.max_parallel must be at least 1".to_string(),
            ));
        }

        if self.webhook.secret.is_none() {
            warnings.push(ConfigWarning::warning(
                "webhook.secret is not set; webhook signatures will not be verified".to_string(),
            ));
        }

        if self.defaults.ttl_minutes == Some(0) {
            warnings.push(ConfigWarning::error(
                "defaults.ttlMinutes must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.stacks {
            match entry.stack.parse::<StackIdentity>() {
                Ok(id) => {
                    if !seen.insert(id.clone()) {
                        warnings.push(ConfigWarning::error(format!(
                            "stack '{id}' is listed more than once"
                        )));
                    }
                }
                Err(e) => warnings.push(ConfigWarning::error(e.to_string())),
            }
            if entry.settings.ttl_minutes == Some(0) {
                warnings.push(ConfigWarning::error(format!(
                    "stack '{}' has ttlMinutes=0",
                    entry.stack
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
