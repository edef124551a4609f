//! Deployment settings documents as exchanged with the management API.
//!
//! Unknown keys are carried through `extra` maps so a full-document replace
//! never drops settings this crate does not model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::credential::AccessToken;
use crate::identity::StackIdentity;

pub const ACCESS_TOKEN_ENV: &str = "PULUMI_ACCESS_TOKEN";

// ---------------------------------------------------------------------------
// EnvValue
// ---------------------------------------------------------------------------

/// An environment variable value; secrets are wrapped as `{"secret": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Plain(String),
    Secret { secret: String },
    Ciphertext { ciphertext: String },
}

impl EnvValue {
    pub fn secret(value: impl Into<String>) -> Self {
        Self::Secret {
            secret: value.into(),
        }
    }

    pub fn is_secret(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Display form; secret material is never shown.
    pub fn redacted(&self) -> String {
        match self {
            Self::Plain(v) => v.clone(),
            Self::Secret { .. } | Self::Ciphertext { .. } => "[secret]".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment_variables: BTreeMap<String, EnvValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubSettings {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub deploy_commits: bool,
    #[serde(default)]
    pub preview_pull_requests: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_pull_request: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_template: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    pub enable: bool,
}

/// Full deployment settings document for one stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSettings {
    #[serde(default)]
    pub operation_context: OperationContext,
    #[serde(default)]
    pub source_context: SourceContext,
    #[serde(rename = "gitHub", default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_options: Option<CacheOptions>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DeploymentSettings {
    /// Settings for `target`, derived from the template stack's settings.
    ///
    /// - a stack other than the template deploys from `refs/heads/<stack>`
    /// - a present access token is merged in as a secret env var, overriding
    ///   any template value under the same name
    /// - deployment caching is always enabled
    pub fn derive_for(
        &self,
        target: &StackIdentity,
        template_stack: &str,
        token: &AccessToken,
    ) -> DeploymentSettings {
        let mut derived = self.clone();
        if target.stack() != template_stack {
            if let Some(git) = derived.source_context.git.as_mut() {
                git.branch = Some(format!("refs/heads/{}", target.stack()));
            }
        }
        if let Some(t) = token.as_deref() {
            derived
                .operation_context
                .environment_variables
                .insert(ACCESS_TOKEN_ENV.to_string(), EnvValue::secret(t));
        }
        derived.cache_options = Some(CacheOptions { enable: true });
        derived
    }

    pub fn source_settings(&self) -> DeploymentSourceSettings {
        let git = self.source_context.git.as_ref();
        DeploymentSourceSettings {
            branch: git.and_then(|g| g.branch.clone()),
            repo_path: git.and_then(|g| g.repo_dir.clone()),
            cache_enabled: self.cache_options.map(|c| c.enable).unwrap_or(false),
            env_vars: self
                .operation_context
                .environment_variables
                .iter()
                .map(|(k, v)| (k.clone(), v.redacted()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Flattened, display-safe view of the source half of a settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSourceSettings {
    pub branch: Option<String>,
    pub repo_path: Option<String>,
    pub cache_enabled: bool,
    pub env_vars: BTreeMap<String, String>,
}

/// What the management API reported for a stack at `fetched_at`.
///
/// Only lives for the duration of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    pub identity: StackIdentity,
    pub fetched_at: DateTime<Utc>,
    pub deployment_settings: Option<DeploymentSettings>,
}

impl RemoteSnapshot {
    pub fn new(identity: StackIdentity, deployment_settings: Option<DeploymentSettings>) -> Self {
        Self {
            identity,
            fetched_at: Utc::now(),
            deployment_settings,
        }
    }

    /// Secret env values come back from the API encrypted, so they only
    /// compare by name.
    pub fn matches(&self, desired: &DeploymentSettings) -> bool {
        self.deployment_settings
            .as_ref()
            .is_some_and(|current| without_secret_values(current) == without_secret_values(desired))
    }
}

fn without_secret_values(settings: &DeploymentSettings) -> DeploymentSettings {
    let mut settings = settings.clone();
    for value in settings.operation_context.environment_variables.values_mut() {
        if value.is_secret() {
            *value = EnvValue::secret("");
        }
    }
    settings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
