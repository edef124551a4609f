use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::credential::AccessToken;
use crate::error::{PolicyError, Result};
use crate::ttl::DEFAULT_TTL_MINUTES;

pub const DEFAULT_TEAM: &str = "DevTeam";
pub const DEFAULT_DELETE_TAG: &str = "True";
pub const DELETE_TAG_NAME: &str = "delete_stack";
pub const DRIFT_CORRECT: &str = "Correct";

// ---------------------------------------------------------------------------
// DriftMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftMode {
    DetectOnly,
    DetectAndRemediate,
}

impl DriftMode {
    /// `driftManagement` option: absent or `"Correct"` remediates, anything
    /// else only detects.
    pub fn from_drift_management(value: Option<&str>) -> Self {
        match value {
            None | Some(DRIFT_CORRECT) => Self::DetectAndRemediate,
            Some(_) => Self::DetectOnly,
        }
    }

    pub fn auto_remediate(self) -> bool {
        matches!(self, Self::DetectAndRemediate)
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// What started a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The stack was just created (webhook, CLI one-shot, manual API call).
    Created,
    /// Scheduled sweep over every known stack.
    Periodic,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Created => "created",
            Trigger::Periodic => "periodic",
        })
    }
}

// ---------------------------------------------------------------------------
// FieldUpdatePolicy
// ---------------------------------------------------------------------------

/// How a managed remote field behaves once it has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUpdatePolicy {
    /// Written on every pass.
    AlwaysSync,
    /// Written until applied once, then left alone.
    SetOnceOnly,
    /// Written only on creation-triggered passes.
    NeverAfterCreate,
}

impl FieldUpdatePolicy {
    pub fn should_write(self, trigger: Trigger, already_applied: bool) -> bool {
        match self {
            Self::AlwaysSync => true,
            Self::SetOnceOnly => !already_applied,
            Self::NeverAfterCreate => trigger == Trigger::Created,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPolicies {
    #[serde(default = "always")]
    pub delete_tag: FieldUpdatePolicy,
    #[serde(default = "set_once")]
    pub ttl_schedule: FieldUpdatePolicy,
    #[serde(default = "set_once")]
    pub deployment_settings: FieldUpdatePolicy,
    #[serde(default = "always")]
    pub drift_schedule: FieldUpdatePolicy,
    #[serde(default = "always")]
    pub team_permission: FieldUpdatePolicy,
}

fn set_once() -> FieldUpdatePolicy {
    FieldUpdatePolicy::SetOnceOnly
}

fn always() -> FieldUpdatePolicy {
    FieldUpdatePolicy::AlwaysSync
}

impl Default for FieldPolicies {
    fn default() -> Self {
        Self {
            delete_tag: always(),
            ttl_schedule: set_once(),
            deployment_settings: set_once(),
            drift_schedule: always(),
            team_permission: always(),
        }
    }
}

// ---------------------------------------------------------------------------
// StackSettingsArgs
// ---------------------------------------------------------------------------

/// User-facing stack options, named as they appear in configuration.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSettingsArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_management: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_assignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_destroy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulumi_access_token: Option<String>,
}

impl fmt::Debug for StackSettingsArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackSettingsArgs")
            .field("ttl_minutes", &self.ttl_minutes)
            .field("drift_management", &self.drift_management)
            .field("delete_stack", &self.delete_stack)
            .field("team_assignment", &self.team_assignment)
            .field("delete_after_destroy", &self.delete_after_destroy)
            .field("pulumi_access_token", &self.access_token())
            .finish()
    }
}

impl StackSettingsArgs {
    /// Overlay `self` on top of `base`; fields set in `self` win.
    pub fn merged_over(&self, base: &StackSettingsArgs) -> StackSettingsArgs {
        StackSettingsArgs {
            ttl_minutes: self.ttl_minutes.or(base.ttl_minutes),
            drift_management: self
                .drift_management
                .clone()
                .or_else(|| base.drift_management.clone()),
            delete_stack: self.delete_stack.clone().or_else(|| base.delete_stack.clone()),
            team_assignment: self
                .team_assignment
                .clone()
                .or_else(|| base.team_assignment.clone()),
            delete_after_destroy: self.delete_after_destroy.or(base.delete_after_destroy),
            pulumi_access_token: self
                .pulumi_access_token
                .clone()
                .or_else(|| base.pulumi_access_token.clone()),
        }
    }

    pub fn access_token(&self) -> AccessToken {
        AccessToken::from_option(self.pulumi_access_token.clone())
    }

    /// Resolve options into a policy, applying defaults for anything unset.
    pub fn resolve(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            ttl_minutes: self.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES),
            ttl_expiration: None,
            drift_mode: DriftMode::from_drift_management(self.drift_management.as_deref()),
            team: self
                .team_assignment
                .clone()
                .unwrap_or_else(|| DEFAULT_TEAM.to_string()),
            delete_tag: self
                .delete_stack
                .clone()
                .unwrap_or_else(|| DEFAULT_DELETE_TAG.to_string()),
            delete_on_expire: self.delete_after_destroy.unwrap_or(false),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecyclePolicy
// ---------------------------------------------------------------------------

/// Desired lifecycle policy for one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub ttl_minutes: u32,
    /// Set once by the first successful TTL write, then kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_expiration: Option<DateTime<Utc>>,
    pub drift_mode: DriftMode,
    pub team: String,
    pub delete_tag: String,
    /// Sent as the TTL schedule's `deleteAfterDestroy` flag.
    #[serde(default)]
    pub delete_on_expire: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        StackSettingsArgs::default().resolve()
    }
}

impl LifecyclePolicy {
    pub fn validate(&self) -> Result<()> {
        if self.ttl_minutes == 0 {
            return Err(PolicyError::Config("ttlMinutes must be greater than zero".into()));
        }
        if self.team.trim().is_empty() {
            return Err(PolicyError::Config("teamAssignment must not be empty".into()));
        }
        if self.delete_tag.trim().is_empty() {
            return Err(PolicyError::Config("deleteStack must not be empty".into()));
        }
        Ok(())
    }

    /// Apply a policy update from new options, keeping the derived
    /// expiration timestamp.
    pub fn updated_from(&self, args: &StackSettingsArgs) -> LifecyclePolicy {
        LifecyclePolicy {
            ttl_expiration: self.ttl_expiration,
            ..args.resolve()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
