//! One reconciliation pass: bring the remote lifecycle resources of a stack
//! in line with its [`LifecyclePolicy`].
//!
//! Steps run strictly in order and each is isolated: a failing step is
//! recorded in the report and the pass moves on. Every write is a
//! full-document PUT, so re-running a pass converges.
//!
//! Passes for the same stack are serialized, and the ledger is saved after
//! every step that took effect. A pass dropped between steps leaves a ledger
//! that matches what the remote side has seen.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pulumi_cloud::{
    ApiError, DriftSchedule, ManagementApi, StackTag, TeamStackPermission, TtlSchedule,
};
use serde::Serialize;
use stackpolicy_core::config::Config;
use stackpolicy_core::policy::DELETE_TAG_NAME;
use stackpolicy_core::store::ReconcileLedger;
use stackpolicy_core::{
    ttl, AccessToken, FieldPolicies, LifecyclePolicy, PolicyError, PolicyStore, RemoteSnapshot,
    Result, StackIdentity, Trigger,
};
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    DeleteTag,
    TtlSchedule,
    DeploymentSettings,
    DriftSchedule,
    TeamPermission,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::DeleteTag => "delete_tag",
            Step::TtlSchedule => "ttl_schedule",
            Step::DeploymentSettings => "deployment_settings",
            Step::DriftSchedule => "drift_schedule",
            Step::TeamPermission => "team_permission",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Unchanged,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub pass_id: Uuid,
    pub identity: StackIdentity,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// TTL expiration in effect after the pass, if one has been applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_timestamp: Option<String>,
    pub steps: Vec<StepReport>,
}

impl ReconcileReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }

    pub fn failed_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
            .map(|s| s.step)
            .collect()
    }

    pub fn skipped_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Skipped { .. }))
            .map(|s| s.step)
            .collect()
    }

    /// No step failed. Skips do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failed_steps().is_empty()
    }

    /// Some steps failed while others went through.
    pub fn is_partial(&self) -> bool {
        let failed = self.failed_steps().len();
        failed > 0 && failed < self.steps.len()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Stack whose deployment settings are copied to new stacks.
    pub template_stack: String,
    /// Substring marking review stacks; `{org}` and `{project}` are substituted.
    pub review_stack_pattern: String,
    pub field_policies: FieldPolicies,
    /// Per-stack tokens from the config's `stacks` entries; they replace the
    /// reconciler-wide token in that stack's deployment settings.
    pub stack_tokens: HashMap<StackIdentity, AccessToken>,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReconcilerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            template_stack: config.template_stack.clone(),
            review_stack_pattern: config.review_stack_pattern.clone(),
            field_policies: config.field_policies,
            stack_tokens: config.stack_tokens(),
        }
    }
}

pub struct Reconciler<A, S> {
    api: A,
    store: S,
    options: ReconcilerOptions,
    token: AccessToken,
    passes: Mutex<HashMap<StackIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl<A: ManagementApi, S: PolicyStore> Reconciler<A, S> {
    /// `token` is merged into derived deployment settings; it is independent
    /// of whatever credential `api` authenticates with.
    pub fn new(api: A, store: S, options: ReconcilerOptions, token: AccessToken) -> Self {
        Self {
            api,
            store,
            options,
            token,
            passes: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Run all five steps for `id`.
    ///
    /// Only an invalid policy or a store failure is an error; remote failures
    /// are reported per step. The resolved policy (including the TTL
    /// expiration once applied) and the ledger are persisted after each step
    /// that took effect.
    pub async fn reconcile(
        &self,
        id: &StackIdentity,
        policy: &LifecyclePolicy,
        trigger: Trigger,
    ) -> Result<ReconcileReport> {
        policy.validate()?;
        let pass_lock = self.pass_lock(id)?;
        let _pass = pass_lock.lock().await;

        let mut policy = policy.clone();
        let mut ledger = self.store.ledger(id)?;
        if policy.ttl_expiration.is_none() {
            policy.ttl_expiration = ledger.ttl_timestamp;
        }
        let started_at = Utc::now();
        let pass_id = Uuid::new_v4();
        info!(stack = %id, %trigger, %pass_id, "reconcile pass started");

        let mut steps = Vec::with_capacity(5);
        let outcome = self.delete_tag(id, &policy, &mut ledger, trigger).await;
        steps.push(self.checkpoint(id, Step::DeleteTag, outcome, &policy, &ledger)?);
        let outcome = self.ttl_schedule(id, &mut policy, &mut ledger, trigger).await;
        steps.push(self.checkpoint(id, Step::TtlSchedule, outcome, &policy, &ledger)?);
        let outcome = self.deployment_settings(id, &mut ledger, trigger).await;
        steps.push(self.checkpoint(id, Step::DeploymentSettings, outcome, &policy, &ledger)?);
        let outcome = self.drift_schedule(id, &policy, &mut ledger, trigger).await;
        steps.push(self.checkpoint(id, Step::DriftSchedule, outcome, &policy, &ledger)?);
        let outcome = self.team_permission(id, &policy, &mut ledger, trigger).await;
        steps.push(self.checkpoint(id, Step::TeamPermission, outcome, &policy, &ledger)?);

        let finished_at = Utc::now();
        ledger.last_pass_at = Some(finished_at);
        ledger.last_trigger = Some(trigger);
        self.store.record_ledger(id, &ledger)?;
        self.store.upsert(id, &policy)?;

        let report = ReconcileReport {
            pass_id,
            identity: id.clone(),
            trigger,
            started_at,
            finished_at,
            ttl_timestamp: policy.ttl_expiration.map(ttl::format_timestamp),
            steps,
        };
        info!(
            stack = %id,
            %pass_id,
            failed = report.failed_steps().len(),
            skipped = report.skipped_steps().len(),
            "reconcile pass finished"
        );
        Ok(report)
    }

    fn pass_lock(&self, id: &StackIdentity) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut passes = self
            .passes
            .lock()
            .map_err(|_| PolicyError::Store("reconcile lock table poisoned".into()))?;
        Ok(passes.entry(id.clone()).or_default().clone())
    }

    /// Log the step and, when it took effect, persist the ledger and policy.
    fn checkpoint(
        &self,
        id: &StackIdentity,
        step: Step,
        outcome: StepOutcome,
        policy: &LifecyclePolicy,
        ledger: &ReconcileLedger,
    ) -> Result<StepReport> {
        if matches!(outcome, StepOutcome::Applied | StepOutcome::Unchanged) {
            self.store.record_ledger(id, ledger)?;
            self.store.upsert(id, policy)?;
        }
        Ok(record(id, step, outcome))
    }

    fn token_for(&self, id: &StackIdentity) -> &AccessToken {
        self.options.stack_tokens.get(id).unwrap_or(&self.token)
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn delete_tag(
        &self,
        id: &StackIdentity,
        policy: &LifecyclePolicy,
        ledger: &mut ReconcileLedger,
        trigger: Trigger,
    ) -> StepOutcome {
        let applied = ledger.delete_tag.is_some();
        if !self.options.field_policies.delete_tag.should_write(trigger, applied) {
            return StepOutcome::Unchanged;
        }
        // The first written value sticks; later policy edits do not retag.
        let value = ledger
            .delete_tag
            .clone()
            .unwrap_or_else(|| policy.delete_tag.clone());
        let tag = StackTag {
            name: DELETE_TAG_NAME.to_string(),
            value: value.clone(),
        };
        match self.api.set_stack_tag(id, &tag).await {
            Ok(()) => {
                ledger.delete_tag = Some(value);
                StepOutcome::Applied
            }
            Err(e) => from_api_error(e),
        }
    }

    async fn ttl_schedule(
        &self,
        id: &StackIdentity,
        policy: &mut LifecyclePolicy,
        ledger: &mut ReconcileLedger,
        trigger: Trigger,
    ) -> StepOutcome {
        let applied = ledger.ttl_timestamp.is_some();
        if !self.options.field_policies.ttl_schedule.should_write(trigger, applied) {
            return StepOutcome::Unchanged;
        }
        let expires = match policy.ttl_expiration.or(ledger.ttl_timestamp) {
            Some(ts) => ts,
            None => match ttl::expiration(Utc::now(), policy.ttl_minutes) {
                Ok(ts) => ts,
                Err(e) => {
                    return StepOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };
        let schedule = TtlSchedule {
            timestamp: ttl::format_timestamp(expires),
            delete_after_destroy: policy.delete_on_expire,
        };
        match self.api.put_ttl_schedule(id, &schedule).await {
            Ok(()) => {
                ledger.ttl_timestamp = Some(expires);
                policy.ttl_expiration = Some(expires);
                StepOutcome::Applied
            }
            Err(e) => from_api_error(e),
        }
    }

    async fn deployment_settings(
        &self,
        id: &StackIdentity,
        ledger: &mut ReconcileLedger,
        trigger: Trigger,
    ) -> StepOutcome {
        if id.is_review_stack(&self.options.review_stack_pattern) {
            return StepOutcome::Skipped {
                reason: "review stack".to_string(),
            };
        }
        let applied = ledger.deployment_settings_synced_at.is_some();
        if !self
            .options
            .field_policies
            .deployment_settings
            .should_write(trigger, applied)
        {
            return StepOutcome::Unchanged;
        }

        let template_id = match id.sibling(&self.options.template_stack) {
            Ok(t) => t,
            Err(e) => {
                return StepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        let template = match self.api.get_deployment_settings(&template_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                return StepOutcome::Skipped {
                    reason: format!("template stack {template_id} has no deployment settings"),
                }
            }
            Err(e) => return from_api_error(e),
        };
        let desired = template.derive_for(id, &self.options.template_stack, self.token_for(id));

        let current = match self.api.get_deployment_settings(id).await {
            Ok(current) => RemoteSnapshot::new(id.clone(), current),
            Err(e) => return from_api_error(e),
        };
        if current.matches(&desired) {
            ledger.deployment_settings_synced_at = Some(current.fetched_at);
            return StepOutcome::Unchanged;
        }

        match self.api.put_deployment_settings(id, &desired).await {
            Ok(()) => {
                ledger.deployment_settings_synced_at = Some(Utc::now());
                StepOutcome::Applied
            }
            Err(e) => from_api_error(e),
        }
    }

    async fn drift_schedule(
        &self,
        id: &StackIdentity,
        policy: &LifecyclePolicy,
        ledger: &mut ReconcileLedger,
        trigger: Trigger,
    ) -> StepOutcome {
        let applied = ledger.drift_schedule_synced_at.is_some();
        if !self.options.field_policies.drift_schedule.should_write(trigger, applied) {
            return StepOutcome::Unchanged;
        }
        let schedule = DriftSchedule::hourly(policy.drift_mode.auto_remediate());
        match self.api.put_drift_schedule(id, &schedule).await {
            Ok(()) => {
                ledger.drift_schedule_synced_at = Some(Utc::now());
                StepOutcome::Applied
            }
            Err(e) => from_api_error(e),
        }
    }

    async fn team_permission(
        &self,
        id: &StackIdentity,
        policy: &LifecyclePolicy,
        ledger: &mut ReconcileLedger,
        trigger: Trigger,
    ) -> StepOutcome {
        let applied = ledger.team_permission_synced_at.is_some();
        if !self.options.field_policies.team_permission.should_write(trigger, applied) {
            return StepOutcome::Unchanged;
        }
        let grant = TeamStackPermission::admin(policy.team.clone());
        match self.api.grant_team_permission(id, &grant).await {
            Ok(()) => {
                ledger.team_permission_synced_at = Some(Utc::now());
                StepOutcome::Applied
            }
            Err(e) => from_api_error(e),
        }
    }
}

/// Auth failures are a flagged skip; everything else that survived the
/// client's retries fails the step.
fn from_api_error(e: ApiError) -> StepOutcome {
    if e.is_auth() {
        StepOutcome::Skipped {
            reason: e.to_string(),
        }
    } else {
        StepOutcome::Failed {
            error: e.to_string(),
        }
    }
}

fn record(id: &StackIdentity, step: Step, outcome: StepOutcome) -> StepReport {
    match &outcome {
        StepOutcome::Applied => info!(stack = %id, %step, "applied"),
        StepOutcome::Unchanged => {}
        StepOutcome::Skipped { reason } => warn!(stack = %id, %step, %reason, "step skipped"),
        StepOutcome::Failed { error } => warn!(stack = %id, %step, %error, "step failed"),
    }
    StepReport { step, outcome }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
