//! Policy Store: desired lifecycle policy per stack, plus the ledger of
//! set-once fields the reconciler has already written.
//!
//! Exactly one policy exists per [`StackIdentity`]; `upsert` replaces it.
//! Implementations must tolerate concurrent readers and writers but never
//! need cross-key transactions.

pub mod memory;
pub mod redb_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::StackIdentity;
use crate::policy::{LifecyclePolicy, StackSettingsArgs, Trigger};

pub use memory::MemoryPolicyStore;
pub use redb_store::RedbPolicyStore;

// ---------------------------------------------------------------------------
// ReconcileLedger
// ---------------------------------------------------------------------------

/// Record of what has already been written for a stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileLedger {
    /// Delete-tag value as first written; re-asserted on later passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_settings_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_schedule_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_permission_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pass_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger: Option<Trigger>,
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

pub trait PolicyStore: Send + Sync {
    /// `None` is the normal not-found result.
    fn get(&self, id: &StackIdentity) -> Result<Option<LifecyclePolicy>>;

    fn upsert(&self, id: &StackIdentity, policy: &LifecyclePolicy) -> Result<()>;

    /// All known identities, sorted.
    fn list(&self) -> Result<Vec<StackIdentity>>;

    /// Removes the policy and its ledger. Returns whether a policy existed.
    fn remove(&self, id: &StackIdentity) -> Result<bool>;

    /// Ledger for `id`; empty when nothing was recorded yet.
    fn ledger(&self, id: &StackIdentity) -> Result<ReconcileLedger>;

    fn record_ledger(&self, id: &StackIdentity, ledger: &ReconcileLedger) -> Result<()>;
}

impl<S: PolicyStore + ?Sized> PolicyStore for std::sync::Arc<S> {
    fn get(&self, id: &StackIdentity) -> Result<Option<LifecyclePolicy>> {
        (**self).get(id)
    }

    fn upsert(&self, id: &StackIdentity, policy: &LifecyclePolicy) -> Result<()> {
        (**self).upsert(id, policy)
    }

    fn list(&self) -> Result<Vec<StackIdentity>> {
        (**self).list()
    }

    fn remove(&self, id: &StackIdentity) -> Result<bool> {
        (**self).remove(id)
    }

    fn ledger(&self, id: &StackIdentity) -> Result<ReconcileLedger> {
        (**self).ledger(id)
    }

    fn record_ledger(&self, id: &StackIdentity, ledger: &ReconcileLedger) -> Result<()> {
        (**self).record_ledger(id, ledger)
    }
}

/// Create or update the policy for `id` from stack options.
///
/// An existing policy keeps its derived TTL expiration; the ledger is not
/// touched.
pub fn apply_settings<S: PolicyStore + ?Sized>(
    store: &S,
    id: &StackIdentity,
    args: &StackSettingsArgs,
) -> Result<LifecyclePolicy> {
    let policy = match store.get(id)? {
        Some(existing) => existing.updated_from(args),
        None => args.resolve(),
    };
    policy.validate()?;
    store.upsert(id, &policy)?;
    Ok(policy)
}
