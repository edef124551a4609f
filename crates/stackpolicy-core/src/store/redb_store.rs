//! Persistent policy store backed by redb.
//!
//! # Table design
//!
//! Two tables keyed by the identity's `org/project/stack` string:
//! ```text
//! policies: identity -> JSON LifecyclePolicy
//! ledgers:  identity -> JSON ReconcileLedger
//! ```
//!
//! redb serializes write transactions, so concurrent upserts for different
//! identities never interleave within a record.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{PolicyError, Result};
use crate::identity::StackIdentity;
use crate::policy::LifecyclePolicy;

use super::{PolicyStore, ReconcileLedger};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");
const LEDGERS: TableDefinition<&str, &[u8]> = TableDefinition::new("ledgers");

fn store_err(e: impl std::fmt::Display) -> PolicyError {
    PolicyError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbPolicyStore
// ---------------------------------------------------------------------------

pub struct RedbPolicyStore {
    db: Database,
}

impl RedbPolicyStore {
    /// Open or create the database at `path`, creating parent directories
    /// and both tables if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(POLICIES).map_err(store_err)?;
        wt.open_table(LEDGERS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn read_value<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(table).map_err(store_err)?;
        let Some(v) = t.get(key).map_err(store_err)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(v.value())?))
    }

    fn write_value<T: serde::Serialize>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut t = wt.open_table(table).map_err(store_err)?;
            t.insert(key, bytes.as_slice()).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

impl PolicyStore for RedbPolicyStore {
    fn get(&self, id: &StackIdentity) -> Result<Option<LifecyclePolicy>> {
        self.read_value(POLICIES, &id.to_string())
    }

    fn upsert(&self, id: &StackIdentity, policy: &LifecyclePolicy) -> Result<()> {
        tracing::debug!(stack = %id, "upsert policy");
        self.write_value(POLICIES, &id.to_string(), policy)
    }

    fn list(&self) -> Result<Vec<StackIdentity>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let t = rt.open_table(POLICIES).map_err(store_err)?;
        let mut ids = Vec::new();
        for entry in t.iter().map_err(store_err)? {
            let (k, _) = entry.map_err(store_err)?;
            ids.push(k.value().parse()?);
        }
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, id: &StackIdentity) -> Result<bool> {
        let key = id.to_string();
        let wt = self.db.begin_write().map_err(store_err)?;
        let existed = {
            let mut policies = wt.open_table(POLICIES).map_err(store_err)?;
            let existed = policies.remove(key.as_str()).map_err(store_err)?.is_some();
            let mut ledgers = wt.open_table(LEDGERS).map_err(store_err)?;
            ledgers.remove(key.as_str()).map_err(store_err)?;
            existed
        };
        wt.commit().map_err(store_err)?;
        Ok(existed)
    }

    fn ledger(&self, id: &StackIdentity) -> Result<ReconcileLedger> {
        Ok(self
            .read_value(LEDGERS, &id.to_string())?
            .unwrap_or_default())
    }

    fn record_ledger(&self, id: &StackIdentity, ledger: &ReconcileLedger) -> Result<()> {
        self.write_value(LEDGERS, &id.to_string(), ledger)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
