use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{PolicyError, Result};
use crate::identity::StackIdentity;
use crate::policy::LifecyclePolicy;

use super::{PolicyStore, ReconcileLedger};

#[derive(Default)]
struct Records {
    policies: BTreeMap<StackIdentity, LifecyclePolicy>,
    ledgers: BTreeMap<StackIdentity, ReconcileLedger>,
}

/// Process-local store, used for one-shot CLI runs and tests.
#[derive(Default)]
pub struct MemoryPolicyStore {
    inner: RwLock<Records>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> PolicyError {
    PolicyError::Store("memory store lock poisoned".into())
}

impl PolicyStore for MemoryPolicyStore {
    fn get(&self, id: &StackIdentity) -> Result<Option<LifecyclePolicy>> {
        let r = self.inner.read().map_err(poisoned)?;
        Ok(r.policies.get(id).cloned())
    }

    fn upsert(&self, id: &StackIdentity, policy: &LifecyclePolicy) -> Result<()> {
        let mut w = self.inner.write().map_err(poisoned)?;
        w.policies.insert(id.clone(), policy.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<StackIdentity>> {
        let r = self.inner.read().map_err(poisoned)?;
        Ok(r.policies.keys().cloned().collect())
    }

    fn remove(&self, id: &StackIdentity) -> Result<bool> {
        let mut w = self.inner.write().map_err(poisoned)?;
        w.ledgers.remove(id);
        Ok(w.policies.remove(id).is_some())
    }

    fn ledger(&self, id: &StackIdentity) -> Result<ReconcileLedger> {
        let r = self.inner.read().map_err(poisoned)?;
        Ok(r.ledgers.get(id).cloned().unwrap_or_default())
    }

    fn record_ledger(&self, id: &StackIdentity, ledger: &ReconcileLedger) -> Result<()> {
        let mut w = self.inner.write().map_err(poisoned)?;
        w.ledgers.insert(id.clone(), ledger.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> StackIdentity {
        s.parse().unwrap()
    }

    #[test]
    fn get_missing_is_none() {
        let store = MemoryPolicyStore::new();
        assert!(store.get(&id("acme/widgets/dev")).unwrap().is_none());
        assert_eq!(
            store.ledger(&id("acme/widgets/dev")).unwrap(),
            ReconcileLedger::default()
        );
    }

    #[test]
    fn upsert_replaces_single_policy() {
        let store = MemoryPolicyStore::new();
        let key = id("acme/widgets/dev");
        store.upsert(&key, &LifecyclePolicy::default()).unwrap();
        let updated = LifecyclePolicy {
            team: "Platform".into(),
            ..Default::default()
        };
        store.upsert(&key, &updated).unwrap();
        assert_eq!(store.list().unwrap(), vec![key.clone()]);
        assert_eq!(store.get(&key).unwrap().unwrap().team, "Platform");
    }

    #[test]
    fn remove_drops_policy_and_ledger() {
        let store = MemoryPolicyStore::new();
        let key = id("acme/widgets/dev");
        store.upsert(&key, &LifecyclePolicy::default()).unwrap();
        store
            .record_ledger(
                &key,
                &ReconcileLedger {
                    delete_tag: Some("True".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.remove(&key).unwrap());
        assert!(!store.remove(&key).unwrap());
        assert!(store.ledger(&key).unwrap().delete_tag.is_none());
    }

    #[test]
    fn concurrent_upserts_keep_per_key_records() {
        let store = Arc::new(MemoryPolicyStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let key = id(&format!("acme/widgets/stack-{i}"));
                    for n in 1..=50u32 {
                        let p = LifecyclePolicy {
                            ttl_minutes: n,
                            team: format!("team-{i}"),
                            ..Default::default()
                        };
                        store.upsert(&key, &p).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.list().unwrap().len(), 8);
        for i in 0..8 {
            let p = store
                .get(&id(&format!("acme/widgets/stack-{i}")))
                .unwrap()
                .unwrap();
            assert_eq!(p.ttl_minutes, 50);
            assert_eq!(p.team, format!("team-{i}"));
        }
    }
}
