//! Drives the reconciler: once per stack creation, and periodically over
//! every stack in the store.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use pulumi_cloud::ManagementApi;
use serde::Serialize;
use stackpolicy_core::config::ScheduleConfig;
use stackpolicy_core::{
    LifecyclePolicy, PolicyStore, Result, StackIdentity, StackSettingsArgs, Trigger,
};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::reconciler::{ReconcileReport, Reconciler};

/// Tally of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub total: usize,
    /// Every step applied, unchanged or skipped.
    pub reconciled: usize,
    /// Some steps failed.
    pub partial: usize,
    /// Every step failed.
    pub failed: usize,
    /// The pass did not run (invalid policy, store failure).
    pub errored: usize,
    pub reports: Vec<ReconcileReport>,
}

impl SweepSummary {
    fn record(&mut self, report: ReconcileReport) {
        if report.is_success() {
            self.reconciled += 1;
        } else if report.is_partial() {
            self.partial += 1;
        } else {
            self.failed += 1;
        }
        self.reports.push(report);
    }
}

pub struct Scheduler<A, S> {
    reconciler: Reconciler<A, S>,
    defaults: StackSettingsArgs,
    interval: Duration,
    max_parallel: usize,
}

impl<A: ManagementApi, S: PolicyStore> Scheduler<A, S> {
    /// `defaults` resolve the policy of stacks the store does not know yet.
    pub fn new(
        reconciler: Reconciler<A, S>,
        defaults: StackSettingsArgs,
        schedule: &ScheduleConfig,
    ) -> Self {
        Self {
            reconciler,
            defaults,
            interval: Duration::from_secs(schedule.interval_secs.max(1)),
            max_parallel: schedule.max_parallel.max(1),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<A, S> {
        &self.reconciler
    }

    /// Stored policy for `id`, or the configured defaults.
    pub fn policy_for(&self, id: &StackIdentity) -> Result<LifecyclePolicy> {
        match self.reconciler.store().get(id)? {
            Some(policy) => Ok(policy),
            None => Ok(self.defaults.resolve()),
        }
    }

    /// Full pass for a freshly created stack.
    pub async fn on_stack_created(&self, id: &StackIdentity) -> Result<ReconcileReport> {
        let policy = self.policy_for(id)?;
        self.reconciler.reconcile(id, &policy, Trigger::Created).await
    }

    /// Periodic pass over every stored stack, at most `max_parallel` at a
    /// time. A stack whose pass cannot run is counted and logged; the others
    /// still go ahead.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let ids = self.reconciler.store().list()?;
        info!(stacks = ids.len(), "sweep started");
        let permits = Semaphore::new(self.max_parallel);

        let passes = ids.iter().map(|id| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await;
                match self.policy_for(id) {
                    Ok(policy) => {
                        self.reconciler
                            .reconcile(id, &policy, Trigger::Periodic)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
        });
        let results = join_all(passes).await;

        let mut summary = SweepSummary {
            total: ids.len(),
            ..Default::default()
        };
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(report) => summary.record(report),
                Err(e) => {
                    error!(stack = %id, error = %e, "reconcile pass did not run");
                    summary.errored += 1;
                }
            }
        }

        info!(
            total = summary.total,
            reconciled = summary.reconciled,
            partial = summary.partial,
            failed = summary.failed,
            errored = summary.errored,
            "sweep finished"
        );
        Ok(summary)
    }

    /// Sweep on every tick until `shutdown` resolves. A sweep in flight when
    /// shutdown fires is dropped at its next await point.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            interval_secs = self.interval.as_secs(),
            max_parallel = self.max_parallel,
            "scheduler started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("shutdown during sweep; remaining passes abandoned");
                    break;
                }
                result = self.sweep() => {
                    if let Err(e) = result {
                        error!(error = %e, "sweep failed");
                    }
                }
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reconciler::fake::{template_settings, FakeApi};
    use crate::reconciler::{ReconcilerOptions, Step, StepOutcome};
    use stackpolicy_core::store::apply_settings;
    use stackpolicy_core::{AccessToken, MemoryPolicyStore};

    type TestScheduler = Scheduler<Arc<FakeApi>, Arc<MemoryPolicyStore>>;

    fn setup(max_parallel: usize) -> (Arc<FakeApi>, Arc<MemoryPolicyStore>, TestScheduler) {
        let api = Arc::new(FakeApi::with_template(
            "acme/widgets/dev",
            template_settings(),
        ));
        let store = Arc::new(MemoryPolicyStore::new());
        let reconciler = Reconciler::new(
            api.clone(),
            store.clone(),
            ReconcilerOptions::default(),
            AccessToken::Absent,
        );
        let schedule = ScheduleConfig {
            interval_secs: 3600,
            max_parallel,
        };
        let scheduler = Scheduler::new(reconciler, StackSettingsArgs::default(), &schedule);
        (api, store, scheduler)
    }

    fn id(s: &str) -> StackIdentity {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn created_stack_gets_defaults_and_is_persisted() {
        let (_api, store, scheduler) = setup(4);
        let target = id("acme/widgets/feature-x");
        let report = scheduler.on_stack_created(&target).await.unwrap();
        assert_eq!(report.trigger, Trigger::Created);
        assert!(report.is_success());

        let stored = store.get(&target).unwrap().unwrap();
        assert_eq!(stored.team, "DevTeam");
        assert!(stored.ttl_expiration.is_some());
        assert_eq!(store.list().unwrap(), vec![target]);
    }

    #[tokio::test]
    async fn created_stack_uses_stored_policy() {
        let (api, store, scheduler) = setup(4);
        let target = id("acme/widgets/feature-x");
        let args = StackSettingsArgs {
            team_assignment: Some("Platform".into()),
            ..Default::default()
        };
        apply_settings(store.as_ref(), &target, &args).unwrap();

        scheduler.on_stack_created(&target).await.unwrap();
        assert_eq!(
            api.state.lock().unwrap().permissions["acme/widgets/feature-x"].team,
            "Platform"
        );
    }

    #[tokio::test]
    async fn redelivered_creation_does_not_reset_ttl() {
        let (api, store, scheduler) = setup(4);
        api.state.lock().unwrap().ttl_latency = Some(Duration::from_millis(50));
        let target = id("acme/widgets/feature-x");

        let (first, second) = tokio::join!(
            scheduler.on_stack_created(&target),
            scheduler.on_stack_created(&target),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(
            api.calls().iter().filter(|c| c.starts_with("put_ttl")).count(),
            1
        );
        assert_eq!(first.ttl_timestamp, second.ttl_timestamp);
        let stored = store.get(&target).unwrap().unwrap();
        assert_eq!(
            stored.ttl_expiration.map(stackpolicy_core::ttl::format_timestamp),
            first.ttl_timestamp
        );
    }

    #[tokio::test]
    async fn sweep_after_create_only_resyncs_always_sync_fields() {
        let (api, _store, scheduler) = setup(2);
        for name in ["acme/widgets/a", "acme/widgets/b", "acme/widgets/c"] {
            scheduler.on_stack_created(&id(name)).await.unwrap();
        }
        let ttl_before = api.state.lock().unwrap().ttl.clone();

        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.reconciled, 3);
        assert_eq!(summary.errored, 0);
        for report in &summary.reports {
            assert_eq!(report.trigger, Trigger::Periodic);
            assert_eq!(report.outcome(Step::TtlSchedule), Some(&StepOutcome::Unchanged));
            assert_eq!(
                report.outcome(Step::DeploymentSettings),
                Some(&StepOutcome::Unchanged)
            );
            assert_eq!(report.outcome(Step::DriftSchedule), Some(&StepOutcome::Applied));
            assert_eq!(report.outcome(Step::TeamPermission), Some(&StepOutcome::Applied));
        }
        assert_eq!(api.state.lock().unwrap().ttl, ttl_before);
    }

    #[tokio::test]
    async fn invalid_policy_does_not_stop_other_stacks() {
        let (_api, store, scheduler) = setup(4);
        let good = id("acme/widgets/good");
        let bad = id("acme/widgets/bad");
        store.upsert(&good, &LifecyclePolicy::default()).unwrap();
        store
            .upsert(
                &bad,
                &LifecyclePolicy {
                    team: String::new(),
                    ..LifecyclePolicy::default()
                },
            )
            .unwrap();

        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.reports[0].identity, good);
    }

    #[tokio::test]
    async fn failed_settings_fetch_counts_as_partial() {
        let (api, store, scheduler) = setup(4);
        api.state
            .lock()
            .unwrap()
            .settings_unavailable
            .insert("acme/widgets/dev".into());
        store
            .upsert(&id("acme/widgets/feature-x"), &LifecyclePolicy::default())
            .unwrap();

        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.partial, 1);
        assert_eq!(summary.reconciled, 0);
    }

    #[tokio::test]
    async fn empty_store_sweeps_nothing() {
        let (api, _store, scheduler) = setup(4);
        let summary = scheduler.sweep().await.unwrap();
        assert_eq!(summary.total, 0);
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_until_shutdown() {
        let (api, store, scheduler) = setup(1);
        store
            .upsert(&id("acme/widgets/feature-x"), &LifecyclePolicy::default())
            .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let stopper = async move {
            // First tick fires immediately; let one more interval pass.
            tokio::time::sleep(Duration::from_secs(3600 + 30)).await;
            let _ = tx.send(());
        };
        let shutdown = async move {
            let _ = rx.await;
        };
        tokio::join!(scheduler.run(shutdown), stopper);

        let drift_writes = api
            .calls()
            .iter()
            .filter(|c| c.starts_with("put_drift"))
            .count();
        assert_eq!(drift_writes, 2);
    }
}
