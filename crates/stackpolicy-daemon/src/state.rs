use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use pulumi_cloud::ManagementClient;
use stackpolicy_core::config::Config;
use stackpolicy_core::store::apply_settings;
use stackpolicy_core::{paths, AccessToken, PolicyStore, RedbPolicyStore};

use crate::reconciler::{Reconciler, ReconcilerOptions};
use crate::scheduler::Scheduler;

pub type DaemonScheduler = Scheduler<ManagementClient, Arc<dyn PolicyStore>>;

/// Build the production scheduler from configuration: redb store, HTTPS
/// client and the config-listed stacks registered in the store.
///
/// `token` (CLI flag or environment) wins over `defaults.pulumiAccessToken`.
pub fn scheduler_from_config(
    config: &Config,
    config_path: &Path,
    token: AccessToken,
) -> anyhow::Result<DaemonScheduler> {
    let token = token.or(config.defaults.access_token());
    let store_path = paths::resolve_store_path(config_path, &config.store_path);
    let store: Arc<dyn PolicyStore> = Arc::new(
        RedbPolicyStore::open(&store_path)
            .with_context(|| format!("cannot open policy store {}", store_path.display()))?,
    );

    for (id, args) in config.managed_stacks()? {
        apply_settings(store.as_ref(), &id, &args)
            .with_context(|| format!("invalid settings for stack {id}"))?;
    }

    let client = ManagementClient::from_config(&config.api, token.clone())?;
    let reconciler = Reconciler::new(
        client,
        store,
        ReconcilerOptions::from_config(config),
        token,
    );
    Ok(Scheduler::new(
        reconciler,
        config.defaults.clone(),
        &config.schedule,
    ))
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<DaemonScheduler>,
    /// When set, webhook deliveries must carry a valid signature.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(scheduler: DaemonScheduler, webhook_secret: Option<String>) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn from_config(
        config: &Config,
        config_path: &Path,
        token: AccessToken,
    ) -> anyhow::Result<Self> {
        let scheduler = scheduler_from_config(config, config_path, token)?;
        Ok(Self::new(scheduler, config.webhook.secret.clone()))
    }

    pub fn store(&self) -> &dyn PolicyStore {
        self.scheduler.reconciler().store().as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackpolicy_core::config::ManagedStack;
    use stackpolicy_core::StackSettingsArgs;
    use tempfile::TempDir;

    #[test]
    fn from_config_registers_listed_stacks() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("stackpolicy.yaml");
        let config = Config {
            stacks: vec![ManagedStack {
                stack: "acme/widgets/staging".into(),
                settings: StackSettingsArgs {
                    team_assignment: Some("Platform".into()),
                    ..Default::default()
                },
            }],
            ..Config::default()
        };

        let state = AppState::from_config(&config, &config_path, AccessToken::Absent).unwrap();
        let id = "acme/widgets/staging".parse().unwrap();
        let policy = state.store().get(&id).unwrap().unwrap();
        assert_eq!(policy.team, "Platform");
        assert!(dir.path().join(".stackpolicy/policies.db").exists());
    }

    #[test]
    fn empty_webhook_secret_is_treated_as_unset() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.webhook.secret = Some(String::new());
        let state =
            AppState::from_config(&config, &dir.path().join("stackpolicy.yaml"), AccessToken::Absent)
                .unwrap();
        assert!(state.webhook_secret.is_none());
    }
}
