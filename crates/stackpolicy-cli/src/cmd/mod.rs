pub mod config;
pub mod init;
pub mod policy;
pub mod reconcile;
pub mod serve;
pub mod sweep;
pub mod ttl;

use anyhow::Context;
use stackpolicy_core::config::Config;
use stackpolicy_core::{paths, RedbPolicyStore};
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_or_default(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

pub(crate) fn open_store(config_path: &Path, config: &Config) -> anyhow::Result<RedbPolicyStore> {
    let store_path = paths::resolve_store_path(config_path, &config.store_path);
    RedbPolicyStore::open(&store_path)
        .with_context(|| format!("cannot open policy store {}", store_path.display()))
}

/// Current-thread runtime for one-shot async commands.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
