use stackpolicy_core::config::WarnLevel;
use stackpolicy_core::AccessToken;
use stackpolicy_daemon::AppState;
use std::path::Path;

pub fn run(config_path: &Path, port: Option<u16>, token: AccessToken) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let warnings = config.validate();
    for w in &warnings {
        tracing::warn!("config: {}", w.message);
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("refusing to start with an invalid configuration");
    }
    let port = port.unwrap_or(config.webhook.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::from_config(&config, config_path, token)?;
        stackpolicy_daemon::serve(state, port).await
    })
}
