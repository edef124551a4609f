use anyhow::Context;
use stackpolicy_core::config::Config;
use std::path::Path;

pub fn run(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        println!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
        return Ok(());
    }
    Config::default()
        .save(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
