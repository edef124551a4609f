use crate::output::{print_json, print_table};
use stackpolicy_core::AccessToken;
use stackpolicy_daemon::scheduler_from_config;
use std::path::Path;

pub fn run(config_path: &Path, token: AccessToken, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let scheduler = scheduler_from_config(&config, config_path, token)?;

    let summary = super::runtime()?.block_on(scheduler.sweep())?;

    if json {
        print_json(&summary)?;
    } else if summary.total == 0 {
        println!("No stacks in the policy store.");
    } else {
        let rows = summary
            .reports
            .iter()
            .map(|r| {
                let failed = r.failed_steps();
                let status = if failed.is_empty() {
                    "ok".to_string()
                } else {
                    format!(
                        "failed: {}",
                        failed
                            .iter()
                            .map(|s| s.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                vec![r.identity.to_string(), status]
            })
            .collect();
        print_table(&["STACK", "STATUS"], rows);
        println!(
            "\n{} stacks: {} reconciled, {} partial, {} failed, {} errored",
            summary.total, summary.reconciled, summary.partial, summary.failed, summary.errored
        );
    }

    let problems = summary.partial + summary.failed + summary.errored;
    if problems > 0 {
        anyhow::bail!("{problems} of {} stacks did not fully reconcile", summary.total);
    }
    Ok(())
}
