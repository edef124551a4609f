use crate::output::{print_json, print_table};
use stackpolicy_core::{AccessToken, StackIdentity};
use stackpolicy_daemon::{scheduler_from_config, ReconcileReport, StepOutcome};
use std::path::Path;

pub fn run(config_path: &Path, stack: &str, token: AccessToken, json: bool) -> anyhow::Result<()> {
    let id: StackIdentity = stack.parse()?;
    let config = super::load_config(config_path)?;
    let scheduler = scheduler_from_config(&config, config_path, token)?;

    let report = super::runtime()?.block_on(scheduler.on_stack_created(&id))?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    let failed = report.failed_steps();
    if !failed.is_empty() {
        anyhow::bail!("{} of {} steps failed for {id}", failed.len(), report.steps.len());
    }
    Ok(())
}

pub(crate) fn print_report(report: &ReconcileReport) {
    println!(
        "{} ({} pass {})",
        report.identity, report.trigger, report.pass_id
    );
    let rows = report
        .steps
        .iter()
        .map(|s| {
            let (outcome, detail) = match &s.outcome {
                StepOutcome::Applied => ("applied", String::new()),
                StepOutcome::Unchanged => ("unchanged", String::new()),
                StepOutcome::Skipped { reason } => ("skipped", reason.clone()),
                StepOutcome::Failed { error } => ("failed", error.clone()),
            };
            vec![s.step.to_string(), outcome.to_string(), detail]
        })
        .collect();
    print_table(&["STEP", "OUTCOME", "DETAIL"], rows);
    if let Some(ts) = &report.ttl_timestamp {
        println!("expires: {ts}");
    }
}
