use crate::output::{print_json, print_table};
use clap::Subcommand;
use stackpolicy_core::store::apply_settings;
use stackpolicy_core::{ttl, PolicyStore, StackIdentity, StackSettingsArgs};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum PolicySubcommand {
    /// Create or update a stack's policy; unset options come from config
    Set {
        /// Stack as <organization>/<project>/<stack>
        stack: String,
        /// Minutes until the stack expires
        #[arg(long)]
        ttl_minutes: Option<u32>,
        /// "Correct" remediates drift, anything else only detects it
        #[arg(long)]
        drift_management: Option<String>,
        /// Value of the delete_stack tag
        #[arg(long)]
        delete_stack: Option<String>,
        /// Team granted admin on the stack
        #[arg(long)]
        team: Option<String>,
        /// Delete the stack once its TTL destroy has run
        #[arg(long)]
        delete_after_destroy: Option<bool>,
    },

    /// Show a stack's policy and what has been applied
    Show { stack: String },

    /// List every stack in the policy store
    List,

    /// Forget a stack's policy and ledger
    Remove { stack: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, subcmd: PolicySubcommand, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(config_path, &config)?;

    match subcmd {
        PolicySubcommand::Set {
            stack,
            ttl_minutes,
            drift_management,
            delete_stack,
            team,
            delete_after_destroy,
        } => {
            let id: StackIdentity = stack.parse()?;
            let args = StackSettingsArgs {
                ttl_minutes,
                drift_management,
                delete_stack,
                team_assignment: team,
                delete_after_destroy,
                pulumi_access_token: None,
            }
            .merged_over(&config.settings_for(&id));
            let policy = apply_settings(&store, &id, &args)?;
            if json {
                print_json(&serde_json::json!({ "identity": id, "policy": policy }))?;
            } else {
                println!("Updated policy for {id}");
            }
            Ok(())
        }
        PolicySubcommand::Show { stack } => show(&store, &stack, json),
        PolicySubcommand::List => list(&store, json),
        PolicySubcommand::Remove { stack } => {
            let id: StackIdentity = stack.parse()?;
            if !store.remove(&id)? {
                anyhow::bail!("no policy for stack {id}");
            }
            if json {
                print_json(&serde_json::json!({ "removed": id }))?;
            } else {
                println!("Removed policy for {id}");
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// show / list
// ---------------------------------------------------------------------------

fn show(store: &impl PolicyStore, stack: &str, json: bool) -> anyhow::Result<()> {
    let id: StackIdentity = stack.parse()?;
    let Some(policy) = store.get(&id)? else {
        anyhow::bail!("no policy for stack {id}");
    };
    let ledger = store.ledger(&id)?;

    if json {
        return print_json(&serde_json::json!({
            "identity": id,
            "policy": policy,
            "ledger": ledger,
        }));
    }

    println!("stack:              {id}");
    println!("team:               {}", policy.team);
    println!("ttl minutes:        {}", policy.ttl_minutes);
    println!(
        "expires:            {}",
        policy
            .ttl_expiration
            .map(ttl::format_timestamp)
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "drift:              {}",
        if policy.drift_mode.auto_remediate() {
            "detect and remediate"
        } else {
            "detect only"
        }
    );
    println!("delete tag:         {}", policy.delete_tag);
    println!("delete on expire:   {}", policy.delete_on_expire);
    println!(
        "last pass:          {}",
        match (ledger.last_pass_at, ledger.last_trigger) {
            (Some(at), Some(trigger)) => format!("{} ({trigger})", at.to_rfc3339()),
            (Some(at), None) => at.to_rfc3339(),
            _ => "never".to_string(),
        }
    );
    Ok(())
}

fn list(store: &impl PolicyStore, json: bool) -> anyhow::Result<()> {
    let ids = store.list()?;
    let mut entries = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(policy) = store.get(&id)? {
            entries.push((id, policy));
        }
    }

    if json {
        let value: Vec<_> = entries
            .iter()
            .map(|(id, policy)| serde_json::json!({ "identity": id, "policy": policy }))
            .collect();
        return print_json(&value);
    }

    if entries.is_empty() {
        println!("No stacks in the policy store.");
        return Ok(());
    }
    let rows = entries
        .into_iter()
        .map(|(id, p)| {
            vec![
                id.to_string(),
                p.team,
                p.ttl_minutes.to_string(),
                p.ttl_expiration
                    .map(ttl::format_timestamp)
                    .unwrap_or_else(|| "-".to_string()),
                if p.drift_mode.auto_remediate() {
                    "remediate".to_string()
                } else {
                    "detect".to_string()
                },
            ]
        })
        .collect();
    print_table(&["STACK", "TEAM", "TTL", "EXPIRES", "DRIFT"], rows);
    Ok(())
}
