mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, policy::PolicySubcommand};
use stackpolicy_core::{paths, AccessToken};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackpolicy",
    about = "Stack lifecycle policy engine: TTL, drift, delete tag, deployment settings and team access for new stacks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file (missing file = built-in defaults)
    #[arg(
        long,
        global = true,
        env = "STACKPOLICY_CONFIG",
        default_value = paths::CONFIG_FILE
    )]
    config: PathBuf,

    /// Management API access token
    #[arg(long, global = true, env = "PULUMI_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run a full reconciliation pass for one stack, as on creation
    Reconcile {
        /// Stack as <organization>/<project>/<stack>
        stack: String,
    },

    /// Run one periodic pass over every stack in the policy store
    Sweep,

    /// Manage stored lifecycle policies
    Policy {
        #[command(subcommand)]
        subcommand: PolicySubcommand,
    },

    /// Compute a TTL expiration timestamp
    Ttl {
        /// Minutes from now (default 480)
        #[arg(long)]
        minutes: Option<u32>,
        /// Reference time in RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the webhook server and periodic scheduler
    Serve {
        /// Port to listen on (default: webhook.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Sweep | Commands::Reconcile { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_path();
    let token = AccessToken::from_option(cli.access_token);

    let result = match cli.command {
        Commands::Init { force } => cmd::init::run(config, force),
        Commands::Reconcile { stack } => cmd::reconcile::run(config, &stack, token, cli.json),
        Commands::Sweep => cmd::sweep::run(config, token, cli.json),
        Commands::Policy { subcommand } => cmd::policy::run(config, subcommand, cli.json),
        Commands::Ttl { minutes, now } => cmd::ttl::run(minutes, now.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(config, port, token),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
