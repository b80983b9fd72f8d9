//! Rollcall - profile collection over a durable work queue.
//!
//! Thin shell over the library crates: loads configuration, installs
//! tracing, wires Ctrl-C to cancellation and dispatches subcommands.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect public forum profiles for the nicknames on the run list")]
#[command(long_about = r#"
Rollcall drains the run list: every Pending nickname is looked up, its public
profile is appended to the profile history, and the nickname is marked Done
or Error.

Examples:
  rollcall enqueue alice bob          # Queue two nicknames
  rollcall tag vip alice              # Tag a nickname
  rollcall run --max-profiles 50      # Process up to 50 pending nicknames
  rollcall status                     # Show run list counts
"#)]
struct Cli {
    /// Configuration file (defaults to ~/.config/rollcall/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process pending targets
    Run {
        /// Maximum targets to process (0 = all pending)
        #[arg(long)]
        max_profiles: Option<usize>,

        /// Targets between batch pauses (0 = never pause)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add nicknames to the run list as Pending
    Enqueue {
        /// Nicknames to queue
        #[arg(required = true)]
        nicknames: Vec<String>,

        /// Source label copied into the profile's SOURCE column
        #[arg(long, default_value = rollcall_store::run_list::DEFAULT_SOURCE)]
        source: String,
    },

    /// Assign a tag to nicknames
    Tag {
        /// Tag name
        tag: String,

        /// Nicknames to tag
        #[arg(required = true)]
        nicknames: Vec<String>,
    },

    /// Show run list counts and profile history size
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Put every Error target back to Pending
    ResetErrors,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rollcall=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let Cli { config, command } = Cli::parse();
    init_tracing();

    info!("Starting Rollcall v{}", env!("CARGO_PKG_VERSION"));

    let result = async move {
        let config = commands::load_config(config.as_deref())?;
        match command {
            Command::Run {
                max_profiles,
                batch_size,
                json,
            } => commands::run(&config, max_profiles, batch_size, json).await,
            Command::Enqueue { nicknames, source } => {
                commands::enqueue(&config, &nicknames, &source).await
            }
            Command::Tag { tag, nicknames } => commands::tag(&config, &tag, &nicknames).await,
            Command::Status { json } => commands::status(&config, json).await,
            Command::ResetErrors => commands::reset_errors(&config).await,
        }
    }
    .await;

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
