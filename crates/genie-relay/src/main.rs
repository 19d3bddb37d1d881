mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use genie_relay::config::DEFAULT_CONFIG_FILE;

// ============================================================================
// CLI Types
// ============================================================================

/// genie-relay - Ask a Genie space questions and get chat-sized markdown back
#[derive(Parser, Debug)]
#[command(version = genie_relay::build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question and print the reply
    Ask {
        /// The question (words are joined with spaces)
        #[arg(required = true, value_name = "QUESTION")]
        question: Vec<String>,

        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,

        /// User identifier the session is keyed by
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Print the one-shot JSON outcome instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive question loop
    Chat {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,

        /// User identifier the session is keyed by
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// List the Genie spaces visible to the configured credentials
    Spaces {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            question,
            config,
            user,
            json,
        } => commands::ask::run(&question.join(" "), &config, &user, json).await,
        Commands::Chat { config, user } => commands::chat::run(&config, &user).await,
        Commands::Spaces { config } => commands::spaces::run(&config).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
