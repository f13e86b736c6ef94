//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod history;
pub mod send;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use console::style;

/// Chat with other users in real time.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection settings that override `config.toml`.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file to use instead of `{data_dir}/config.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the persistence service.
    #[arg(long, global = true, env = "PARLEY_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Websocket URL of the push channel.
    #[arg(long, global = true, env = "PARLEY_PUSH_URL", value_name = "URL")]
    pub push_url: Option<String>,

    /// User to act as.
    #[arg(long, global = true, env = "PARLEY_USER", value_name = "USER_ID")]
    pub user: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an interactive chat with another user.
    Chat {
        /// User id of the other participant.
        counterpart: String,
    },

    /// Send one message and wait for the server to confirm it.
    Send {
        /// User id of the recipient.
        counterpart: String,

        /// Message text (multiple words are joined with spaces).
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Seconds to wait for confirmation.
        #[arg(long, default_value = "15")]
        timeout: u64,
    },

    /// Print the conversation with another user.
    History {
        /// User id of the other participant.
        counterpart: String,

        /// Only show the most recent N messages.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Print a styled error line to stderr.
pub fn print_error(message: &str) {
    eprintln!("  {} {}", style("!").red().bold(), message);
}
