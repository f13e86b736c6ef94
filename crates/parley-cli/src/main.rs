//! Parley command-line client.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, loads configuration, wires the REST client and push
//! session, then dispatches to the chat loop or a one-shot command.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use parley_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug,parley_core=debug,parley_infra=debug",
        _ => "trace",
    };
    let options = TracingOptions::new(filter)
        .with_otel(cli.otel)
        .with_target(cli.verbose > 1);
    init_tracing(&options).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(&cli.global).await?;

    let result = match &cli.command {
        Commands::Chat { counterpart } => cli::chat::loop_runner::run_chat_loop(&state, counterpart).await,
        Commands::Send {
            counterpart,
            text,
            timeout,
        } => cli::send::send_message(&state, counterpart, &text.join(" "), *timeout, cli.json).await,
        Commands::History { counterpart, limit } => {
            cli::history::show_history(&state, counterpart, *limit, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    state.shutdown().await;
    shutdown_tracing();
    result
}
