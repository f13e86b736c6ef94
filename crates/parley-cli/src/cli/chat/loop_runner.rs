//! Main chat loop orchestration.
//!
//! Opens the conversation, then waits on two things at once: the next input
//! line and the next controller update. Everything printed goes through the
//! readline `SharedWriter` so the prompt survives incoming messages.

use std::io::Write;
use std::time::Duration;

use anyhow::anyhow;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline_async::SharedWriter;
use tracing::{debug, info};

use parley_core::controller::ControllerUpdate;
use parley_core::store::Entry;
use parley_types::id::{MessageId, UserId};

use crate::state::{AppState, Controller, PushStatus};

use super::banner::{LiveState, welcome_banner};
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::{
    Transcript, TranscriptEvent, format_error, format_event, format_typing, short_id,
};

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// A spinner on stderr while a network call is in flight.
pub fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Run the interactive chat with `counterpart`.
pub async fn run_chat_loop(state: &AppState, counterpart: &str) -> anyhow::Result<()> {
    let counterpart = UserId::from(counterpart);

    let live = match state.connect().await? {
        PushStatus::Connected(session) => {
            debug!(session = session.id(), "chat is live");
            LiveState::Live
        }
        PushStatus::NoCredential => anyhow::bail!(
            "no credential found: set ${} or token_file in config.toml",
            state.config.token_env
        ),
        PushStatus::Unavailable(e) => {
            eprintln!("{}", format_error(&format!("live updates unavailable: {e}")));
            LiveState::Offline
        }
    };

    let mut controller = state.controller();
    let progress = spinner("opening conversation...");
    let opened = controller.open_with(&counterpart).await;
    progress.finish_and_clear();
    let conversation_id = opened.map_err(|e| anyhow!(e.user_message()))?;
    info!(conversation_id = %conversation_id, %counterpart, "chat opened");

    let prompt = format!("  {} ", style("you >").green().bold());
    let (mut input, mut out) =
        ChatInput::new(prompt).map_err(|e| anyhow!("failed to initialize input: {e}"))?;

    write!(
        out,
        "{}",
        welcome_banner(counterpart.as_str(), conversation_id.as_str(), live)
    )?;
    let mut transcript = Transcript::new(state.user.clone());
    print_changes(&mut out, &mut transcript, &mut controller)?;

    loop {
        tokio::select! {
            event = input.read_line() => match event {
                InputEvent::Eof => break,
                InputEvent::Interrupted => {
                    writeln!(out, "  {}", style("Press Ctrl+D to exit, or keep chatting.").dim())?;
                }
                InputEvent::Line(text) if text.is_empty() => {}
                InputEvent::Line(text) => match commands::parse(&text) {
                    Some(command) => {
                        let flow = run_command(command, &mut controller, &mut transcript, &mut input, &mut out).await?;
                        if flow == Flow::Exit {
                            break;
                        }
                    }
                    None => match controller.send(&text) {
                        Ok(_) => print_changes(&mut out, &mut transcript, &mut controller)?,
                        Err(e) => writeln!(out, "{}", format_error(&e.user_message()))?,
                    },
                },
            },
            update = controller.next_update() => {
                show_update(update, &mut controller, &mut transcript, &mut out)?;
            }
        }
    }

    writeln!(out, "\n  {}", style("Session ended.").dim())?;
    input.flush();
    Ok(())
}

async fn run_command(
    command: ChatCommand,
    controller: &mut Controller,
    transcript: &mut Transcript,
    input: &mut ChatInput,
    out: &mut SharedWriter,
) -> anyhow::Result<Flow> {
    match command {
        ChatCommand::Help => write!(out, "{}", commands::help_text())?,
        ChatCommand::Exit => return Ok(Flow::Exit),
        ChatCommand::Invalid(message) => writeln!(out, "{}", format_error(&message))?,
        ChatCommand::Edit { id, content } => {
            let target = find_message(&controller.entries(), &id);
            let result =
                target.and_then(|id| controller.edit(&id, &content).map_err(|e| e.user_message()));
            match result {
                Ok(()) => print_changes(out, transcript, controller)?,
                Err(message) => writeln!(out, "{}", format_error(&message))?,
            }
        }
        ChatCommand::Delete(id) => {
            let target = find_message(&controller.entries(), &id);
            let result = target.and_then(|id| controller.delete(&id).map_err(|e| e.user_message()));
            match result {
                Ok(()) => print_changes(out, transcript, controller)?,
                Err(message) => writeln!(out, "{}", format_error(&message))?,
            }
        }
        ChatCommand::Read => match controller.mark_read() {
            Ok(count) => writeln!(
                out,
                "  {}",
                style(format!("marked {count} message(s) read")).dim()
            )?,
            Err(e) => writeln!(out, "{}", format_error(&e.user_message()))?,
        },
        ChatCommand::Typing => {
            if let Err(e) = controller.set_typing(true) {
                writeln!(out, "{}", format_error(&e.user_message()))?;
            }
        }
        ChatCommand::Reload => match controller.load().await {
            Ok(()) => {
                print_changes(out, transcript, controller)?;
                writeln!(out, "  {}", style("conversation reloaded").dim())?;
            }
            Err(e) => writeln!(out, "{}", format_error(&e.user_message()))?,
        },
        ChatCommand::Clear => {
            input.clear();
            transcript.reset();
            print_changes(out, transcript, controller)?;
        }
    }
    Ok(Flow::Continue)
}

fn show_update(
    update: ControllerUpdate,
    controller: &mut Controller,
    transcript: &mut Transcript,
    out: &mut SharedWriter,
) -> std::io::Result<()> {
    match update {
        ControllerUpdate::MessagesChanged => print_changes(out, transcript, controller)?,
        ControllerUpdate::Reconciled { temp_id, id } => {
            transcript.confirm(temp_id, &id);
            print_changes(out, transcript, controller)?;
        }
        ControllerUpdate::SendFailed { error, .. } => {
            print_changes(out, transcript, controller)?;
            let message = format!("message not sent: {}", error.user_message());
            writeln!(out, "{}", format_error(&message))?;
        }
        ControllerUpdate::EditFailed { id, error } => {
            print_changes(out, transcript, controller)?;
            let message = format!("edit of {} failed: {}", short_id(&id), error.user_message());
            writeln!(out, "{}", format_error(&message))?;
        }
        ControllerUpdate::DeleteFailed { id, error } => {
            print_changes(out, transcript, controller)?;
            let message = format!("delete of {} failed: {}", short_id(&id), error.user_message());
            writeln!(out, "{}", format_error(&message))?;
        }
        ControllerUpdate::MarkReadFailed { error } => {
            let message = format!("could not mark messages read: {}", error.user_message());
            writeln!(out, "{}", format_error(&message))?;
        }
        ControllerUpdate::TypingChanged(users) => {
            if let Some(line) = format_typing(&users) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}

/// Print what changed since the last call. Unread messages from the
/// counterpart that just appeared are marked read, since they are now on
/// screen.
fn print_changes(
    out: &mut SharedWriter,
    transcript: &mut Transcript,
    controller: &mut Controller,
) -> std::io::Result<()> {
    let self_id = controller.self_id().clone();
    let events = transcript.sync(&controller.entries());
    let mut unread_arrived = false;
    for event in &events {
        if let TranscriptEvent::Added { message, .. } = event {
            unread_arrived |= message.sender_id != self_id && !message.is_read;
        }
        writeln!(out, "{}", format_event(event, &self_id))?;
    }
    if unread_arrived {
        if let Err(e) = controller.mark_read() {
            debug!(error = %e, "mark read skipped");
        }
    }
    Ok(())
}

/// Find the entry whose id is `prefix` or starts with it.
fn find_message(entries: &[&Entry], prefix: &str) -> Result<MessageId, String> {
    if let Some(exact) = entries.iter().find(|e| e.message.id.as_str() == prefix) {
        return Ok(exact.message.id.clone());
    }
    let mut matches = entries
        .iter()
        .filter(|e| e.message.id.as_str().starts_with(prefix));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(only.message.id.clone()),
        (None, _) => Err(format!("no message with id {prefix}")),
        (Some(_), Some(_)) => Err(format!("{prefix} matches more than one message")),
    }
}
