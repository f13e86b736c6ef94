//! `parley history`: print the conversation with another user.

use anyhow::{Result, anyhow};
use console::style;
use serde::Serialize;

use parley_types::id::{ConversationId, UserId};
use parley_types::message::Message;

use crate::cli::chat::loop_runner::spinner;
use crate::cli::chat::renderer::format_message;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryOutput<'a> {
    conversation_id: &'a ConversationId,
    counterpart: &'a UserId,
    messages: &'a [&'a Message],
}

/// History only reads, so no push session is opened.
pub async fn show_history(
    state: &AppState,
    counterpart: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut controller = state.controller();
    let counterpart = UserId::from(counterpart);

    let progress = (!json).then(|| spinner("loading conversation..."));
    let opened = controller.open_with(&counterpart).await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    let conversation_id = opened.map_err(|e| anyhow!(e.user_message()))?;

    let messages: Vec<&Message> = controller
        .entries()
        .into_iter()
        .map(|entry| &entry.message)
        .collect();
    let shown = tail(&messages, limit);

    if json {
        let output = HistoryOutput {
            conversation_id: &conversation_id,
            counterpart: &counterpart,
            messages: shown,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    if shown.is_empty() {
        println!(
            "  {}",
            style(format!("No messages with {counterpart} yet.")).dim()
        );
    }
    for message in shown {
        println!("{}", format_message(message, controller.self_id(), false));
    }
    println!();
    Ok(())
}

fn tail<T>(items: &[T], limit: Option<usize>) -> &[T] {
    match limit {
        Some(n) if n < items.len() => &items[items.len() - n..],
        _ => items,
    }
}
