//! `parley send`: deliver one message and wait for the server's confirmation.

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use console::style;
use tracing::{debug, warn};

use parley_core::controller::ControllerUpdate;
use parley_types::error::ApiError;
use parley_types::id::{MessageId, TempId, UserId};

use crate::cli::chat::loop_runner::spinner;
use crate::state::{AppState, Controller, PushStatus};

pub async fn send_message(
    state: &AppState,
    counterpart: &str,
    text: &str,
    timeout_secs: u64,
    json: bool,
) -> Result<()> {
    match state.connect().await? {
        PushStatus::Connected(session) => debug!(session = session.id(), "push session ready"),
        PushStatus::NoCredential => debug!("no credential, sending without push"),
        PushStatus::Unavailable(e) => warn!(error = %e, "push unavailable, sending over REST only"),
    }

    let mut controller = state.controller();
    let counterpart = UserId::from(counterpart);
    controller
        .open_with(&counterpart)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    let temp_id = controller.send(text).map_err(|e| anyhow!(e.user_message()))?;

    let progress = (!json).then(|| spinner("sending..."));
    let outcome = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        wait_for_confirmation(&mut controller, temp_id),
    )
    .await;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let id = match outcome {
        Ok(Ok(id)) => id,
        Ok(Err(error)) => bail!("message not sent: {}", error.user_message()),
        Err(_) => bail!("no confirmation from the server within {timeout_secs}s"),
    };

    let message = controller
        .store()
        .and_then(|store| store.get(&id))
        .map(|entry| entry.message.clone())
        .ok_or_else(|| anyhow!("confirmed message {id} is no longer in the conversation"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!(
            "  {} Sent to {} {}",
            style("✓").green().bold(),
            style(&counterpart).cyan(),
            style(format!("({id})")).dim()
        );
    }
    Ok(())
}

/// Drive the controller until `temp_id` is confirmed or rolled back.
async fn wait_for_confirmation(
    controller: &mut Controller,
    temp_id: TempId,
) -> Result<MessageId, ApiError> {
    loop {
        match controller.next_update().await {
            ControllerUpdate::Reconciled { temp_id: t, id } if t == temp_id => return Ok(id),
            ControllerUpdate::SendFailed { temp_id: t, error } if t == temp_id => return Err(error),
            other => debug!(?other, "update while waiting for confirmation"),
        }
    }
}
