//! Welcome banner display for chat sessions.

use console::style;

/// Push connection state shown in the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Live,
    Offline,
}

/// Render the banner printed when a chat opens.
pub fn welcome_banner(counterpart: &str, conversation_id: &str, live: LiveState) -> String {
    let status = match live {
        LiveState::Live => style("live").green().to_string(),
        LiveState::Offline => style("offline, updates on /reload").yellow().to_string(),
    };
    format!(
        "\n  {} {}\n  {}  {}\n  {}  {}\n\n  {}\n  {}\n",
        style("*").cyan(),
        style(format!("Chat with {counterpart}")).cyan().bold(),
        style("Conversation:").bold(),
        style(conversation_id).dim(),
        style("Push:").bold(),
        status,
        style("Type /help for commands, Ctrl+D to exit").dim(),
        style("---").dim(),
    )
}
