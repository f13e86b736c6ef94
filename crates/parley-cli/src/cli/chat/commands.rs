//! Slash command parsing for the chat loop.
//!
//! Commands start with `/`. Message ids may be abbreviated to any unique
//! prefix of the id shown next to each line.

use console::style;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    Help,
    /// Replace the content of one of your messages.
    Edit { id: String, content: String },
    /// Delete one of your messages.
    Delete(String),
    /// Mark the counterpart's messages as read.
    Read,
    /// Tell the counterpart you are typing. Withdrawn after a short idle.
    Typing,
    /// Re-fetch the conversation from the server.
    Reload,
    Clear,
    Exit,
    /// Unknown command or bad arguments; carries the message to show.
    Invalid(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (trimmed, ""),
    };

    let command = match cmd.to_lowercase().as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/edit" | "/e" => match rest.split_once(char::is_whitespace) {
            Some((id, content)) if !content.trim().is_empty() => ChatCommand::Edit {
                id: id.to_string(),
                content: content.trim().to_string(),
            },
            _ => ChatCommand::Invalid("usage: /edit <id> <new text>".to_string()),
        },
        "/delete" | "/del" | "/rm" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                ChatCommand::Invalid("usage: /delete <id>".to_string())
            } else {
                ChatCommand::Delete(rest.to_string())
            }
        }
        "/read" => ChatCommand::Read,
        "/typing" | "/t" => ChatCommand::Typing,
        "/reload" | "/r" => ChatCommand::Reload,
        "/clear" | "/cls" => ChatCommand::Clear,
        "/exit" | "/quit" | "/q" => ChatCommand::Exit,
        other => ChatCommand::Invalid(format!(
            "unknown command {other}, type /help for available commands"
        )),
    };
    Some(command)
}

/// The help text listing all available commands.
pub fn help_text() -> String {
    let rows = [
        ("/help", "Show this help message"),
        ("/edit <id> <text>", "Replace the text of one of your messages"),
        ("/delete <id>", "Delete one of your messages"),
        ("/read", "Mark the conversation as read"),
        ("/typing", "Show the other side that you are typing"),
        ("/reload", "Re-fetch the conversation"),
        ("/clear", "Clear the screen"),
        ("/exit", "End the chat session"),
    ];

    let mut out = format!("\n  {}\n\n", style("Available commands:").bold());
    for (cmd, help) in rows {
        out.push_str(&format!("  {:<20} {}\n", style(cmd).cyan(), help));
    }
    out.push_str(&format!(
        "\n  {}\n",
        style("Ids can be shortened to any unique prefix. Ctrl+D to exit.").dim()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_help() {
        assert_eq!(parse("/help"), Some(ChatCommand::Help));
        assert_eq!(parse("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn test_parse_exit() {
        assert_eq!(parse("/exit"), Some(ChatCommand::Exit));
        assert_eq!(parse("/QUIT"), Some(ChatCommand::Exit));
    }

    #[test]
    fn test_parse_edit() {
        assert_eq!(
            parse("/edit 65f1c0ff  see you at 6 "),
            Some(ChatCommand::Edit {
                id: "65f1c0ff".to_string(),
                content: "see you at 6".to_string(),
            })
        );
        assert!(matches!(parse("/edit 65f1c0ff"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse("/edit"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn test_parse_delete() {
        assert_eq!(parse("/delete m1"), Some(ChatCommand::Delete("m1".to_string())));
        assert!(matches!(parse("/delete"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse("/delete m1 m2"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("/read"), Some(ChatCommand::Read));
        assert_eq!(parse("/typing"), Some(ChatCommand::Typing));
        assert_eq!(parse("/reload"), Some(ChatCommand::Reload));
        assert_eq!(parse("/cls"), Some(ChatCommand::Clear));
    }

    #[test]
    fn test_parse_not_command() {
        assert_eq!(parse("hello world"), None);
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(parse("/foo"), Some(ChatCommand::Invalid(msg)) if msg.contains("/foo")));
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for cmd in ["/help", "/edit", "/delete", "/read", "/typing", "/reload", "/clear", "/exit"] {
            assert!(help.contains(cmd), "missing {cmd}");
        }
    }
}
