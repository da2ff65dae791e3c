//! Inbound command surface.
//!
//! One enum for both audiences; owner gating happens in the handlers,
//! which re-check `is_owner` themselves rather than trusting the parse.

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case")]
pub enum Command {
    #[command(description = "show the main menu")]
    Start,
    #[command(description = "how this bot works")]
    Help,
    #[command(description = "submit a raw order: /order <id> <items...>")]
    Order(String),
    #[command(description = "end the current dialog")]
    End,

    // Operator commands. Hidden from /help for regular users.
    #[command(hide)]
    Stats,
    #[command(hide)]
    ExportUsers,
    #[command(hide)]
    Chats,
    #[command(hide)]
    Questions,
    #[command(hide)]
    History(String),
    #[command(hide)]
    ClearConversations,
    #[command(hide)]
    Dialog(String),
}

impl Command {
    /// Commands only operators may run.
    pub fn is_owner_only(&self) -> bool {
        matches!(
            self,
            Self::Stats
                | Self::ExportUsers
                | Self::Chats
                | Self::Questions
                | Self::History(_)
                | Self::ClearConversations
                | Self::Dialog(_)
        )
    }
}

/// Parse a user id argument; malformed input becomes a user-visible
/// message, never a fault.
pub fn parse_user_id(arg: &str) -> Result<i64, String> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Err("Please provide a user id, e.g. /history 923847".to_string());
    }
    trimmed
        .parse()
        .map_err(|_| format!("\"{trimmed}\" is not a valid user id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Command, teloxide::utils::command::ParseError> {
        Command::parse(text, "lavka_bot")
    }

    #[test]
    fn test_parse_user_commands() {
        assert_eq!(parse("/start").unwrap(), Command::Start);
        assert_eq!(parse("/help").unwrap(), Command::Help);
        assert_eq!(parse("/end").unwrap(), Command::End);
        assert_eq!(
            parse("/order O384700 Cha-Bas-1_m-100").unwrap(),
            Command::Order("O384700 Cha-Bas-1_m-100".to_string())
        );
    }

    #[test]
    fn test_parse_admin_commands() {
        assert_eq!(parse("/stats").unwrap(), Command::Stats);
        assert_eq!(parse("/export_users").unwrap(), Command::ExportUsers);
        assert_eq!(parse("/chats").unwrap(), Command::Chats);
        assert_eq!(parse("/questions").unwrap(), Command::Questions);
        assert_eq!(parse("/history 42").unwrap(), Command::History("42".to_string()));
        assert_eq!(parse("/clear_conversations").unwrap(), Command::ClearConversations);
        assert_eq!(parse("/dialog 42").unwrap(), Command::Dialog("42".to_string()));
    }

    #[test]
    fn test_parse_with_bot_mention() {
        assert_eq!(parse("/start@lavka_bot").unwrap(), Command::Start);
    }

    #[test]
    fn test_free_text_is_not_a_command() {
        assert!(parse("hello there").is_err());
    }

    #[test]
    fn test_owner_only_split() {
        assert!(!Command::Start.is_owner_only());
        assert!(!Command::Order(String::new()).is_owner_only());
        assert!(!Command::End.is_owner_only());
        assert!(Command::Stats.is_owner_only());
        assert!(Command::ClearConversations.is_owner_only());
        assert!(Command::Dialog("42".into()).is_owner_only());
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("923847"), Ok(923847));
        assert_eq!(parse_user_id("  42 "), Ok(42));
        assert!(parse_user_id("").is_err());
        assert!(parse_user_id("abc").unwrap_err().contains("abc"));
    }
}
