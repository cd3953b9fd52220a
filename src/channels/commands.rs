//! Prefix command parser.
//!
//! Recognizes `<prefix>announce <channel> [mentions...]` in chat messages,
//! where `<channel>` is either a channel mention (`<#123>`) or a bare id.
//! Everything after the channel is passed through as the explicit mention
//! list.

/// Arguments of the announce command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceArgs {
    pub channel_id: u64,
    /// Raw mention list, if any was supplied.
    pub mentions: Option<String>,
}

/// Result of parsing one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Announce(AnnounceArgs),
    /// `<prefix>help`.
    Help,
    /// Prefixed but malformed or unrecognized. Carries a usage hint.
    Invalid(String),
    /// Not addressed to the bot.
    NotACommand,
}

/// Configuration for command parsing.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Prefix for commands (default: "!").
    pub prefix: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
        }
    }
}

impl CommandConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

/// Parse a chat message into a command.
pub fn parse_command(input: &str, config: &CommandConfig) -> ParsedCommand {
    let trimmed = input.trim();
    if config.prefix.is_empty() {
        return ParsedCommand::NotACommand;
    }
    let Some(without_prefix) = trimmed.strip_prefix(config.prefix.as_str()) else {
        return ParsedCommand::NotACommand;
    };

    let (name, rest) = match without_prefix.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (without_prefix, ""),
    };
    if name.is_empty() {
        return ParsedCommand::NotACommand;
    }

    match name.to_lowercase().as_str() {
        "announce" => parse_announce(rest, &config.prefix),
        "help" => ParsedCommand::Help,
        other => ParsedCommand::Invalid(format!(
            "Unknown command '{}'. {}",
            other,
            usage(&config.prefix)
        )),
    }
}

fn parse_announce(rest: &str, prefix: &str) -> ParsedCommand {
    let (target, mentions) = match rest.split_once(char::is_whitespace) {
        Some((target, mentions)) => (target, mentions.trim()),
        None => (rest, ""),
    };
    if target.is_empty() {
        return ParsedCommand::Invalid(format!("Missing channel. {}", usage(prefix)));
    }

    let Some(channel_id) = parse_channel(target) else {
        return ParsedCommand::Invalid(format!(
            "'{}' is not a channel. {}",
            target,
            usage(prefix)
        ));
    };

    ParsedCommand::Announce(AnnounceArgs {
        channel_id,
        mentions: (!mentions.is_empty()).then(|| mentions.to_string()),
    })
}

/// Accept `<#123>` or `123`.
pub fn parse_channel(token: &str) -> Option<u64> {
    let id = token
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(token);
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// One-line usage text.
pub fn usage(prefix: &str) -> String {
    format!("Usage: {}announce <#channel> [@mentions...]", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ParsedCommand {
        parse_command(input, &CommandConfig::default())
    }

    #[test]
    fn test_parse_announce_with_channel_mention() {
        assert_eq!(
            parse("!announce <#42>"),
            ParsedCommand::Announce(AnnounceArgs {
                channel_id: 42,
                mentions: None,
            })
        );
    }

    #[test]
    fn test_parse_announce_with_mentions() {
        assert_eq!(
            parse("  !announce 42   @General <@&7>  "),
            ParsedCommand::Announce(AnnounceArgs {
                channel_id: 42,
                mentions: Some("@General <@&7>".to_string()),
            })
        );
    }

    #[test]
    fn test_command_name_is_case_insensitive() {
        assert!(matches!(parse("!ANNOUNCE 1"), ParsedCommand::Announce(_)));
        assert_eq!(parse("!Help"), ParsedCommand::Help);
    }

    #[test]
    fn test_missing_channel_is_invalid() {
        match parse("!announce") {
            ParsedCommand::Invalid(msg) => assert!(msg.contains("Missing channel")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_channel_is_invalid() {
        assert!(matches!(parse("!announce #general"), ParsedCommand::Invalid(_)));
        assert!(matches!(parse("!announce <#12x>"), ParsedCommand::Invalid(_)));
    }

    #[test]
    fn test_unknown_command_is_invalid() {
        match parse("!frobnicate") {
            ParsedCommand::Invalid(msg) => {
                assert!(msg.contains("frobnicate"));
                assert!(msg.contains("!announce"));
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_messages_are_not_commands() {
        assert_eq!(parse("hello there"), ParsedCommand::NotACommand);
        assert_eq!(parse("!"), ParsedCommand::NotACommand);
        assert_eq!(parse(""), ParsedCommand::NotACommand);
    }

    #[test]
    fn test_custom_prefix() {
        let config = CommandConfig::new("herald ");
        assert!(matches!(
            parse_command("herald announce 5", &config),
            ParsedCommand::Announce(_)
        ));
        assert_eq!(
            parse_command("!announce 5", &config),
            ParsedCommand::NotACommand
        );
    }
}
