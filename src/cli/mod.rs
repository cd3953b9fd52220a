//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the relay (`run`, the default): liveness server + delivery loop
//! - Sending the announcement once (`announce`)
//! - Previewing the announcement without sending (`render`)
//! - Running a single delivery tick (`scan-once`)

mod announce;
mod scan;

pub use announce::{run_announce_command, run_render_command};
pub use scan::run_scan_once_command;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(
    about = "Relays announcements from a Google Doc and replies from a Google Sheet into Discord"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the relay (default if no subcommand given)
    Run,

    /// Render the announcement document and send it to a channel
    Announce {
        /// Target channel: `<#id>` or a bare channel id
        channel: String,

        /// Mentions to put above the announcement (`@Role`, `@123`, `<@&123>`)
        #[arg(trailing_var_arg = true)]
        mentions: Vec<String>,
    },

    /// Show what `announce` would send, without sending
    Render {
        /// Channel whose roster resolves mentions (optional)
        #[arg(long)]
        channel: Option<String>,

        /// Mentions to put above the announcement
        #[arg(long)]
        mentions: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run exactly one ledger delivery tick and print its report
    ScanOnce,
}

/// Join trailing mention arguments back into one list.
fn mention_list(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_subcommand() {
        let cli = Cli::try_parse_from(["herald"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_announce_collects_mentions() {
        let cli = Cli::try_parse_from(["herald", "announce", "<#42>", "@Staff", "<@&7>"]).unwrap();
        match cli.command {
            Some(Command::Announce { channel, mentions }) => {
                assert_eq!(channel, "<#42>");
                assert_eq!(mention_list(&mentions).as_deref(), Some("@Staff <@&7>"));
            }
            other => panic!("expected Announce, got {:?}", other),
        }
    }

    #[test]
    fn test_render_and_scan_once_parse() {
        let cli = Cli::try_parse_from(["herald", "render", "--json"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Render {
                channel: None,
                mentions: None,
                json: true
            })
        );
        let cli = Cli::try_parse_from(["herald", "scan-once"]).unwrap();
        assert_eq!(cli.command, Some(Command::ScanOnce));
    }

    #[test]
    fn test_empty_mention_list() {
        assert_eq!(mention_list(&[]), None);
        assert_eq!(mention_list(&["  ".to_string()]), None);
    }
}
