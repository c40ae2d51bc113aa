//! Console command parsing.
//!
//! Each input line is parsed with `clap` as if it were a command line
//! without the binary name.

use clap::{Parser, Subcommand, ValueEnum};
use warden_action::{Command, Direction, PageRequest, PageToken};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_subcommand = true, name = "warden>")]
struct Line {
    #[command(subcommand)]
    command: LineCommand,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand, Debug)]
enum LineCommand {
    Scan,
    /// prev, next, or a control token such as `next|42|0`.
    Page {
        target: String,
    },
    BanAll,
    WarnAll {
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    Check {
        user_id: String,
    },
    Warn {
        user_id: String,
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    Report,
    Reload,
    Add {
        user_id: String,
        name: String,
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        server: Vec<String>,
    },
    Remove {
        user_id: String,
    },
    Status,
    Override {
        #[arg(value_enum)]
        state: Toggle,
    },
    Cancel,
    Help,
    #[command(alias = "exit")]
    Quit,
}

/// One parsed console line.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Quit,
}

fn join_message(words: Vec<String>) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn page_request(target: &str) -> Result<PageRequest, String> {
    if let Ok(direction) = target.parse::<Direction>() {
        return Ok(PageRequest::Step(direction));
    }
    target
        .parse::<PageToken>()
        .map(PageRequest::Token)
        .map_err(|e| e.to_string())
}

/// Parse one console line. Returns `Ok(None)` for a blank line; the error
/// is the usage text to show.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    let parsed = Line::try_parse_from(words).map_err(|e| e.to_string())?;

    let command = match parsed.command {
        LineCommand::Scan => Command::Scan,
        LineCommand::Page { target } => Command::Page(page_request(&target)?),
        LineCommand::BanAll => Command::BanAll,
        LineCommand::WarnAll { message } => Command::WarnAll {
            message: join_message(message),
        },
        LineCommand::Check { user_id } => Command::Check { user_id },
        LineCommand::Warn { user_id, message } => Command::Warn {
            user_id,
            message: join_message(message),
        },
        LineCommand::Report => Command::Report,
        LineCommand::Reload => Command::Reload,
        LineCommand::Add {
            user_id,
            name,
            server,
        } => Command::Add {
            user_id,
            display_name: name,
            origin_server: server.join(" "),
        },
        LineCommand::Remove { user_id } => Command::Remove { user_id },
        LineCommand::Status => Command::Status,
        LineCommand::Override { state } => Command::Override {
            enabled: matches!(state, Toggle::On),
        },
        LineCommand::Cancel => Command::Cancel,
        LineCommand::Help => Command::Help,
        LineCommand::Quit => return Ok(Some(Input::Quit)),
    };
    Ok(Some(Input::Command(command)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> Command {
        match parse_line(line) {
            Ok(Some(Input::Command(command))) => command,
            other => panic!("{:?} did not parse to a command: {:?}", line, other),
        }
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(command("scan"), Command::Scan);
        assert_eq!(command("ban-all"), Command::BanAll);
        assert_eq!(command("help"), Command::Help);
        assert_eq!(parse_line("exit"), Ok(Some(Input::Quit)));
    }

    #[test]
    fn test_page_step_and_token() {
        assert_eq!(
            command("page next"),
            Command::Page(PageRequest::Step(Direction::Next))
        );
        let Command::Page(PageRequest::Token(token)) = command("page prev|42|3") else {
            panic!("expected a token");
        };
        assert_eq!(token.page, 3);
        assert!(parse_line("page sideways").is_err());
    }

    #[test]
    fn test_add_joins_server_words() {
        assert_eq!(
            command("add 123 bob The Other Place"),
            Command::Add {
                user_id: "123".to_string(),
                display_name: "bob".to_string(),
                origin_server: "The Other Place".to_string(),
            }
        );
        assert!(parse_line("add 123 bob").is_err());
    }

    #[test]
    fn test_warn_message_optional() {
        assert_eq!(
            command("warn 5"),
            Command::Warn {
                user_id: "5".to_string(),
                message: None
            }
        );
        assert_eq!(
            command("warn-all read -the- rules"),
            Command::WarnAll {
                message: Some("read -the- rules".to_string())
            }
        );
    }

    #[test]
    fn test_override_toggle() {
        assert_eq!(command("override on"), Command::Override { enabled: true });
        assert_eq!(command("override off"), Command::Override { enabled: false });
        assert!(parse_line("override maybe").is_err());
    }

    #[test]
    fn test_unknown_command_is_error() {
        assert!(parse_line("purge").is_err());
    }
}
