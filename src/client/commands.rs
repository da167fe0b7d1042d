//! Parsing of interactive input lines into intents.

use crate::error::ChatError;

/// One user intent typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Select(String),
    Leave,
    Deselect,
    /// `None` clears the display name.
    Name(Option<String>),
    Rooms,
    Users,
    Go(String),
    Prev,
    Next,
    Help,
    Quit,
    Say(String),
}

/// A command and what it does, for `/help`.
struct Usage {
    syntax: &'static str,
    desc: &'static str,
}

const USAGE: &[Usage] = &[
    Usage {
        syntax: "/join NAME",
        desc: "Join a room without switching to it",
    },
    Usage {
        syntax: "/select NAME",
        desc: "Join a room and make it current",
    },
    Usage {
        syntax: "/leave",
        desc: "Leave the current room and forget its history",
    },
    Usage {
        syntax: "/back",
        desc: "Deselect the current room",
    },
    Usage {
        syntax: "/name [NAME]",
        desc: "Set your name in the current room (empty clears it)",
    },
    Usage {
        syntax: "/rooms",
        desc: "List joined rooms",
    },
    Usage {
        syntax: "/users",
        desc: "List users in the current room",
    },
    Usage {
        syntax: "/go PATH",
        desc: "Navigate to a location such as /room/Lobby",
    },
    Usage {
        syntax: "/prev, /next",
        desc: "Step through location history",
    },
    Usage {
        syntax: "/help",
        desc: "Show this help",
    },
    Usage {
        syntax: "/quit",
        desc: "Exit",
    },
];

pub fn help_text() -> String {
    let width = USAGE.iter().map(|u| u.syntax.len()).max().unwrap_or(0);
    let mut out = String::from("Anything not starting with / is sent to the current room.\n");
    for usage in USAGE {
        out.push_str(&format!("  {:<width$}  {}\n", usage.syntax, usage.desc, width = width));
    }
    out
}

/// Parse one input line. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, ChatError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };
    // "//text" sends a message that starts with a slash.
    if rest.starts_with('/') {
        return Ok(Some(Command::Say(rest.to_string())));
    }

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let required = |command: &'static str| {
        if arg.is_empty() {
            Err(ChatError::MissingArgument(command))
        } else {
            Ok(arg.to_string())
        }
    };

    let command = match name {
        "join" => Command::Join(required("join")?),
        "select" => Command::Select(required("select")?),
        "leave" => Command::Leave,
        "back" => Command::Deselect,
        "name" => Command::Name((!arg.is_empty()).then(|| arg.to_string())),
        "rooms" => Command::Rooms,
        "users" => Command::Users,
        "go" => Command::Go(required("go")?),
        "prev" => Command::Prev,
        "next" => Command::Next,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ChatError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(parse("hello there").unwrap(), Some(Command::Say("hello there".into())));
        assert_eq!(parse("  indented\n").unwrap(), Some(Command::Say("  indented".into())));
        assert_eq!(parse("//not a command").unwrap(), Some(Command::Say("/not a command".into())));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   \n").unwrap(), None);
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(parse("/join Lobby 2").unwrap(), Some(Command::Join("Lobby 2".into())));
        assert_eq!(parse("/select  Games ").unwrap(), Some(Command::Select("Games".into())));
        assert_eq!(parse("/go /room/Lobby").unwrap(), Some(Command::Go("/room/Lobby".into())));
        assert_eq!(parse("/name Ann").unwrap(), Some(Command::Name(Some("Ann".into()))));
        assert_eq!(parse("/name").unwrap(), Some(Command::Name(None)));
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(parse("/leave").unwrap(), Some(Command::Leave));
        assert_eq!(parse("/back").unwrap(), Some(Command::Deselect));
        assert_eq!(parse("/prev").unwrap(), Some(Command::Prev));
        assert_eq!(parse("/next").unwrap(), Some(Command::Next));
        assert_eq!(parse("/quit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_bad_commands() {
        assert!(matches!(parse("/join"), Err(ChatError::MissingArgument("join"))));
        assert!(matches!(parse("/dance"), Err(ChatError::UnknownCommand(c)) if c == "dance"));
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        for usage in USAGE {
            assert!(help.contains(usage.syntax));
        }
    }
}
