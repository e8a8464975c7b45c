//! User commands accepted by the node.
//!
//! Two physical buttons drive a board build: button 0 pairs (or prints the
//! statistics once connected), button 1 stops the echo session.  The command
//! loop in `main.rs` accepts the same actions as words on stdin.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// An action requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    /// Start pairing, or report echo statistics when already connected.
    Pair,
    /// Stop the running echo session.
    StopEcho,
    /// Print the session status block.
    Status,
    /// Leave the current group.
    Leave,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown command '{0}' (try: pair, stop, status, leave)")]
pub struct UnknownCommand(pub String);

impl FromStr for NodeCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pair" | "p" | "button0" | "0" => Ok(Self::Pair),
            "stop" | "s" | "button1" | "1" => Ok(Self::StopEcho),
            "status" | "st" => Ok(Self::Status),
            "leave" | "l" => Ok(Self::Leave),
            _ => Err(UnknownCommand(s.trim().to_string())),
        }
    }
}

impl fmt::Display for NodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pair => "pair",
            Self::StopEcho => "stop",
            Self::Status => "status",
            Self::Leave => "leave",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_button_aliases() {
        assert_eq!("button0".parse::<NodeCommand>(), Ok(NodeCommand::Pair));
        assert_eq!("1".parse::<NodeCommand>(), Ok(NodeCommand::StopEcho));
    }

    #[test]
    fn test_parse_ignores_case_and_whitespace() {
        assert_eq!("  Status \n".parse::<NodeCommand>(), Ok(NodeCommand::Status));
        assert_eq!("LEAVE".parse::<NodeCommand>(), Ok(NodeCommand::Leave));
    }

    #[test]
    fn test_parse_unknown_word_is_error() {
        let err = "reboot".parse::<NodeCommand>().unwrap_err();
        assert_eq!(err, UnknownCommand("reboot".into()));
        assert!(err.to_string().contains("try: pair"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for cmd in [
            NodeCommand::Pair,
            NodeCommand::StopEcho,
            NodeCommand::Status,
            NodeCommand::Leave,
        ] {
            assert_eq!(cmd.to_string().parse::<NodeCommand>(), Ok(cmd));
        }
    }
}
