//! Common types and utilities for sw.
//!
//! This crate holds everything shared between the daemon (`sw-daemon`) and the
//! client (`swctl`): the control socket protocol, the configuration loader and
//! the wallpaper history.
//!
//! # Control protocol
//!
//! Communication happens over a Unix domain stream socket. A client connects,
//! writes a single newline-terminated [`Command`] line and reads back a single
//! newline-terminated [`Response`] line, after which the daemon closes the
//! connection.
//!
//! ```text
//! -> SET /home/me/Pictures/Wallpapers/lake.png
//! <- OK
//! ```
//!
//! # Examples
//!
//! ```
//! use common::{Command, Response};
//!
//! let cmd: Command = "SET /tmp/wall.png".parse().unwrap();
//! assert_eq!(cmd.to_string(), "SET /tmp/wall.png");
//!
//! let resp = Response::parse("ERROR: Unknown command").unwrap();
//! assert!(!resp.is_ok());
//! ```

pub mod config;
pub mod history;

pub use config::{Config, ConfigError};
pub use history::{History, HistoryEntry, HistoryError};

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing control socket lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty request")]
    Empty,

    #[error("Unknown command")]
    UnknownCommand,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Commands sent from client to daemon over the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the wallpaper on every output with the image at `path`.
    ///
    /// The path may be absolute or relative to the daemon's working directory.
    Set { path: String },
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (verb, argument) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        if verb.eq_ignore_ascii_case("SET") && !argument.is_empty() {
            return Ok(Self::Set {
                path: argument.to_string(),
            });
        }

        Err(ProtocolError::UnknownCommand)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { path } => write!(f, "SET {}", path),
        }
    }
}

/// Response from daemon to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error(String),
}

impl Response {
    /// Parse a response line as written by the daemon.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line == "OK" {
            return Ok(Self::Ok);
        }

        match line.strip_prefix("ERROR:") {
            Some(message) => Ok(Self::Error(message.trim_start().to_string())),
            None => Err(ProtocolError::MalformedResponse(line.to_string())),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

/// Every unusable request is answered the same way
impl From<ProtocolError> for Response {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Empty => Self::Error(ProtocolError::UnknownCommand.to_string()),
            other => Self::Error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_command() {
        let cmd: Command = "SET /tmp/test.png\n".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                path: "/tmp/test.png".to_string()
            }
        );
    }

    #[test]
    fn test_parse_set_is_case_insensitive() {
        let cmd: Command = "set relative/wall.jpg".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                path: "relative/wall.jpg".to_string()
            }
        );
    }

    #[test]
    fn test_parse_set_keeps_inner_spaces() {
        let cmd: Command = "SET /tmp/my wallpapers/a b.png  \n".parse().unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                path: "/tmp/my wallpapers/a b.png".to_string()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ProtocolError::Empty));
        assert_eq!("  \n".parse::<Command>(), Err(ProtocolError::Empty));
        assert_eq!("PING".parse::<Command>(), Err(ProtocolError::UnknownCommand));
        assert_eq!(
            "SETX /tmp/a.png".parse::<Command>(),
            Err(ProtocolError::UnknownCommand)
        );
        assert_eq!("SET".parse::<Command>(), Err(ProtocolError::UnknownCommand));
        assert_eq!("set   \n".parse::<Command>(), Err(ProtocolError::UnknownCommand));
    }

    #[test]
    fn test_unknown_command_message() {
        let resp = Response::from(ProtocolError::UnknownCommand);
        assert_eq!(resp.to_string(), "ERROR: Unknown command");
        assert_eq!(
            Response::from(ProtocolError::Empty).to_string(),
            "ERROR: Unknown command"
        );
    }

    #[test]
    fn test_response_display() {
        assert_eq!(Response::Ok.to_string(), "OK");
        assert_eq!(
            Response::Error("boom".to_string()).to_string(),
            "ERROR: boom"
        );
    }

    #[test]
    fn test_response_parse() {
        assert_eq!(Response::parse("OK\n").unwrap(), Response::Ok);
        assert_eq!(
            Response::parse("ERROR: Failed to open image\n").unwrap(),
            Response::Error("Failed to open image".to_string())
        );
        assert!(matches!(
            Response::parse("HELLO"),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }
}
