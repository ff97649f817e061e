//! Contains the `ControlChanError` struct that defines the control channel
//! error type.

use super::parse_error::{ParseError, ParseErrorKind};

use std::fmt;
use thiserror::Error;

/// The error type produced on the control channel.
#[derive(Debug)]
pub struct ControlChanError {
    kind: ControlChanErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// A list specifying categories of control channel errors.
#[derive(Eq, PartialEq, Debug, Error)]
#[allow(dead_code)]
pub enum ControlChanErrorKind {
    /// We encountered a system IO error.
    #[error("failed to perform IO")]
    IoError,
    /// Internal server error, e.g. illegal state of the control loop.
    #[error("internal server error")]
    InternalServerError,
    /// We encountered a non-UTF8 character in the command.
    #[error("non-UTF8 character in command")]
    Utf8Error,
    /// The client issued a command we don't know about.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// The command that we don't know about
        command: String,
    },
    /// The client issued a command that we know about, but in an invalid
    /// way (e.g. `USER` without a username).
    #[error("invalid command (invalid parameter)")]
    InvalidCommand,
    /// The client asked for a network protocol family we do not serve
    /// (EPRT with IPv6).
    #[error("unsupported network protocol family")]
    UnsupportedProtocolFamily,
    /// The timer on the control channel elapsed.
    #[error("encountered read timeout on the control channel")]
    ControlChannelTimeout,
}

impl ControlChanError {
    /// Creates a new control channel error with the specific kind
    pub fn new(kind: ControlChanErrorKind) -> Self {
        ControlChanError { kind, source: None }
    }

    /// Return the inner error kind of this error.
    pub fn kind(&self) -> &ControlChanErrorKind {
        &self.kind
    }
}

impl fmt::Display for ControlChanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for ControlChanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static))
    }
}

impl From<ControlChanErrorKind> for ControlChanError {
    fn from(kind: ControlChanErrorKind) -> ControlChanError {
        ControlChanError { kind, source: None }
    }
}

impl From<std::io::Error> for ControlChanError {
    fn from(err: std::io::Error) -> ControlChanError {
        ControlChanError {
            kind: ControlChanErrorKind::IoError,
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::str::Utf8Error> for ControlChanError {
    fn from(err: std::str::Utf8Error) -> ControlChanError {
        ControlChanError {
            kind: ControlChanErrorKind::Utf8Error,
            source: Some(Box::new(err)),
        }
    }
}

impl From<ParseError> for ControlChanError {
    fn from(err: ParseError) -> ControlChanError {
        let kind = match err.kind() {
            ParseErrorKind::UnknownCommand { command } => ControlChanErrorKind::UnknownCommand { command: command.clone() },
            ParseErrorKind::InvalidUtf8 => ControlChanErrorKind::Utf8Error,
            ParseErrorKind::UnsupportedProtocolFamily => ControlChanErrorKind::UnsupportedProtocolFamily,
            ParseErrorKind::InvalidCommand | ParseErrorKind::InvalidEol => ControlChanErrorKind::InvalidCommand,
        };
        ControlChanError {
            kind,
            source: Some(Box::new(err)),
        }
    }
}
