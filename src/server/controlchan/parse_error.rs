use std::result;
use thiserror::Error;

/// The error type returned by the command parser.
#[derive(Debug, PartialEq, Eq, Clone, Error)]
#[error("{kind}")]
pub struct ParseError {
    kind: ParseErrorKind,
}

/// A list specifying categories of parse errors.
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum ParseErrorKind {
    /// The client issued a command we don't know about.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// The command that we don't know about.
        command: String,
    },
    /// The client issued a command we know, but with an invalid parameter
    /// (e.g. `PORT` with a port of 0).
    #[error("invalid command parameter")]
    InvalidCommand,
    /// Non-UTF8 character encountered in the command.
    #[error("non-UTF8 character in command")]
    InvalidUtf8,
    /// The line was not terminated the way RFC 959 wants it.
    #[error("invalid end-of-line")]
    InvalidEol,
    /// An EPRT argument asked for an address family we do not serve, e.g.
    /// IPv6.
    #[error("unsupported network protocol family")]
    UnsupportedProtocolFamily,
}

impl ParseError {
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

impl From<ParseErrorKind> for ParseError {
    fn from(kind: ParseErrorKind) -> ParseError {
        ParseError { kind }
    }
}

impl From<std::str::Utf8Error> for ParseError {
    fn from(_: std::str::Utf8Error) -> ParseError {
        ParseError {
            kind: ParseErrorKind::InvalidUtf8,
        }
    }
}

pub type Result<T> = result::Result<T, ParseError>;
