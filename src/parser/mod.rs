//! The SMTP command parser: tokenizer plus a hand-written recursive-descent
//! grammar producing [`Command`] values.

pub mod grammar;
pub mod token;

pub use token::{Token, TokenKind, Tokenizer};

use std::collections::HashMap;

use crate::mailbox::Mailbox;

/// The two ESMTP AUTH mechanisms this crate implements (§6 minimum set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
}

impl AuthMechanism {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMechanism::Plain => "PLAIN",
            AuthMechanism::Login => "LOGIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(AuthMechanism::Plain),
            "LOGIN" => Some(AuthMechanism::Login),
            _ => None,
        }
    }
}

/// A fully parsed command line, the output of a successful grammar
/// production and the input to [`crate::command`] execution.
#[derive(Debug, Clone)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    Mail { from: Option<Mailbox>, params: HashMap<String, String> },
    Rcpt { to: Mailbox },
    Data,
    Rset,
    Noop,
    Quit,
    StartTls,
    /// Undocumented diagnostic verb referenced by the source implementation's
    /// parser surface (`TryMakeDbug`); always answers `502`.
    Dbug,
    Auth { mechanism: AuthMechanism, initial_response: Option<String> },
    Vrfy(Option<String>),
    Expn(Option<String>),
    Help(Option<String>),
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Helo(_) => "HELO",
            Command::Ehlo(_) => "EHLO",
            Command::Mail { .. } => "MAIL",
            Command::Rcpt { .. } => "RCPT",
            Command::Data => "DATA",
            Command::Rset => "RSET",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
            Command::StartTls => "STARTTLS",
            Command::Dbug => "DBUG",
            Command::Auth { .. } => "AUTH",
            Command::Vrfy(_) => "VRFY",
            Command::Expn(_) => "EXPN",
            Command::Help(_) => "HELP",
        }
    }
}

/// A precise syntax failure from a grammar production.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Returns the leading word of a command line, uppercased, for state-table
/// lookup. Does not consume from a caller's tokenizer; operates on a fresh
/// one since keyword lookup precedes any parsing attempt.
pub fn leading_keyword(line: &str) -> String {
    let mut t = Tokenizer::new(line);
    if t.peek().kind == TokenKind::Text {
        t.take().text.to_ascii_uppercase()
    } else {
        String::new()
    }
}
