//! The SMTP session state machine: a declarative `(state, keyword)` table
//! mapping to a parser production and a next-state function, per §4.4.

use crate::parser::grammar;
use crate::parser::{Command, SyntaxError, Tokenizer};

/// Session protocol state. `None` is the momentary pre-banner state; the
/// session loop moves to `Initialized` immediately after the greeting is
/// written and never returns to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    None,
    Initialized,
    WaitingForMail,
    WithinTransaction,
    CanAcceptData,
}

type ParseFn = fn(&mut Tokenizer<'_>) -> Result<Command, SyntaxError>;
type NextStateFn = fn(State) -> State;

struct Entry {
    state: State,
    keyword: &'static str,
    parse: ParseFn,
    next_state: NextStateFn,
}

fn stay(state: State) -> State {
    state
}

fn to_waiting_for_mail(_state: State) -> State {
    State::WaitingForMail
}

fn to_within_transaction(_state: State) -> State {
    State::WithinTransaction
}

fn to_can_accept_data(_state: State) -> State {
    State::CanAcceptData
}

fn to_initialized(_state: State) -> State {
    State::Initialized
}

/// STARTTLS and AUTH are treated as available in every post-banner state,
/// per §9's resolution of the source parser's incomplete wiring.
const POST_BANNER_STATES: &[State] =
    &[State::Initialized, State::WaitingForMail, State::WithinTransaction, State::CanAcceptData];

static STATE_TABLE: &[Entry] = &[
    // HELO/EHLO: valid in any post-banner state, always reset into WaitingForMail.
    Entry { state: State::Initialized, keyword: "HELO", parse: grammar::parse_helo, next_state: to_waiting_for_mail },
    Entry { state: State::WaitingForMail, keyword: "HELO", parse: grammar::parse_helo, next_state: to_waiting_for_mail },
    Entry { state: State::WithinTransaction, keyword: "HELO", parse: grammar::parse_helo, next_state: to_waiting_for_mail },
    Entry { state: State::CanAcceptData, keyword: "HELO", parse: grammar::parse_helo, next_state: to_waiting_for_mail },
    Entry { state: State::Initialized, keyword: "EHLO", parse: grammar::parse_ehlo, next_state: to_waiting_for_mail },
    Entry { state: State::WaitingForMail, keyword: "EHLO", parse: grammar::parse_ehlo, next_state: to_waiting_for_mail },
    Entry { state: State::WithinTransaction, keyword: "EHLO", parse: grammar::parse_ehlo, next_state: to_waiting_for_mail },
    Entry { state: State::CanAcceptData, keyword: "EHLO", parse: grammar::parse_ehlo, next_state: to_waiting_for_mail },

    // MAIL: WaitingForMail normally; WithinTransaction recycles through RSET semantics (§9).
    Entry { state: State::WaitingForMail, keyword: "MAIL", parse: grammar::parse_mail, next_state: to_within_transaction },
    Entry { state: State::WithinTransaction, keyword: "MAIL", parse: grammar::parse_mail, next_state: to_within_transaction },

    // RCPT: WithinTransaction or CanAcceptData (repeatable).
    Entry { state: State::WithinTransaction, keyword: "RCPT", parse: grammar::parse_rcpt, next_state: to_can_accept_data },
    Entry { state: State::CanAcceptData, keyword: "RCPT", parse: grammar::parse_rcpt, next_state: to_can_accept_data },

    // DATA: only once at least one recipient is present.
    Entry { state: State::CanAcceptData, keyword: "DATA", parse: grammar::parse_data, next_state: to_waiting_for_mail },
];

/// Commands valid in every post-banner state regardless of transaction
/// progress: NOOP, QUIT, RSET, STARTTLS, AUTH, VRFY, EXPN, HELP, DBUG.
fn universal_entry(_state: State, keyword: &str) -> Option<(ParseFn, NextStateFn)> {
    let (parse, next_state): (ParseFn, NextStateFn) = match keyword {
        "NOOP" => (grammar::parse_noop, stay),
        "QUIT" => (grammar::parse_quit, stay),
        "RSET" => (grammar::parse_rset, to_waiting_for_mail),
        "STARTTLS" => (grammar::parse_starttls, to_initialized),
        "AUTH" => (grammar::parse_auth, stay),
        "VRFY" => (grammar::parse_vrfy, stay),
        "EXPN" => (grammar::parse_expn, stay),
        "HELP" => (grammar::parse_help, stay),
        "DBUG" => (grammar::parse_dbug, stay),
        _ => return None,
    };
    Some((parse, next_state))
}

/// Looks up the `(parse, next_state)` pair for a `(state, keyword)`
/// combination. Lookup is case-insensitive on the keyword (callers pass an
/// already-uppercased keyword, see [`crate::parser::leading_keyword`]).
pub fn lookup(state: State, keyword: &str) -> Option<(ParseFn, NextStateFn)> {
    if let Some(entry) = STATE_TABLE.iter().find(|e| e.state == state && e.keyword == keyword) {
        return Some((entry.parse, entry.next_state));
    }
    if POST_BANNER_STATES.contains(&state) {
        if let Some(entry) = universal_entry(state, keyword) {
            return Some(entry);
        }
    }
    None
}

/// The keywords valid in `state`, for the `500 expected ...` diagnostic.
pub fn valid_keywords(state: State) -> Vec<&'static str> {
    let mut keywords: Vec<&'static str> =
        STATE_TABLE.iter().filter(|e| e.state == state).map(|e| e.keyword).collect();
    if POST_BANNER_STATES.contains(&state) {
        keywords.extend_from_slice(&["NOOP", "QUIT", "RSET", "STARTTLS", "AUTH", "VRFY", "EXPN", "HELP"]);
    }
    keywords.sort_unstable();
    keywords.dedup();
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rcpt_before_mail_is_not_in_table() {
        assert!(lookup(State::WaitingForMail, "RCPT").is_none());
    }

    #[test]
    fn data_requires_recipient_state() {
        assert!(lookup(State::WithinTransaction, "DATA").is_none());
        assert!(lookup(State::CanAcceptData, "DATA").is_some());
    }

    #[test]
    fn starttls_and_auth_available_everywhere_post_banner() {
        for state in POST_BANNER_STATES {
            assert!(lookup(*state, "STARTTLS").is_some());
            assert!(lookup(*state, "AUTH").is_some());
        }
        assert!(lookup(State::None, "STARTTLS").is_none());
    }

    #[test]
    fn mail_recycles_within_transaction() {
        let (_, next) = lookup(State::WithinTransaction, "MAIL").unwrap();
        assert_eq!(next(State::WithinTransaction), State::WithinTransaction);
    }

    #[test]
    fn valid_keywords_lists_whats_legal_after_rcpt() {
        let keywords = valid_keywords(State::CanAcceptData);
        assert!(keywords.contains(&"DATA"));
        assert!(keywords.contains(&"RCPT"));
        assert!(keywords.contains(&"QUIT"));
        assert!(!keywords.contains(&"MAIL"));
    }
}
