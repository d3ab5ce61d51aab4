//! Grammar productions over a [`Tokenizer`], one function per ABNF rule in
//! §4.2. Every production is a try-parser: on failure it rolls the
//! tokenizer back to its entry checkpoint and returns `Err`, so a caller can
//! freely try alternatives.

use std::collections::HashMap;

use super::{AuthMechanism, Command, SyntaxError, TokenKind, Tokenizer};
use crate::mailbox::Mailbox;

/// Runs `f` over `t`, rolling back to the entry checkpoint if it fails.
/// Every production in this module is built on top of this so that failure
/// never leaves the tokenizer mid-token.
fn attempt<T>(t: &mut Tokenizer<'_>, f: impl FnOnce(&mut Tokenizer<'_>) -> Result<T, SyntaxError>) -> Result<T, SyntaxError> {
    let checkpoint = t.checkpoint();
    match f(t) {
        Ok(v) => Ok(v),
        Err(e) => {
            t.rollback(checkpoint);
            Err(e)
        }
    }
}

fn is_other(t: &mut Tokenizer<'_>, text: &str) -> bool {
    let tok = t.peek();
    tok.kind == TokenKind::Other && tok.text == text
}

/// Consumes a case-insensitive verb if the next token matches it exactly.
fn eat_keyword(t: &mut Tokenizer<'_>, kw: &str) -> bool {
    if t.peek().kind == TokenKind::Text && t.peek().text.eq_ignore_ascii_case(kw) {
        t.take();
        true
    } else {
        false
    }
}

fn expect_sp(t: &mut Tokenizer<'_>) -> Result<(), SyntaxError> {
    let mut seen = false;
    while t.peek().kind == TokenKind::Space {
        t.take();
        seen = true;
    }
    if seen {
        Ok(())
    } else {
        Err(SyntaxError::new("expected space"))
    }
}

fn skip_sp(t: &mut Tokenizer<'_>) {
    while t.peek().kind == TokenKind::Space {
        t.take();
    }
}

/// Trailing-garbage check shared by every production: skips optional
/// whitespace, then requires end-of-line. Any remaining non-space token is
/// a syntax error.
fn end_of_line(t: &mut Tokenizer<'_>) -> Result<(), SyntaxError> {
    skip_sp(t);
    if t.peek().is_none() {
        Ok(())
    } else {
        Err(SyntaxError::new(format!("unexpected trailing input: {:?}", t.remainder_preview())))
    }
}

fn bare_verb(t: &mut Tokenizer<'_>, kw: &str, cmd: Command) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, kw) {
            return Err(SyntaxError::new(format!("expected {kw}")));
        }
        end_of_line(t)?;
        Ok(cmd)
    })
}

pub fn parse_quit(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    bare_verb(t, "QUIT", Command::Quit)
}

pub fn parse_noop(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    bare_verb(t, "NOOP", Command::Noop)
}

pub fn parse_rset(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    bare_verb(t, "RSET", Command::Rset)
}

pub fn parse_data(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    bare_verb(t, "DATA", Command::Data)
}

pub fn parse_starttls(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    bare_verb(t, "STARTTLS", Command::StartTls)
}

pub fn parse_dbug(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    bare_verb(t, "DBUG", Command::Dbug)
}

pub fn parse_helo(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "HELO") {
            return Err(SyntaxError::new("expected HELO"));
        }
        expect_sp(t)?;
        let domain = domain(t)?;
        end_of_line(t)?;
        Ok(Command::Helo(domain))
    })
}

pub fn parse_ehlo(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "EHLO") {
            return Err(SyntaxError::new("expected EHLO"));
        }
        expect_sp(t)?;
        let domain = domain_or_address_literal(t)?;
        end_of_line(t)?;
        Ok(Command::Ehlo(domain))
    })
}

pub fn parse_mail(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "MAIL") {
            return Err(SyntaxError::new("expected MAIL"));
        }
        expect_sp(t)?;
        if !eat_keyword(t, "FROM") {
            return Err(SyntaxError::new("expected FROM"));
        }
        if !is_other(t, ":") {
            return Err(SyntaxError::new("expected ':'"));
        }
        t.take();
        skip_sp(t); // tolerated though non-RFC, per §4.2
        let from = reverse_path(t)?;
        let params = optional_params(t)?;
        end_of_line(t)?;
        Ok(Command::Mail { from, params })
    })
}

pub fn parse_rcpt(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "RCPT") {
            return Err(SyntaxError::new("expected RCPT"));
        }
        expect_sp(t)?;
        if !eat_keyword(t, "TO") {
            return Err(SyntaxError::new("expected TO"));
        }
        if !is_other(t, ":") {
            return Err(SyntaxError::new("expected ':'"));
        }
        t.take();
        skip_sp(t);
        let to = path(t)?;
        let _params = optional_params(t)?; // accepted but ignored, per §4.2
        end_of_line(t)?;
        Ok(Command::Rcpt { to })
    })
}

pub fn parse_auth(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "AUTH") {
            return Err(SyntaxError::new("expected AUTH"));
        }
        expect_sp(t)?;
        if t.peek().kind != TokenKind::Text {
            return Err(SyntaxError::new("expected mechanism name"));
        }
        let mech_text = t.take().text;
        let mechanism = AuthMechanism::parse(&mech_text)
            .ok_or_else(|| SyntaxError::new(format!("unsupported mechanism '{mech_text}'")))?;
        let mut initial_response = None;
        if t.peek().kind == TokenKind::Space {
            expect_sp(t)?;
            initial_response = Some(base64_token(t)?);
        }
        end_of_line(t)?;
        Ok(Command::Auth { mechanism, initial_response })
    })
}

fn optional_trailing_param(t: &mut Tokenizer<'_>) -> Result<Option<String>, SyntaxError> {
    skip_sp(t);
    if t.peek().is_none() {
        return Ok(None);
    }
    let mut out = String::new();
    while !t.peek().is_none() {
        out.push_str(&t.take().text);
    }
    Ok(Some(out))
}

pub fn parse_vrfy(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "VRFY") {
            return Err(SyntaxError::new("expected VRFY"));
        }
        Ok(Command::Vrfy(optional_trailing_param(t)?))
    })
}

pub fn parse_expn(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "EXPN") {
            return Err(SyntaxError::new("expected EXPN"));
        }
        Ok(Command::Expn(optional_trailing_param(t)?))
    })
}

pub fn parse_help(t: &mut Tokenizer<'_>) -> Result<Command, SyntaxError> {
    attempt(t, |t| {
        if !eat_keyword(t, "HELP") {
            return Err(SyntaxError::new("expected HELP"));
        }
        Ok(Command::Help(optional_trailing_param(t)?))
    })
}

// --- Reverse-Path / Path / Mailbox ------------------------------------------------

pub fn reverse_path(t: &mut Tokenizer<'_>) -> Result<Option<Mailbox>, SyntaxError> {
    attempt(t, |t| {
        let checkpoint = t.checkpoint();
        if is_other(t, "<") {
            t.take();
            if is_other(t, ">") {
                t.take();
                return Ok(None);
            }
            t.rollback(checkpoint);
        }
        Ok(Some(path(t)?))
    })
}

pub fn path(t: &mut Tokenizer<'_>) -> Result<Mailbox, SyntaxError> {
    attempt(t, |t| {
        if !is_other(t, "<") {
            return Err(SyntaxError::new("expected '<'"));
        }
        t.take();

        let checkpoint = t.checkpoint();
        if at_domain_list(t).is_ok() && is_other(t, ":") {
            t.take();
        } else {
            t.rollback(checkpoint);
        }

        let mbox = mailbox(t)?;
        if !is_other(t, ">") {
            return Err(SyntaxError::new("expected '>'"));
        }
        t.take();
        Ok(mbox)
    })
}

/// `At-domain-list`, parsed then discarded per RFC 5321 Appendix C.
fn at_domain_list(t: &mut Tokenizer<'_>) -> Result<(), SyntaxError> {
    attempt(t, |t| {
        if !is_other(t, "@") {
            return Err(SyntaxError::new("expected '@'"));
        }
        t.take();
        domain(t)?;
        loop {
            let checkpoint = t.checkpoint();
            if is_other(t, ",") {
                t.take();
                if is_other(t, "@") {
                    t.take();
                    if domain(t).is_ok() {
                        continue;
                    }
                }
            }
            t.rollback(checkpoint);
            break;
        }
        Ok(())
    })
}

pub fn mailbox(t: &mut Tokenizer<'_>) -> Result<Mailbox, SyntaxError> {
    attempt(t, |t| {
        let local = local_part(t)?;
        if !is_other(t, "@") {
            return Err(SyntaxError::new("expected '@'"));
        }
        t.take();
        let domain = domain_or_address_literal(t)?;
        Ok(Mailbox::new(local, domain))
    })
}

// --- Local-part --------------------------------------------------------------------

const ATEXT_PUNCTUATION: &[&str] =
    &["!", "#", "$", "%", "&", "'", "*", "+", "-", "/", "=", "?", "^", "_", "`", "{", "|", "}", "~"];

fn local_part(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| if is_other(t, "\"") { quoted_string(t) } else { dot_string(t) })
}

fn dot_string(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut out = atom(t)?;
        loop {
            let checkpoint = t.checkpoint();
            if is_other(t, ".") {
                t.take();
                match atom(t) {
                    Ok(a) => {
                        out.push('.');
                        out.push_str(&a);
                    }
                    Err(_) => {
                        t.rollback(checkpoint);
                        break;
                    }
                }
            } else {
                break;
            }
        }
        Ok(out)
    })
}

fn atom(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut out = String::new();
        loop {
            let tok = t.peek();
            let consume = matches!(tok.kind, TokenKind::Text | TokenKind::Number)
                || (tok.kind == TokenKind::Other && ATEXT_PUNCTUATION.contains(&tok.text.as_str()));
            if consume {
                out.push_str(&t.take().text);
            } else {
                break;
            }
        }
        if out.is_empty() {
            Err(SyntaxError::new("expected atom"))
        } else {
            Ok(out)
        }
    })
}

fn quoted_string(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        if !is_other(t, "\"") {
            return Err(SyntaxError::new("expected '\"'"));
        }
        t.take();
        let mut out = String::new();
        loop {
            if t.peek().is_none() {
                return Err(SyntaxError::new("unterminated quoted string"));
            }
            if is_other(t, "\"") {
                t.take();
                return Ok(out);
            }
            if is_other(t, "\\") {
                t.take();
                if t.peek().is_none() {
                    return Err(SyntaxError::new("dangling quoted-pair escape"));
                }
                out.push_str(&t.take().text);
            } else {
                out.push_str(&t.take().text);
            }
        }
    })
}

// --- Domain / address-literal -------------------------------------------------------

pub fn domain_or_address_literal(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| if is_other(t, "[") { address_literal(t) } else { domain(t) })
}

pub fn domain(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut out = sub_domain(t)?;
        loop {
            let checkpoint = t.checkpoint();
            if is_other(t, ".") {
                t.take();
                match sub_domain(t) {
                    Ok(label) => {
                        out.push('.');
                        out.push_str(&label);
                    }
                    Err(_) => {
                        t.rollback(checkpoint);
                        break;
                    }
                }
            } else {
                break;
            }
        }
        Ok(out)
    })
}

fn sub_domain(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut label = match t.peek().kind {
            TokenKind::Text | TokenKind::Number => t.take().text,
            _ => return Err(SyntaxError::new("expected domain label")),
        };
        loop {
            let tok = t.peek();
            if matches!(tok.kind, TokenKind::Text | TokenKind::Number) || is_other(t, "-") {
                label.push_str(&t.take().text);
            } else {
                break;
            }
        }
        if label.ends_with('-') {
            Err(SyntaxError::new("domain label ends in hyphen"))
        } else {
            Ok(label)
        }
    })
}

fn address_literal(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        if !is_other(t, "[") {
            return Err(SyntaxError::new("expected '['"));
        }
        t.take();

        let checkpoint = t.checkpoint();
        if eat_ipv6_tag(t) && is_other(t, ":") {
            t.take();
            let addr = ipv6_literal(t)?;
            if !is_other(t, "]") {
                return Err(SyntaxError::new("expected ']'"));
            }
            t.take();
            return Ok(format!("[IPv6:{addr}]"));
        }
        t.rollback(checkpoint);

        let addr = ipv4_literal(t)?;
        if !is_other(t, "]") {
            return Err(SyntaxError::new("expected ']'"));
        }
        t.take();
        Ok(format!("[{addr}]"))
    })
}

fn eat_ipv6_tag(t: &mut Tokenizer<'_>) -> bool {
    let checkpoint = t.checkpoint();
    if t.peek().kind == TokenKind::Text && t.peek().text.eq_ignore_ascii_case("ipv") {
        t.take();
        if t.peek().kind == TokenKind::Number && t.peek().text == "6" {
            t.take();
            return true;
        }
    }
    t.rollback(checkpoint);
    false
}

fn ipv4_literal(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut octets = Vec::with_capacity(4);
        for i in 0..4 {
            if i > 0 {
                if !is_other(t, ".") {
                    return Err(SyntaxError::new("expected '.'"));
                }
                t.take();
            }
            octets.push(snum(t)?.to_string());
        }
        Ok(octets.join("."))
    })
}

fn snum(t: &mut Tokenizer<'_>) -> Result<u8, SyntaxError> {
    if t.peek().kind != TokenKind::Number {
        return Err(SyntaxError::new("expected digits"));
    }
    let text = t.take().text;
    text.parse::<u16>()
        .ok()
        .filter(|&v| v <= 255)
        .map(|v| v as u8)
        .ok_or_else(|| SyntaxError::new(format!("octet '{text}' out of range 0-255")))
}

/// Permissive IPv6 literal acceptance: hex groups, `:` and `::`
/// compression, optional trailing embedded IPv4. Full RFC 4291
/// conformance is not load-bearing here (§9 leaves the exact grammar
/// open); malformed input is still rejected by requiring at least one
/// colon and only hex/`:`/`.` characters.
fn ipv6_literal(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut out = String::new();
        loop {
            let tok = t.peek();
            let ok = match tok.kind {
                TokenKind::Number => true,
                TokenKind::Text => tok.text.chars().all(|c| c.is_ascii_hexdigit()),
                TokenKind::Other => tok.text == ":" || tok.text == ".",
                TokenKind::Space | TokenKind::None => false,
            };
            if ok {
                out.push_str(&t.take().text);
            } else {
                break;
            }
        }
        if out.contains(':') {
            Ok(out)
        } else {
            Err(SyntaxError::new("invalid IPv6 literal"))
        }
    })
}

// --- base64 --------------------------------------------------------------------------

pub fn base64_token(t: &mut Tokenizer<'_>) -> Result<String, SyntaxError> {
    attempt(t, |t| {
        let mut out = String::new();
        loop {
            let tok = t.peek();
            let ok = matches!(tok.kind, TokenKind::Text | TokenKind::Number)
                || (tok.kind == TokenKind::Other && matches!(tok.text.as_str(), "+" | "/" | "="));
            if ok {
                out.push_str(&t.take().text);
            } else {
                break;
            }
        }
        if out.is_empty() || out.len() % 4 != 0 {
            Err(SyntaxError::new("base64 length not a multiple of 4"))
        } else {
            Ok(out)
        }
    })
}

// --- ESMTP parameters ----------------------------------------------------------------

fn optional_params(t: &mut Tokenizer<'_>) -> Result<HashMap<String, String>, SyntaxError> {
    if t.peek().kind != TokenKind::Space {
        return Ok(HashMap::new());
    }
    let checkpoint = t.checkpoint();
    skip_sp(t);
    if t.peek().is_none() {
        t.rollback(checkpoint);
        return Ok(HashMap::new());
    }
    match esmtp_params(t) {
        Ok(p) => Ok(p),
        Err(e) => {
            t.rollback(checkpoint);
            Err(e)
        }
    }
}

fn esmtp_params(t: &mut Tokenizer<'_>) -> Result<HashMap<String, String>, SyntaxError> {
    attempt(t, |t| {
        let mut map = HashMap::new();
        let (k, v) = esmtp_param(t)?;
        map.insert(k.to_ascii_uppercase(), v);
        loop {
            let checkpoint = t.checkpoint();
            if t.peek().kind == TokenKind::Space {
                skip_sp(t);
                match esmtp_param(t) {
                    Ok((k, v)) => {
                        map.insert(k.to_ascii_uppercase(), v);
                    }
                    Err(_) => {
                        t.rollback(checkpoint);
                        break;
                    }
                }
            } else {
                break;
            }
        }
        Ok(map)
    })
}

fn esmtp_param(t: &mut Tokenizer<'_>) -> Result<(String, String), SyntaxError> {
    attempt(t, |t| {
        let mut raw = String::new();
        loop {
            match t.peek().kind {
                TokenKind::Space | TokenKind::None => break,
                _ => raw.push_str(&t.take().text),
            }
        }
        if raw.is_empty() {
            return Err(SyntaxError::new("expected ESMTP parameter"));
        }
        match raw.split_once('=') {
            Some((k, v)) if !k.is_empty() => {
                validate_esmtp_value(v)?;
                Ok((k.to_string(), v.to_string()))
            }
            Some(_) => Err(SyntaxError::new("empty ESMTP parameter keyword")),
            None => Ok((raw, String::new())),
        }
    })
}

/// RFC range `33-60 / 62-126`; the source implementation's `33-66`
/// overlapping `62-127` is a typo per §9.
fn validate_esmtp_value(v: &str) -> Result<(), SyntaxError> {
    if v.bytes().all(|b| (33..=60).contains(&b) || (62..=126).contains(&b)) {
        Ok(())
    } else {
        Err(SyntaxError::new("invalid esmtp-value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T>(input: &str, f: impl FnOnce(&mut Tokenizer<'_>) -> Result<T, SyntaxError>) -> Result<T, SyntaxError> {
        let mut t = Tokenizer::new(input);
        f(&mut t)
    }

    #[test]
    fn helo_parses_domain() {
        let cmd = parse("HELO example.com", parse_helo).unwrap();
        assert!(matches!(cmd, Command::Helo(d) if d == "example.com"));
    }

    #[test]
    fn helo_rejects_trailing_garbage() {
        assert!(parse("HELO example.com junk", parse_helo).is_err());
    }

    #[test]
    fn mail_accepts_null_reverse_path() {
        let cmd = parse("MAIL FROM:<>", parse_mail).unwrap();
        match cmd {
            Command::Mail { from, .. } => assert!(from.is_none()),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn mail_parses_mailbox_and_params() {
        let cmd = parse("MAIL FROM:<a@b.com> SIZE=1024 BODY=8BITMIME", parse_mail).unwrap();
        match cmd {
            Command::Mail { from, params } => {
                assert_eq!(from.unwrap().to_string(), "a@b.com");
                assert_eq!(params.get("SIZE").map(String::as_str), Some("1024"));
                assert_eq!(params.get("BODY").map(String::as_str), Some("8BITMIME"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn mail_tolerates_space_after_colon() {
        let cmd = parse("MAIL FROM: <a@b.com>", parse_mail).unwrap();
        assert!(matches!(cmd, Command::Mail { from: Some(_), .. }));
    }

    #[test]
    fn rcpt_discards_at_domain_list() {
        let cmd = parse("RCPT TO:<@relay.example,@relay2.example:a@b.com>", parse_rcpt).unwrap();
        match cmd {
            Command::Rcpt { to } => assert_eq!(to.to_string(), "a@b.com"),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn ipv4_literal_rejects_octet_over_255() {
        assert!(parse("HELO [192.168.1.256]", parse_helo).is_err());
    }

    #[test]
    fn ipv4_literal_accepted_in_ehlo() {
        let cmd = parse("EHLO [192.168.1.1]", parse_ehlo).unwrap();
        assert!(matches!(cmd, Command::Ehlo(d) if d == "[192.168.1.1]"));
    }

    #[test]
    fn domain_rejects_trailing_hyphen() {
        assert!(parse("HELO foo-.com", parse_helo).is_err());
    }

    #[test]
    fn base64_rejects_length_not_multiple_of_four() {
        let mut t = Tokenizer::new("QUJD");
        assert!(base64_token(&mut t).is_ok());
        let mut t2 = Tokenizer::new("QUJDR");
        assert!(base64_token(&mut t2).is_err());
    }

    #[test]
    fn auth_plain_with_initial_response() {
        let cmd = parse("AUTH PLAIN AGFkbWluAHBhc3N3b3Jk", parse_auth).unwrap();
        match cmd {
            Command::Auth { mechanism, initial_response } => {
                assert_eq!(mechanism, AuthMechanism::Plain);
                assert_eq!(initial_response.as_deref(), Some("AGFkbWluAHBhc3N3b3Jk"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn quoted_local_part_supports_quoted_pair() {
        let cmd = parse(r#"RCPT TO:<"a\"b"@c.com>"#, parse_rcpt).unwrap();
        match cmd {
            Command::Rcpt { to } => assert_eq!(to.local, "a\"b"),
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn failed_production_does_not_move_cursor() {
        let mut t = Tokenizer::new("RCPT TO:<a@b.com>");
        let checkpoint = t.checkpoint();
        assert!(parse_helo(&mut t).is_err());
        assert_eq!(t.checkpoint(), checkpoint);
    }

    #[test]
    fn ipv6_literal_accepted_when_enabled() {
        let cmd = parse("EHLO [IPv6:2001:db8::1]", parse_ehlo).unwrap();
        assert!(matches!(cmd, Command::Ehlo(d) if d == "[IPv6:2001:db8::1]"));
    }
}
