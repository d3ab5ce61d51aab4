//! Tokenizer for a single CRLF-stripped SMTP line.
//!
//! Splits the line into maximal runs of letters (`Text`) or digits
//! (`Number`), single-character `Space` tokens (SP or HTAB), single-byte
//! `Other` tokens for everything else, and a terminal `None` sentinel once
//! the line is exhausted. Grammar productions in [`crate::parser::grammar`]
//! consume this stream with a checkpoint/rollback discipline so a failed
//! sub-production never leaves the cursor advanced.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Number,
    Space,
    Other,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }

    fn none() -> Self {
        Self { kind: TokenKind::None, text: String::new() }
    }

    pub fn is_none(&self) -> bool {
        self.kind == TokenKind::None
    }
}

/// A restartable, single-lookahead token stream over one line's bytes.
pub struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
    peeked: Option<(Token, usize)>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { bytes: line.as_bytes(), pos: 0, peeked: None }
    }

    /// Saves the current cursor position for a later `rollback`.
    pub fn checkpoint(&self) -> usize {
        self.pos
    }

    /// Restores a previously saved cursor position, discarding any cached
    /// lookahead token so the next `peek` recomputes from the new position.
    pub fn rollback(&mut self, checkpoint: usize) {
        self.pos = checkpoint;
        self.peeked = None;
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> &Token {
        if self.peeked.is_none() {
            let (tok, next_pos) = self.scan_next();
            self.peeked = Some((tok, next_pos));
        }
        &self.peeked.as_ref().unwrap().0
    }

    /// Consumes and returns the next token.
    pub fn take(&mut self) -> Token {
        if let Some((tok, next_pos)) = self.peeked.take() {
            self.pos = next_pos;
            return tok;
        }
        let (tok, next_pos) = self.scan_next();
        self.pos = next_pos;
        tok
    }

    /// A best-effort diagnostic of the remainder of the line, for enriching
    /// `500` error text. Not load-bearing for correctness.
    pub fn remainder_preview(&self) -> &str {
        std::str::from_utf8(&self.bytes[self.pos.min(self.bytes.len())..]).unwrap_or("")
    }

    fn scan_next(&self) -> (Token, usize) {
        let bytes = self.bytes;
        let start = self.pos;
        if start >= bytes.len() {
            return (Token::none(), start);
        }

        let b = bytes[start];
        if b.is_ascii_alphabetic() {
            let mut end = start + 1;
            while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
                end += 1;
            }
            (Token::new(TokenKind::Text, lossy(&bytes[start..end])), end)
        } else if b.is_ascii_digit() {
            let mut end = start + 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            (Token::new(TokenKind::Number, lossy(&bytes[start..end])), end)
        } else if b == b' ' || b == b'\t' {
            (Token::new(TokenKind::Space, lossy(&bytes[start..start + 1])), start + 1)
        } else {
            (Token::new(TokenKind::Other, lossy(&bytes[start..start + 1])), start + 1)
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joining_token_text_reproduces_input() {
        let input = "MAIL FROM:<a@b.com> SIZE=100";
        let mut t = Tokenizer::new(input);
        let mut joined = String::new();
        loop {
            let tok = t.take();
            if tok.is_none() {
                break;
            }
            joined.push_str(&tok.text);
        }
        assert_eq!(joined, input);
    }

    #[test]
    fn classifies_runs_and_singletons() {
        let mut t = Tokenizer::new("AB12 <>");
        assert_eq!(t.take(), Token::new(TokenKind::Text, "AB"));
        assert_eq!(t.take(), Token::new(TokenKind::Number, "12"));
        assert_eq!(t.take(), Token::new(TokenKind::Space, " "));
        assert_eq!(t.take(), Token::new(TokenKind::Other, "<"));
        assert_eq!(t.take(), Token::new(TokenKind::Other, ">"));
        assert!(t.take().is_none());
    }

    #[test]
    fn rollback_restores_position_exactly() {
        let mut t = Tokenizer::new("HELO x");
        let cp = t.checkpoint();
        let _ = t.take();
        let _ = t.take();
        t.rollback(cp);
        assert_eq!(t.take(), Token::new(TokenKind::Text, "HELO"));
    }

    #[test]
    fn peek_does_not_advance() {
        let mut t = Tokenizer::new("AB");
        let first = t.peek().clone();
        let second = t.peek().clone();
        assert_eq!(first, second);
        assert_eq!(t.take(), first);
    }

    #[test]
    fn empty_line_is_immediately_none() {
        let mut t = Tokenizer::new("");
        assert!(t.take().is_none());
        assert!(t.take().is_none());
    }
}
