//! Lexer.
//!
//! Holds a two-slot lookahead cache (`current`, `next`), the way a
//! `tokenCache[2]` would. `advance` rotates `next` into `current` and
//! refills `next` from the position immediately after the (new) current
//! token's span — never from wherever the cursor happened to land, so
//! re-lexing is always anchored to a token boundary.

use xpbc_util::{CompileError, Span};

use crate::cursor::Cursor;
use crate::token::{Token, TokenKind};

pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    current: Token,
    next: Token,
}

impl<'a> Lexer<'a> {
    /// Builds a lexer over `source` and fills both lookahead slots by
    /// seeking to offset 0 and scanning twice.
    pub fn new(source: &'a [u8]) -> Result<Self, CompileError> {
        let mut cursor = Cursor::new(source);
        let current = Self::scan_token(&mut cursor)?;
        let next_start = current.span.end();
        cursor.seek(next_start);
        let next = Self::scan_token(&mut cursor)?;
        Ok(Self {
            cursor,
            current,
            next,
        })
    }

    pub fn current(&self) -> Token {
        self.current
    }

    pub fn next_lookahead(&self) -> Token {
        self.next
    }

    /// Rotates `next` into `current` and rescans a fresh `next`.
    pub fn advance(&mut self) -> Result<(), CompileError> {
        self.current = self.next;
        let next_start = self.current.span.end();
        self.cursor.seek(next_start);
        self.next = Self::scan_token(&mut self.cursor)?;
        Ok(())
    }

    /// Scans exactly one token starting wherever `cursor` is positioned,
    /// leaving the cursor just past the token it returns: skip whitespace,
    /// classify by first byte (symbol, quote, digit, identifier-start),
    /// then consume the rest of that token's lexeme.
    fn scan_token(cursor: &mut Cursor<'_>) -> Result<Token, CompileError> {
        let separated_from_previous = Self::skip_whitespace(cursor);
        let start = cursor.position();

        let Some(first) = cursor.peek() else {
            return Ok(Token::new(
                TokenKind::Eof,
                Span::new(start, 0),
                separated_from_previous,
            ));
        };

        if let Some(kind) = TokenKind::from_symbol_byte(first) {
            cursor.advance();
            return Ok(Token::new(
                kind,
                Span::new(start, 1),
                separated_from_previous,
            ));
        }

        if first == b'"' || first == b'\'' {
            cursor.advance();
            Self::skip_text_literal(cursor, first)?;
            let kind = if first == b'"' {
                TokenKind::StringLiteral
            } else {
                TokenKind::CharacterLiteral
            };
            let length = cursor.position() - start;
            return Ok(Token::new(kind, Span::new(start, length), separated_from_previous));
        }

        if first.is_ascii_digit() {
            let kind = Self::skip_number_literal(cursor, start)?;
            let length = cursor.position() - start;
            return Ok(Token::new(kind, Span::new(start, length), separated_from_previous));
        }

        if first.is_ascii_alphabetic() || first == b'_' {
            Self::skip_identifier(cursor);
            let length = cursor.position() - start;
            return Ok(Token::new(
                TokenKind::Identifier,
                Span::new(start, length),
                separated_from_previous,
            ));
        }

        cursor.advance();
        Ok(Token::new(
            TokenKind::Undefined,
            Span::new(start, 1),
            separated_from_previous,
        ))
    }

    /// Skips ASCII whitespace, reporting whether any was skipped.
    fn skip_whitespace(cursor: &mut Cursor<'_>) -> bool {
        let mut skipped = false;
        while let Some(b) = cursor.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            cursor.advance();
            skipped = true;
        }
        skipped
    }

    /// Consumes up to and including the matching quote, honoring `\` as an
    /// escape-next-character marker (so `\\` does not prematurely close the
    /// literal). Stops at EOF without error — an unterminated literal simply
    /// ends up being as long as the rest of the file, matching the
    /// reference tokeniser's `c == EOF` early-exit.
    fn skip_text_literal(cursor: &mut Cursor<'_>, quote: u8) -> Result<(), CompileError> {
        let mut escape = false;
        loop {
            let Some(b) = cursor.advance() else {
                return Ok(());
            };
            if b == quote && !escape {
                return Ok(());
            } else if b == b'\\' {
                escape = !escape;
            } else {
                escape = false;
            }
        }
    }

    /// Consumes a number literal: an optional `0x`/`0b` base prefix, then
    /// digits and at most one `.`. A decimal point together with a base
    /// prefix is fatal. `cursor` is positioned on the literal's first digit
    /// on entry.
    fn skip_number_literal(cursor: &mut Cursor<'_>, start: usize) -> Result<TokenKind, CompileError> {
        let first = cursor.advance().expect("caller confirmed a leading digit");
        let mut based = false;
        if first == b'0' {
            if matches!(cursor.peek(), Some(b'x') | Some(b'b')) {
                based = true;
                cursor.advance();
            }
        }

        let mut decimal = false;
        loop {
            match cursor.peek() {
                Some(b) if b.is_ascii_digit() => {
                    cursor.advance();
                }
                Some(b'.') => {
                    decimal = true;
                    cursor.advance();
                }
                _ => break,
            }
        }

        if decimal && based {
            return Err(CompileError::Lex {
                offset: start,
                message: "number literal combines a base prefix with a decimal point".into(),
            });
        }

        Ok(if decimal {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntegerLiteral
        })
    }

    fn skip_identifier(cursor: &mut Cursor<'_>) {
        while let Some(b) = cursor.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                cursor.advance();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &[u8]) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source).unwrap();
        let mut out = vec![lexer.current().kind];
        loop {
            if out.last() == Some(&TokenKind::Eof) {
                break;
            }
            lexer.advance().unwrap();
            out.push(lexer.current().kind);
        }
        out
    }

    #[test]
    fn empty_main_tokenizes() {
        use TokenKind::*;
        assert_eq!(
            kinds(b"main():{ }"),
            vec![Identifier, ParenLeft, ParenRight, Colon, BraceLeft, BraceRight, Eof]
        );
    }

    #[test]
    fn string_literal_span_includes_both_quotes() {
        let mut lexer = Lexer::new(b"\"hi\"").unwrap();
        let tok = lexer.current();
        assert_eq!(tok.kind, TokenKind::StringLiteral);
        assert_eq!(tok.span.length, 4);
    }

    #[test]
    fn escaped_quote_does_not_end_string_literal() {
        let mut lexer = Lexer::new(b"\"a\\\"b\"").unwrap();
        let tok = lexer.current();
        assert_eq!(tok.kind, TokenKind::StringLiteral);
        assert_eq!(tok.span.length, 6);
    }

    #[test]
    fn double_backslash_is_not_mistaken_for_an_escaped_quote() {
        // "\\" -- a single escaped backslash, so the following quote closes.
        let mut lexer = Lexer::new(br#""\\""#).unwrap();
        let tok = lexer.current();
        assert_eq!(tok.kind, TokenKind::StringLiteral);
        assert_eq!(tok.span.length, 4);
    }

    #[test]
    fn base_prefix_with_decimal_point_is_fatal() {
        let err = Lexer::new(b"0x1.5").unwrap_err();
        assert!(matches!(err, CompileError::Lex { offset: 0, .. }));
    }

    #[test]
    fn hex_prefixed_literal_is_integer() {
        // Matches the original tokeniser: only decimal digits are consumed
        // after the base prefix, so `0x15` lexes whole but `0x1F` would stop
        // before the non-decimal `F`.
        let lexer = Lexer::new(b"0x15;").unwrap();
        assert_eq!(lexer.current().kind, TokenKind::IntegerLiteral);
        assert_eq!(lexer.current().span.length, 4);
    }

    #[test]
    fn float_literal_has_decimal_point() {
        let lexer = Lexer::new(b"3.14;").unwrap();
        assert_eq!(lexer.current().kind, TokenKind::FloatLiteral);
        assert_eq!(lexer.current().span.length, 4);
    }

    #[test]
    fn lookahead_exposes_current_and_next() {
        let lexer = Lexer::new(b"foo(").unwrap();
        assert_eq!(lexer.current().kind, TokenKind::Identifier);
        assert_eq!(lexer.next_lookahead().kind, TokenKind::ParenLeft);
    }

    #[test]
    fn separated_from_previous_tracks_whitespace() {
        let mut lexer = Lexer::new(b"a b").unwrap();
        assert!(!lexer.current().separated_from_previous);
        lexer.advance().unwrap();
        assert!(lexer.current().separated_from_previous);
    }

    #[test]
    fn round_trip_slices_reproduce_lexemes() {
        let source: &[u8] = b"main(): { print(\"hi\"); }";
        let map = xpbc_util::SourceMap::new(source.to_vec());
        let mut lexer = Lexer::new(source).unwrap();
        loop {
            let tok = lexer.current();
            if tok.kind == TokenKind::Eof {
                break;
            }
            let slice = map.slice(tok.span);
            assert_eq!(slice.len(), tok.span.length);
            lexer.advance().unwrap();
        }
    }
}
