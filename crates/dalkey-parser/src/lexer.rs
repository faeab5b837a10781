//! Lexer (scanner) for the ECMAScript surface the interpreter accepts.
//!
//! The lexer is called on-demand by the parser, one token at a time, which
//! keeps tokenization context-sensitive: the parser decides whether a `/`
//! is division or the start of a regex literal and asks the lexer to
//! re-scan accordingly.
//!
//! Lexical errors never abort scanning: the lexer records them in its own
//! error list (drained by the parser after every advance) and produces an
//! `ILLEGAL` token so parsing can continue.

use unicode_xid::UnicodeXID;

use crate::error::{Error, ERR_UNEXPECTED_END_OF_INPUT, ERR_UNEXPECTED_ESCAPE};
use crate::position::{position_in, Idx};
use crate::token::{keyword_from_str, Token, TokenKind};

pub(crate) const ERR_UNTERMINATED_REGEXP: &str = "Invalid regular expression: missing /";

/// The lexer state.
pub(crate) struct Lexer<'a> {
    filename: &'a str,
    source: &'a str,
    base: u32,

    /// The current character, `None` at end of input.
    chr: Option<char>,
    /// Byte offset of the current character.
    chr_offset: usize,
    /// Byte offset after the current character.
    offset: usize,

    /// Whether the previous token may end a statement; consulted when the
    /// input ends so a final statement still gets its implicit terminator.
    insert_semicolon: bool,
    /// Latched when a line terminator precedes the current token. The
    /// parser reads and clears this to apply automatic semicolon insertion.
    pub(crate) implicit_semicolon: bool,

    /// Lexical errors, drained by the parser after each advance.
    pub(crate) errors: Vec<Error>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(filename: &'a str, source: &'a str, base: u32) -> Self {
        let mut lexer = Self {
            filename,
            source,
            base,
            chr: None,
            chr_offset: 0,
            offset: 0,
            insert_semicolon: false,
            implicit_semicolon: false,
            errors: Vec::new(),
        };
        lexer.read();
        lexer
    }

    /// Get the next token.
    pub(crate) fn next_token(&mut self) -> Token {
        self.implicit_semicolon = false;

        loop {
            self.skip_whitespace();

            let start = self.chr_offset;
            let idx = self.idx_of(start);

            let chr = match self.chr {
                Some(chr) => chr,
                None => {
                    if self.insert_semicolon {
                        self.insert_semicolon = false;
                        self.implicit_semicolon = true;
                    }
                    return Token::new(TokenKind::Eof, String::new(), idx);
                }
            };

            if is_identifier_start(chr) {
                return self.scan_word(start);
            }
            if chr.is_ascii_digit() {
                self.insert_semicolon = true;
                let kind = self.scan_number(false);
                return Token::new(kind, self.source[start..self.chr_offset].to_string(), idx);
            }

            self.read();
            let kind = match chr {
                '\r' | '\n' | '\u{2028}' | '\u{2029}' => {
                    self.insert_semicolon = false;
                    self.implicit_semicolon = true;
                    continue;
                }

                '"' | '\'' => {
                    self.insert_semicolon = true;
                    let (kind, literal) =
                        match self.scan_string_raw(start, ERR_UNEXPECTED_END_OF_INPUT) {
                            Ok(literal) => (TokenKind::String, literal),
                            Err(()) => (TokenKind::Illegal, String::new()),
                        };
                    return Token::new(kind, literal, idx);
                }

                '.' => {
                    if self.chr.is_some_and(|c| c.is_ascii_digit()) {
                        self.insert_semicolon = true;
                        let kind = self.scan_number(true);
                        return Token::new(
                            kind,
                            self.source[start..self.chr_offset].to_string(),
                            idx,
                        );
                    }
                    TokenKind::Dot
                }

                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                ';' => TokenKind::Semicolon,
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,
                '?' => TokenKind::Question,
                '~' => TokenKind::Tilde,

                '+' => match self.chr {
                    Some('+') => {
                        self.read();
                        TokenKind::PlusPlus
                    }
                    Some('=') => {
                        self.read();
                        TokenKind::PlusEq
                    }
                    _ => TokenKind::Plus,
                },
                '-' => match self.chr {
                    Some('-') => {
                        self.read();
                        TokenKind::MinusMinus
                    }
                    Some('=') => {
                        self.read();
                        TokenKind::MinusEq
                    }
                    _ => TokenKind::Minus,
                },
                '*' => self.select_eq(TokenKind::Star, TokenKind::StarEq),
                '%' => self.select_eq(TokenKind::Percent, TokenKind::PercentEq),
                '^' => self.select_eq(TokenKind::Caret, TokenKind::CaretEq),

                '/' => match self.chr {
                    Some('/') => {
                        self.skip_line_comment();
                        continue;
                    }
                    Some('*') => {
                        self.skip_block_comment();
                        continue;
                    }
                    _ => self.select_eq(TokenKind::Slash, TokenKind::SlashEq),
                },

                '=' => match self.chr {
                    Some('=') => {
                        self.read();
                        if self.chr == Some('=') {
                            self.read();
                            TokenKind::EqEqEq
                        } else {
                            TokenKind::EqEq
                        }
                    }
                    _ => TokenKind::Eq,
                },
                '!' => match self.chr {
                    Some('=') => {
                        self.read();
                        if self.chr == Some('=') {
                            self.read();
                            TokenKind::BangEqEq
                        } else {
                            TokenKind::BangEq
                        }
                    }
                    _ => TokenKind::Bang,
                },

                '<' => match self.chr {
                    Some('<') => {
                        self.read();
                        self.select_eq(TokenKind::LtLt, TokenKind::LtLtEq)
                    }
                    Some('=') => {
                        self.read();
                        TokenKind::LtEq
                    }
                    _ => TokenKind::Lt,
                },
                '>' => match self.chr {
                    Some('>') => {
                        self.read();
                        match self.chr {
                            Some('>') => {
                                self.read();
                                self.select_eq(TokenKind::GtGtGt, TokenKind::GtGtGtEq)
                            }
                            Some('=') => {
                                self.read();
                                TokenKind::GtGtEq
                            }
                            _ => TokenKind::GtGt,
                        }
                    }
                    Some('=') => {
                        self.read();
                        TokenKind::GtEq
                    }
                    _ => TokenKind::Gt,
                },

                '&' => match self.chr {
                    Some('&') => {
                        self.read();
                        TokenKind::AmpAmp
                    }
                    Some('=') => {
                        self.read();
                        TokenKind::AmpEq
                    }
                    _ => TokenKind::Amp,
                },
                '|' => match self.chr {
                    Some('|') => {
                        self.read();
                        TokenKind::PipePipe
                    }
                    Some('=') => {
                        self.read();
                        TokenKind::PipeEq
                    }
                    _ => TokenKind::Pipe,
                },

                _ => {
                    self.error_at(start, format!("Unexpected token {}", TokenKind::Illegal.as_str()));
                    TokenKind::Illegal
                }
            };

            self.insert_semicolon = matches!(
                kind,
                TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::PlusPlus
                    | TokenKind::MinusMinus
            );
            return Token::new(kind, String::new(), idx);
        }
    }

    /// Re-scan a regex literal body starting at the already-consumed `/`
    /// (or `/=`) token at `start`. On success the cursor sits just past the
    /// closing `/` and the returned slice includes both delimiters.
    pub(crate) fn scan_regexp(&mut self, start: usize) -> Result<String, ()> {
        self.scan_string_raw(start, ERR_UNTERMINATED_REGEXP)
    }

    /// Scan the flag set immediately following a regex literal: the run of
    /// identifier-part characters starting at the cursor, with no
    /// intervening whitespace.
    pub(crate) fn scan_regexp_flags(&mut self) -> String {
        let start = self.chr_offset;
        while self
            .chr
            .is_some_and(|c| c != '\\' && is_identifier_part(c))
        {
            self.read();
        }
        self.source[start..self.chr_offset].to_string()
    }

    /// Byte offset of the current (unconsumed) character.
    pub(crate) fn current_offset(&self) -> usize {
        self.chr_offset
    }

    // === Cursor ===

    fn read(&mut self) {
        if self.offset < self.source.len() {
            self.chr_offset = self.offset;
            match self.source[self.offset..].chars().next() {
                Some(chr) => {
                    self.offset += chr.len_utf8();
                    self.chr = Some(chr);
                }
                None => self.chr = None,
            }
        } else {
            self.chr_offset = self.source.len();
            self.chr = None;
        }
    }

    fn idx_of(&self, offset: usize) -> Idx {
        Idx(self.base + offset as u32)
    }

    fn error_at(&mut self, offset: usize, message: impl Into<String>) {
        let position = position_in(self.filename, self.source, offset);
        self.errors.push(Error::new(message, position));
    }

    fn select_eq(&mut self, plain: TokenKind, assign: TokenKind) -> TokenKind {
        if self.chr == Some('=') {
            self.read();
            assign
        } else {
            plain
        }
    }

    // === Whitespace and comments ===

    fn skip_whitespace(&mut self) {
        while let Some(chr) = self.chr {
            match chr {
                // Line terminators are handled by the scan loop so the
                // implicit-semicolon latch can be set.
                '\r' | '\n' | '\u{2028}' | '\u{2029}' => break,
                ' ' | '\t' | '\u{000b}' | '\u{000c}' | '\u{00a0}' | '\u{feff}' => self.read(),
                chr if chr.is_whitespace() => self.read(),
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        // Cursor sits at the second `/`; run to (not past) the terminator.
        while let Some(chr) = self.chr {
            if is_line_terminator(chr) {
                break;
            }
            self.read();
        }
    }

    fn skip_block_comment(&mut self) {
        self.read(); // consume `*`
        let mut newline = false;
        loop {
            match self.chr {
                None => {
                    self.error_at(self.chr_offset, ERR_UNEXPECTED_END_OF_INPUT);
                    break;
                }
                Some('*') => {
                    self.read();
                    if self.chr == Some('/') {
                        self.read();
                        break;
                    }
                }
                Some(chr) => {
                    if is_line_terminator(chr) {
                        newline = true;
                    }
                    self.read();
                }
            }
        }
        // A block comment containing a line terminator counts as one.
        if newline {
            self.insert_semicolon = false;
            self.implicit_semicolon = true;
        }
    }

    fn scan_newline(&mut self) {
        if self.chr == Some('\r') {
            self.read();
            if self.chr == Some('\n') {
                self.read();
            }
            return;
        }
        self.read();
    }

    // === Identifiers and keywords ===

    fn scan_word(&mut self, start: usize) -> Token {
        let idx = self.idx_of(start);
        let (literal, had_escape) = match self.scan_identifier(start) {
            Ok(result) => result,
            Err(()) => {
                self.insert_semicolon = false;
                return Token::new(TokenKind::Illegal, String::new(), idx);
            }
        };

        // Escaped keywords are ordinary identifiers.
        if !had_escape {
            match literal.as_str() {
                "true" | "false" => {
                    self.insert_semicolon = true;
                    return Token::new(TokenKind::Boolean, literal, idx);
                }
                "null" => {
                    self.insert_semicolon = true;
                    return Token::new(TokenKind::Null, literal, idx);
                }
                _ => {
                    if let Some(kind) = keyword_from_str(&literal) {
                        // `throw` is latched so an illegal newline after it
                        // can be detected.
                        self.insert_semicolon = matches!(
                            kind,
                            TokenKind::This
                                | TokenKind::Break
                                | TokenKind::Continue
                                | TokenKind::Return
                                | TokenKind::Throw
                                | TokenKind::Debugger
                        );
                        return Token::new(kind, literal, idx);
                    }
                }
            }
        }

        self.insert_semicolon = true;
        Token::new(TokenKind::Identifier, literal, idx)
    }

    fn scan_identifier(&mut self, start: usize) -> Result<(String, bool), ()> {
        let mut had_escape = false;
        loop {
            let Some(chr) = self.chr else { break };
            if chr == '\\' {
                let escape_offset = self.chr_offset;
                let first = self.chr_offset == start;
                had_escape = true;
                self.read();
                if self.chr != Some('u') {
                    self.error_at(escape_offset, ERR_UNEXPECTED_ESCAPE);
                    return Err(());
                }
                self.read();
                let mut value = 0;
                for _ in 0..4 {
                    match self.chr.and_then(|c| c.to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            self.read();
                        }
                        None => {
                            self.error_at(escape_offset, ERR_UNEXPECTED_ESCAPE);
                            return Err(());
                        }
                    }
                }
                let valid = char::from_u32(value).is_some_and(|decoded| {
                    decoded != '\\'
                        && if first {
                            is_identifier_start(decoded)
                        } else {
                            is_identifier_part(decoded)
                        }
                });
                if !valid {
                    self.error_at(escape_offset, ERR_UNEXPECTED_ESCAPE);
                    return Err(());
                }
            } else if is_identifier_part(chr) {
                self.read();
            } else {
                break;
            }
        }
        let raw = &self.source[start..self.chr_offset];
        if had_escape {
            Ok((decode_identifier(raw), true))
        } else {
            Ok((raw.to_string(), false))
        }
    }

    // === Numbers ===

    fn scan_number(&mut self, leading_dot: bool) -> TokenKind {
        if leading_dot {
            // `.5`; the dot is already consumed.
            self.scan_digits(10);
            return self.scan_exponent();
        }

        if self.chr == Some('0') {
            self.read();
            match self.chr {
                Some('x') | Some('X') => {
                    self.read();
                    if self.scan_digits(16) == 0 {
                        return TokenKind::Illegal;
                    }
                    return self.finish_number();
                }
                Some(chr) if chr.is_ascii_digit() => {
                    // Legacy octal when every digit is octal; otherwise the
                    // run is read as decimal. The distinction is made from
                    // the literal when its value is computed.
                    self.scan_digits(10);
                }
                _ => {}
            }
        } else {
            self.scan_digits(10);
        }

        if self.chr == Some('.') {
            self.read();
            self.scan_digits(10);
        }
        self.scan_exponent()
    }

    fn scan_exponent(&mut self) -> TokenKind {
        if matches!(self.chr, Some('e') | Some('E')) {
            self.read();
            if matches!(self.chr, Some('+') | Some('-')) {
                self.read();
            }
            if self.scan_digits(10) == 0 {
                return TokenKind::Illegal;
            }
        }
        self.finish_number()
    }

    fn finish_number(&mut self) -> TokenKind {
        match self.chr {
            Some(chr) if is_identifier_start(chr) || chr.is_ascii_digit() => TokenKind::Illegal,
            _ => TokenKind::Number,
        }
    }

    fn scan_digits(&mut self, radix: u32) -> usize {
        let mut count = 0;
        while self.chr.is_some_and(|c| c.to_digit(radix).is_some()) {
            self.read();
            count += 1;
        }
        count
    }

    // === Strings and regex bodies ===

    /// Scan a quoted run starting at the (already consumed) quote character
    /// at `start`. Handles string quotes as well as `/`-delimited regex
    /// bodies, where `[…]` classes make `/` literal.
    fn scan_string_raw(&mut self, start: usize, err_message: &str) -> Result<String, ()> {
        let quote = match self.source[start..].chars().next() {
            Some(chr) => chr,
            None => return Err(()),
        };
        let mut in_class = false;
        loop {
            let chr = match self.chr {
                Some(chr) => chr,
                None => return self.fail_string(start, err_message),
            };
            if chr == quote && !in_class {
                break;
            }
            if is_line_terminator(chr) {
                return self.fail_string(start, err_message);
            }
            self.read();
            if chr == '\\' {
                match self.chr {
                    None => return self.fail_string(start, err_message),
                    Some(next) if is_line_terminator(next) => {
                        if quote == '/' {
                            return self.fail_string(start, err_message);
                        }
                        // Line continuation: consumed, produces nothing.
                        self.scan_newline();
                    }
                    Some(_) => self.read(),
                }
            } else if chr == '[' && quote == '/' {
                in_class = true;
            } else if chr == ']' && in_class {
                in_class = false;
            }
        }
        self.read(); // closing quote
        Ok(self.source[start..self.chr_offset].to_string())
    }

    fn fail_string(&mut self, start: usize, message: &str) -> Result<String, ()> {
        if self.chr.is_some_and(is_line_terminator) {
            self.scan_newline();
        }
        self.error_at(start, message);
        Err(())
    }
}

// === Character classes ===

pub(crate) fn is_line_terminator(chr: char) -> bool {
    matches!(chr, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Check if a character can start an identifier. The backslash is included
/// so a leading `\uXXXX` escape enters the identifier scan.
pub(crate) fn is_identifier_start(chr: char) -> bool {
    chr == '$'
        || chr == '_'
        || chr == '\\'
        || chr.is_ascii_alphabetic()
        || (chr as u32 >= 0x80 && UnicodeXID::is_xid_start(chr))
}

/// Check if a character can continue an identifier.
pub(crate) fn is_identifier_part(chr: char) -> bool {
    chr == '$'
        || chr == '_'
        || chr == '\\'
        || chr.is_ascii_alphanumeric()
        || (chr as u32 >= 0x80 && UnicodeXID::is_xid_continue(chr))
}

/// Decode the `\uXXXX` escapes of a scanned identifier. The escapes were
/// validated during scanning.
fn decode_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(chr) = chars.next() {
        if chr != '\\' {
            out.push(chr);
            continue;
        }
        chars.next(); // `u`
        let mut value = 0;
        for _ in 0..4 {
            value = value * 16 + chars.next().and_then(|c| c.to_digit(16)).unwrap_or(0);
        }
        if let Some(decoded) = char::from_u32(value) {
            out.push(decoded);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<(TokenKind, String)> {
        let mut lexer = Lexer::new("test.js", source, 1);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push((token.kind, token.literal));
        }
        tokens
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|(kind, _)| kind).collect()
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("var x = null;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::Null,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn longest_punctuator_wins() {
        assert_eq!(
            kinds("a >>>= b >>> c >> d > e"),
            vec![
                TokenKind::Identifier,
                TokenKind::GtGtGtEq,
                TokenKind::Identifier,
                TokenKind::GtGtGt,
                TokenKind::Identifier,
                TokenKind::GtGt,
                TokenKind::Identifier,
                TokenKind::Gt,
                TokenKind::Identifier,
            ]
        );
        assert_eq!(
            kinds("=== == = !== != !"),
            vec![
                TokenKind::EqEqEq,
                TokenKind::EqEq,
                TokenKind::Eq,
                TokenKind::BangEqEq,
                TokenKind::BangEq,
                TokenKind::Bang,
            ]
        );
    }

    #[test]
    fn number_literals_keep_their_spelling() {
        let tokens = lex("0 42 3.14 .5 1e3 0xFF 0755 0788");
        let literals: Vec<&str> = tokens.iter().map(|(_, lit)| lit.as_str()).collect();
        assert_eq!(
            literals,
            vec!["0", "42", "3.14", ".5", "1e3", "0xFF", "0755", "0788"]
        );
        assert!(tokens.iter().all(|(kind, _)| *kind == TokenKind::Number));
    }

    #[test]
    fn malformed_numbers_are_illegal() {
        assert_eq!(kinds("0x")[0], TokenKind::Illegal);
        assert_eq!(kinds("1e")[0], TokenKind::Illegal);
        assert_eq!(kinds("3a")[0], TokenKind::Illegal);
    }

    #[test]
    fn string_literal_includes_quotes() {
        let tokens = lex(r#"'it\'s' "two""#);
        assert_eq!(tokens[0], (TokenKind::String, r"'it\'s'".to_string()));
        assert_eq!(tokens[1], (TokenKind::String, r#""two""#.to_string()));
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let mut lexer = Lexer::new("test.js", "'abc\ndef'", 1);
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Illegal);
        assert!(!lexer.errors.is_empty());
    }

    #[test]
    fn escaped_keyword_is_identifier() {
        let tokens = lex(r"v\u0061r");
        assert_eq!(tokens, vec![(TokenKind::Identifier, "var".to_string())]);
    }

    #[test]
    fn invalid_identifier_escape_reports_unexpected_escape() {
        let mut lexer = Lexer::new("test.js", r"a\x41", 1);
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Illegal);
        assert_eq!(lexer.errors[0].message, "Unexpected escape");
    }

    #[test]
    fn newline_latches_implicit_semicolon() {
        let mut lexer = Lexer::new("test.js", "a\nb c", 1);
        lexer.next_token();
        lexer.next_token();
        assert!(lexer.implicit_semicolon);
        lexer.next_token();
        assert!(!lexer.implicit_semicolon);
    }

    #[test]
    fn block_comment_with_newline_counts_as_terminator() {
        let mut lexer = Lexer::new("test.js", "a /* x\ny */ b", 1);
        lexer.next_token();
        lexer.next_token();
        assert!(lexer.implicit_semicolon);

        let mut lexer = Lexer::new("test.js", "a /* xy */ b", 1);
        lexer.next_token();
        lexer.next_token();
        assert!(!lexer.implicit_semicolon);
    }

    #[test]
    fn implicit_semicolon_at_end_of_input() {
        let mut lexer = Lexer::new("test.js", "a\n", 1);
        lexer.next_token();
        let eof = lexer.next_token();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert!(lexer.implicit_semicolon);
    }

    #[test]
    fn regexp_rescan_handles_classes_and_flags() {
        let source = "/[/]x/gi + 1";
        let mut lexer = Lexer::new("test.js", source, 1);
        let slash = lexer.next_token();
        assert_eq!(slash.kind, TokenKind::Slash);
        let raw = lexer.scan_regexp(0).unwrap();
        assert_eq!(raw, "/[/]x/");
        assert_eq!(lexer.scan_regexp_flags(), "gi");
        assert_eq!(lexer.next_token().kind, TokenKind::Plus);
    }

    #[test]
    fn unterminated_regexp_reports_missing_slash() {
        let mut lexer = Lexer::new("test.js", "/abc", 1);
        assert_eq!(lexer.next_token().kind, TokenKind::Slash);
        assert!(lexer.scan_regexp(0).is_err());
        assert_eq!(
            lexer.errors[0].message,
            "Invalid regular expression: missing /"
        );
    }

    #[test]
    fn unicode_whitespace_is_skipped() {
        assert_eq!(
            kinds("a\u{00a0}\u{2003}b"),
            vec![TokenKind::Identifier, TokenKind::Identifier]
        );
    }
}
