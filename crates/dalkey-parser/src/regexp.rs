//! Rewrites ECMAScript regular-expression patterns for the host regex
//! engine, whose dialect is a strict subset: no lookaround, no
//! backreferences, a narrower `\s` class, and a braced form for 4-digit
//! unicode escapes.
//!
//! Patterns fall into three classes:
//! - valid and re-expressible: rewritten, no error;
//! - valid but incompatible (lookahead, backreference): rewritten
//!   best-effort, first error returned alongside;
//! - not valid ECMAScript (unterminated group/class, stray `)`): the
//!   rewrite is discarded and only the error returned.

use crate::error::Error;
use crate::lexer::is_identifier_part;
use crate::position::Position;

/// Rewrite an ECMAScript pattern (body only, no flags) for the host regex
/// engine.
///
/// Returns the rewritten pattern and the first diagnostic, if any. An
/// invalid pattern yields an empty rewrite; an incompatible one yields both
/// a non-empty rewrite and an error, leaving the choice to the caller.
pub fn transform_regexp(pattern: &str) -> (String, Option<Error>) {
    if pattern.is_empty() {
        return (String::new(), None);
    }

    let mut transpiler = Transpiler {
        pattern,
        chr: None,
        chr_offset: 0,
        offset: 0,
        errors: Vec::new(),
        invalid: false,
        buffer: String::with_capacity(3 * pattern.len() / 2),
    };
    transpiler.read();
    transpiler.scan();

    let Transpiler {
        errors,
        invalid,
        buffer,
        ..
    } = transpiler;
    let error = errors.into_iter().next();
    if invalid {
        return (String::new(), error);
    }
    (buffer, error)
}

struct Transpiler<'a> {
    pattern: &'a str,

    chr: Option<char>,
    chr_offset: usize,
    offset: usize,

    errors: Vec<Error>,
    /// Set when the input is not a valid ECMAScript pattern at all.
    invalid: bool,

    buffer: String,
}

impl<'a> Transpiler<'a> {
    fn scan(&mut self) {
        while let Some(chr) = self.chr {
            match chr {
                '\\' => {
                    self.read();
                    self.scan_escape(false);
                }
                '(' => {
                    self.pass();
                    self.scan_group();
                }
                '[' => {
                    self.pass();
                    self.scan_bracket();
                }
                ')' => {
                    self.error("Unmatched ')'");
                    self.invalid = true;
                    self.pass();
                }
                _ => self.pass(),
            }
        }
    }

    // (...)
    fn scan_group(&mut self) {
        let remainder = &self.pattern[self.chr_offset..];
        if remainder.len() > 1 {
            let bytes = remainder.as_bytes();
            if bytes[0] == b'?' && (bytes[1] == b'=' || bytes[1] == b'!') {
                self.error(format!("re2: Invalid ({}) <lookahead>", &remainder[..2]));
            }
        }
        while self.chr.is_some() && self.chr != Some(')') {
            match self.chr {
                Some('\\') => {
                    self.read();
                    self.scan_escape(false);
                }
                Some('(') => {
                    self.pass();
                    self.scan_group();
                }
                Some('[') => {
                    self.pass();
                    self.scan_bracket();
                }
                _ => self.pass(),
            }
        }
        if self.chr != Some(')') {
            self.error("Unterminated group");
            self.invalid = true;
            return;
        }
        self.pass();
    }

    // [...]
    fn scan_bracket(&mut self) {
        while let Some(chr) = self.chr {
            if chr == ']' {
                break;
            }
            if chr == '\\' {
                self.read();
                self.scan_escape(true);
                continue;
            }
            self.pass();
        }
        if self.chr != Some(']') {
            self.error("Unterminated character class");
            self.invalid = true;
            return;
        }
        self.pass();
    }

    // \...
    fn scan_escape(&mut self, in_class: bool) {
        let offset = self.chr_offset;

        let Some(chr) = self.chr else {
            // Trailing backslash; keep it and let the engine complain.
            self.buffer.push('\\');
            return;
        };

        let (length, base): (u32, u32) = match chr {
            '0'..='7' => {
                let mut value: u64 = 0;
                let mut size = 0;
                while let Some(digit) = self.chr.and_then(|c| c.to_digit(8)) {
                    value = value.wrapping_mul(8).wrapping_add(u64::from(digit));
                    self.read();
                    size += 1;
                }
                if size == 1 {
                    if value == 0 {
                        // A lone \0 is the zero byte.
                        self.buffer.push_str("\\x00");
                    } else {
                        self.buffer.push('\\');
                        self.buffer
                            .push(char::from(b'0' + value as u8));
                        self.error(format!("re2: Invalid \\{value} <backreference>"));
                    }
                    return;
                }
                // Two or more octal digits spell a byte value.
                if value >= 16 {
                    self.buffer.push_str(&format!("\\x{value:x}"));
                } else {
                    self.buffer.push_str(&format!("\\x0{value:x}"));
                }
                return;
            }

            '8' | '9' => {
                while self.chr.is_some_and(|c| c.is_ascii_digit()) {
                    self.read();
                }
                let digits = &self.pattern[offset..self.chr_offset];
                self.buffer.push('\\');
                self.buffer.push_str(digits);
                self.error(format!("re2: Invalid \\{digits} <backreference>"));
                return;
            }

            'x' => {
                self.read();
                (2, 16)
            }

            'u' => {
                self.read();
                (4, 16)
            }

            'b' if in_class => {
                // Inside a class \b denotes backspace.
                self.buffer.push_str("\\x08");
                self.read();
                return;
            }

            // The target's \s does not include \v the way ECMAScript's
            // does; the mismatch is accepted silently.
            'b' | 'B' | 'd' | 'D' | 's' | 'S' | 'w' | 'W' | '\\' | 'f' | 'n' | 'r' | 't'
            | 'v' => {
                self.buffer.push('\\');
                self.pass();
                return;
            }

            'c' => {
                self.read();
                let value = match self.chr {
                    Some(chr @ 'a'..='z') => chr as u32 - 'a' as u32 + 1,
                    Some(chr @ 'A'..='Z') => chr as u32 - 'A' as u32 + 1,
                    _ => {
                        // Not a control escape after all; emit the `c` and
                        // let the main loop handle the current character.
                        self.buffer.push('c');
                        return;
                    }
                };
                if value >= 16 {
                    self.buffer.push_str(&format!("\\x{value:x}"));
                } else {
                    self.buffer.push_str(&format!("\\x0{value:x}"));
                }
                self.read();
                return;
            }

            _ => {
                // $ is an identifier character, so it needs a special case.
                if chr == '$' || !is_identifier_part(chr) {
                    // A non-identifier character needs escaping.
                    self.buffer.push('\\');
                }
                // An identifier character is unescaped; the target rejects
                // the redundant escape.
                self.pass();
                return;
            }
        };

        // \xHH or \uHHHH
        let value_offset = self.chr_offset;
        let mut remaining = length;
        while remaining > 0 {
            if self.chr.and_then(|c| c.to_digit(base)).is_none() {
                // Not enough valid digits; emit what was consumed (without
                // the backslash) and continue.
                let skipped = &self.pattern[offset..self.chr_offset];
                self.buffer.push_str(skipped);
                return;
            }
            self.read();
            remaining -= 1;
        }

        let digits = &self.pattern[value_offset..self.chr_offset];
        if length == 4 {
            // The target expects the braced form.
            self.buffer.push_str("\\x{");
            self.buffer.push_str(digits);
            self.buffer.push('}');
        } else {
            self.buffer.push_str("\\x");
            self.buffer.push_str(digits);
        }
    }

    fn pass(&mut self) {
        if let Some(chr) = self.chr {
            self.buffer.push(chr);
        }
        self.read();
    }

    fn read(&mut self) {
        if self.offset < self.pattern.len() {
            self.chr_offset = self.offset;
            match self.pattern[self.offset..].chars().next() {
                Some(chr) => {
                    self.offset += chr.len_utf8();
                    self.chr = Some(chr);
                }
                None => self.chr = None,
            }
        } else {
            self.chr_offset = self.pattern.len();
            self.chr = None;
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors
            .push(Error::new(message, Position::default()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(pattern: &str) -> String {
        let (rewritten, error) = transform_regexp(pattern);
        assert!(error.is_none(), "unexpected error for {pattern:?}: {error:?}");
        rewritten
    }

    #[test]
    fn empty_pattern_passes_through() {
        assert_eq!(transform_regexp(""), (String::new(), None));
    }

    #[test]
    fn safe_subset_is_unchanged() {
        for pattern in [
            "abc",
            "a*b+c?",
            "a|b",
            "(?:ab)*",
            "[a-z][^0-9]",
            r"\d+\s\w",
            r"\n\t\f\r\v",
            r"a\\b",
            "(a(b)c)",
        ] {
            assert_eq!(ok(pattern), pattern);
        }
    }

    #[test]
    fn lookahead_is_incompatible_but_rewritten() {
        let (rewritten, error) = transform_regexp("(?=x)");
        assert_eq!(rewritten, "(?=x)");
        assert!(error.unwrap().message.contains("lookahead"));

        let (rewritten, error) = transform_regexp("a(?!b)c");
        assert_eq!(rewritten, "a(?!b)c");
        assert!(error.unwrap().message.contains("lookahead"));
    }

    #[test]
    fn backreference_is_incompatible_but_preserved() {
        let (rewritten, error) = transform_regexp(r"\1");
        assert_eq!(rewritten, r"\1");
        assert!(error.unwrap().message.contains("backreference"));

        let (rewritten, error) = transform_regexp(r"(a)\8");
        assert_eq!(rewritten, r"(a)\8");
        assert!(error.unwrap().message.contains("backreference"));
    }

    #[test]
    fn unterminated_structures_are_invalid() {
        let (rewritten, error) = transform_regexp("(abc");
        assert_eq!(rewritten, "");
        assert_eq!(error.unwrap().message, "Unterminated group");

        let (rewritten, error) = transform_regexp("[abc");
        assert_eq!(rewritten, "");
        assert_eq!(error.unwrap().message, "Unterminated character class");

        let (rewritten, error) = transform_regexp("a)b");
        assert_eq!(rewritten, "");
        assert_eq!(error.unwrap().message, "Unmatched ')'");
    }

    #[test]
    fn unicode_escape_becomes_braced() {
        assert_eq!(ok(r"\u0041"), r"\x{0041}");
        assert_eq!(ok(r"a\u2603b"), r"a\x{2603}b");
    }

    #[test]
    fn hex_escape_passes_through() {
        assert_eq!(ok(r"\x41"), r"\x41");
    }

    #[test]
    fn short_hex_escape_falls_back_to_raw() {
        // The backslash is dropped and the consumed characters kept.
        assert_eq!(ok(r"\xZ"), "xZ");
        assert_eq!(ok(r"\u12"), "u12");
    }

    #[test]
    fn octal_escapes_become_hex() {
        assert_eq!(ok(r"\00"), r"\x00");
        assert_eq!(ok(r"\07"), r"\x07");
        assert_eq!(ok(r"\012"), r"\x0a");
        assert_eq!(ok(r"\077"), r"\x3f");
    }

    #[test]
    fn lone_zero_is_the_zero_byte() {
        assert_eq!(ok(r"\0"), r"\x00");
        // A digit that is not octal ends the run.
        assert_eq!(ok(r"\08"), r"\x008");
    }

    #[test]
    fn backspace_class_escape() {
        assert_eq!(ok(r"[\b]"), r"[\x08]");
        assert_eq!(ok(r"a\b"), r"a\b");
    }

    #[test]
    fn control_escapes_become_hex() {
        assert_eq!(ok(r"\cA"), r"\x01");
        assert_eq!(ok(r"\cz"), r"\x1a");
        // Not a letter: the `c` is emitted bare and scanning continues.
        assert_eq!(ok(r"\c1"), "c1");
    }

    #[test]
    fn punctuation_keeps_its_escape() {
        assert_eq!(ok(r"\$"), r"\$");
        assert_eq!(ok(r"\."), r"\.");
        assert_eq!(ok(r"\/"), r"\/");
    }

    #[test]
    fn redundant_identifier_escape_is_dropped() {
        assert_eq!(ok(r"\q"), "q");
        assert_eq!(ok(r"\A"), "A");
    }

    #[test]
    fn named_and_plain_groups_pass_through() {
        assert_eq!(ok("(?:a)"), "(?:a)");
        assert_eq!(ok("(a|b)c"), "(a|b)c");
    }

    #[test]
    fn slash_inside_class_is_literal() {
        assert_eq!(ok("[/]"), "[/]");
    }
}
