//! dalkey-parser: the front end of the dalkey embeddable JavaScript
//! interpreter.
//!
//! The crate has two independent, pure-function components:
//!
//! 1. **Parser** — a hand-written lexer/parser for ECMAScript 3 with
//!    selected ES5 features, producing a typed syntax tree with global
//!    positions and a full error list. Automatic semicolon insertion,
//!    regex/division disambiguation, and `var`/function hoisting follow the
//!    specification; error recovery keeps going so a partial tree is always
//!    available.
//! 2. **RegExp transpiler** — rewrites ECMAScript regex patterns for a host
//!    regex engine with a restricted dialect, distinguishing patterns that
//!    are invalid from ones that are merely not expressible.
//!
//! # Design Principles
//!
//! - **Lexing on demand** — the parser drives the lexer one token at a
//!   time, so tokenization stays context-sensitive.
//! - **Never panic on input** — lexical and syntactic errors accumulate in
//!   order and parsing continues; callers get the first error plus the
//!   whole list.
//! - **No I/O, no globals** — both components are pure functions of their
//!   inputs and may run in parallel on disjoint strings.
//!
//! # Example
//!
//! ```
//! use dalkey_parser::{parse_file, FileSet, Mode};
//!
//! let mut files = FileSet::new();
//! let (program, errors) = parse_file(
//!     Some(&mut files),
//!     "add.js",
//!     "function add(a, b) { return a + b; }",
//!     Mode::default(),
//! );
//! assert!(errors.is_empty());
//! assert_eq!(program.body.len(), 1);
//! ```

pub mod ast;
mod error;
mod lexer;
mod parser;
pub mod position;
mod regexp;
pub mod token;

pub use ast::Program;
pub use error::Error;
pub use position::{File, FileSet, Idx, Position};
pub use regexp::transform_regexp;
pub use token::{Token, TokenKind};

use parser::Parser;

/// Reserved parse-mode bitset. No bits are defined yet; unrecognized bits
/// are rejected so they stay available for future use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode(pub u16);

impl Mode {
    fn has_unknown_bits(self) -> bool {
        self.0 != 0
    }
}

/// Parse a single source file into a [`Program`].
///
/// Always returns a program, possibly partial; the error list is ordered
/// and its first element is the primary error. When `file_set` is given the
/// source is registered there and node positions use the allocated base;
/// otherwise positions start at 1.
pub fn parse_file(
    file_set: Option<&mut FileSet>,
    filename: &str,
    source: &str,
    mode: Mode,
) -> (Program, Vec<Error>) {
    if mode.has_unknown_bits() {
        let error = Error {
            message: "Unsupported parse mode".to_string(),
            position: position::position_in(filename, source, 0),
        };
        let program = Program {
            body: Vec::new(),
            declarations: Vec::new(),
        };
        return (program, vec![error]);
    }

    let base = match file_set {
        Some(file_set) => file_set.add_file(filename, source),
        None => 1,
    };
    Parser::new(filename, source, base).parse()
}

/// Parse anonymous source with the default mode and base 1.
pub fn parse(source: &str) -> (Program, Vec<Error>) {
    parse_file(None, "", source, Mode::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file_registers_the_source() {
        let mut files = FileSet::new();
        let (first, errors) = parse_file(Some(&mut files), "a.js", "x;", Mode::default());
        assert!(errors.is_empty());
        let (second, errors) = parse_file(Some(&mut files), "b.js", "y;", Mode::default());
        assert!(errors.is_empty());

        // The second program's positions land inside b.js.
        let idx = second.body[0].idx;
        assert!(idx > first.body[0].idx);
        let position = files.position(idx).unwrap();
        assert_eq!(position.filename, "b.js");
        assert_eq!((position.line, position.column), (1, 1));
    }

    #[test]
    fn errors_carry_the_filename() {
        let mut files = FileSet::new();
        let (_, errors) = parse_file(Some(&mut files), "bad.js", "var ;", Mode::default());
        assert_eq!(errors[0].to_string(), "bad.js: Line 1:5 Unexpected token ;");
    }

    #[test]
    fn anonymous_errors_render_with_placeholder() {
        let (_, errors) = parse(")");
        assert_eq!(
            errors[0].to_string(),
            "(anonymous): Line 1:1 Unexpected token )"
        );
    }

    #[test]
    fn unknown_mode_bits_are_rejected() {
        let (program, errors) = parse_file(None, "m.js", "x;", Mode(0x40));
        assert!(program.body.is_empty());
        assert_eq!(errors[0].message, "Unsupported parse mode");
    }
}
