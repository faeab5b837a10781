//! Diagnostics shared by the parser and the regexp transpiler.

use thiserror::Error as ThisError;

use crate::position::Position;

pub(crate) const ERR_UNEXPECTED_END_OF_INPUT: &str = "Unexpected end of input";
pub(crate) const ERR_UNEXPECTED_ESCAPE: &str = "Unexpected escape";

/// A parse or transpile diagnostic with its source position.
///
/// Renders as `"<file>: Line <L>:<C> <message>"`, with the filename
/// defaulting to `(anonymous)`.
#[derive(Debug, Clone, PartialEq, ThisError)]
#[error("{}: Line {}:{} {}", .position.display_name(), .position.line, .position.column, .message)]
pub struct Error {
    /// Human-readable description of the problem.
    pub message: String,
    /// Where the problem was detected.
    pub position: Position,
}

impl Error {
    pub(crate) fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_filename() {
        let err = Error::new(
            "Unexpected token )",
            Position {
                filename: "app.js".to_string(),
                line: 3,
                column: 7,
            },
        );
        assert_eq!(err.to_string(), "app.js: Line 3:7 Unexpected token )");
    }

    #[test]
    fn renders_anonymous_without_filename() {
        let err = Error::new(ERR_UNEXPECTED_END_OF_INPUT, Position::default());
        assert_eq!(
            err.to_string(),
            "(anonymous): Line 1:1 Unexpected end of input"
        );
    }
}
