//! Source location tracking.
//!
//! Every AST node records an [`Idx`]: a 1-based byte index that is globally
//! unique across all sources registered in a [`FileSet`]. Each registered
//! [`File`] owns a contiguous numeric range starting at its `base`, so an
//! `Idx` can be mapped back to a file and a line/column [`Position`] without
//! the nodes carrying filenames around.

/// A 1-based byte index into some registered source.
///
/// Zero means "no position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Idx(pub u32);

/// A line/column location in a named source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// The name of the source, or empty when parsing anonymous input.
    pub filename: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            filename: String::new(),
            line: 1,
            column: 1,
        }
    }
}

impl Position {
    /// The filename as shown in diagnostics.
    pub fn display_name(&self) -> &str {
        if self.filename.is_empty() {
            "(anonymous)"
        } else {
            &self.filename
        }
    }
}

/// A registered source and the base index of its range.
#[derive(Debug, Clone)]
pub struct File {
    name: String,
    base: u32,
    source: String,
}

impl File {
    /// The file's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `Idx` value assigned to offset 0 of this file's source.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// The file's source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Convert a global index into a line/column position in this file.
    pub fn position(&self, idx: Idx) -> Position {
        position_in(&self.name, &self.source, (idx.0 - self.base) as usize)
    }
}

/// An append-only collection of source files sharing one index space.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<File>,
}

impl FileSet {
    /// Create an empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, allocating it the next free index range.
    ///
    /// Returns the base index assigned to offset 0 of `source`. The first
    /// file gets base 1; each subsequent file starts one past the previous
    /// file's range.
    pub fn add_file(&mut self, name: &str, source: &str) -> u32 {
        let base = self.next_base();
        self.files.push(File {
            name: name.to_string(),
            base,
            source: source.to_string(),
        });
        base
    }

    fn next_base(&self) -> u32 {
        match self.files.last() {
            Some(file) => file.base + file.source.len() as u32 + 1,
            None => 1,
        }
    }

    /// Find the file owning `idx`: the one with the largest `base <= idx`.
    pub fn file(&self, idx: Idx) -> Option<&File> {
        let at = self.files.partition_point(|file| file.base <= idx.0);
        if at == 0 {
            None
        } else {
            self.files.get(at - 1)
        }
    }

    /// Convert a global index into a position in its owning file.
    pub fn position(&self, idx: Idx) -> Option<Position> {
        self.file(idx).map(|file| file.position(idx))
    }
}

/// Count line terminators in `str`, returning the number of lines started
/// and a value `last` such that the column of a trailing offset is
/// `offset - last`. `\r\n` counts as a single terminator.
fn line_count(str: &str) -> (u32, Option<usize>) {
    let mut line = 0;
    let mut last = None;
    let mut pair = false;
    for (index, chr) in str.char_indices() {
        match chr {
            '\r' => {
                line += 1;
                last = Some(index);
                pair = true;
                continue;
            }
            '\n' => {
                if !pair {
                    line += 1;
                }
                last = Some(index);
            }
            '\u{2028}' | '\u{2029}' => {
                line += 1;
                last = Some(index + 2);
            }
            _ => {}
        }
        pair = false;
    }
    (line, last)
}

/// Compute the line/column position of a byte offset inside `source`.
pub(crate) fn position_in(filename: &str, source: &str, offset: usize) -> Position {
    let offset = offset.min(source.len());
    let prefix = source.get(..offset).unwrap_or(source);
    let (line, last) = line_count(prefix);
    let column = match last {
        Some(last) => (offset - last) as u32,
        None => prefix.len() as u32 + 1,
    };
    Position {
        filename: filename.to_string(),
        line: line + 1,
        column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_grow_monotonically() {
        let mut set = FileSet::new();
        assert_eq!(set.add_file("a.js", "var x;"), 1);
        // 1 + 1 + len("var x;") = 8
        assert_eq!(set.add_file("b.js", "x"), 8);
        assert_eq!(set.add_file("c.js", ""), 10);
    }

    #[test]
    fn file_lookup_picks_owning_range() {
        let mut set = FileSet::new();
        set.add_file("a.js", "abc");
        set.add_file("b.js", "defgh");
        assert_eq!(set.file(Idx(1)).map(File::name), Some("a.js"));
        assert_eq!(set.file(Idx(4)).map(File::name), Some("a.js"));
        assert_eq!(set.file(Idx(5)).map(File::name), Some("b.js"));
        assert_eq!(set.file(Idx(40)).map(File::name), Some("b.js"));
        assert!(set.file(Idx(0)).is_none());
    }

    #[test]
    fn position_counts_lines_and_columns() {
        let mut set = FileSet::new();
        set.add_file("a.js", "ab\ncd\ref");
        let position = set.position(Idx(1)).unwrap();
        assert_eq!((position.line, position.column), (1, 1));
        let position = set.position(Idx(4)).unwrap();
        assert_eq!((position.line, position.column), (2, 1));
        // 'e' sits on line 3 after the lone \r
        let position = set.position(Idx(7)).unwrap();
        assert_eq!((position.line, position.column), (3, 1));
    }

    #[test]
    fn crlf_counts_as_one_terminator() {
        let position = position_in("x.js", "a\r\nb", 3);
        assert_eq!((position.line, position.column), (2, 1));
    }

    #[test]
    fn unicode_separators_terminate_lines() {
        let source = "a\u{2028}b";
        let position = position_in("x.js", source, 4);
        assert_eq!((position.line, position.column), (2, 1));
    }

    #[test]
    fn anonymous_filename_display() {
        let position = Position::default();
        assert_eq!(position.display_name(), "(anonymous)");
    }
}
