use std::fmt::{self, Display, Formatter};

use nom_locate::LocatedSpan;

use crate::source::SourceId;

pub type Span<'a> = LocatedSpan<&'a str, SourceId>;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Hash)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Default, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    /// A single-line range of `width` columns starting at `start`.
    pub fn at(start: Position, width: usize) -> Self {
        let end = Position::new(start.line, start.column + width);
        Range { start, end }
    }

    pub fn contains(&self, position: &Position) -> bool {
        (self.start.line < position.line || (self.start.line == position.line && self.start.column <= position.column))
            && (self.end.line > position.line || (self.end.line == position.line && self.end.column >= position.column))
    }

    pub fn to(&self, other: &Range) -> Range {
        Range {
            start: self.start.clone(),
            end: other.end.clone(),
        }
    }
}

impl<'a> From<Span<'a>> for Range {
    fn from(span: Span<'a>) -> Self {
        Range::at(span.into(), span.fragment().chars().count())
    }
}

impl<'a> From<Span<'a>> for Position {
    fn from(span: Span<'a>) -> Self {
        Position {
            line: span.location_line(),
            column: span.get_utf8_column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::inside(Position::new(1, 3), true)]
    #[case::start(Position::new(1, 1), true)]
    #[case::end(Position::new(2, 4), true)]
    #[case::before(Position::new(0, 9), false)]
    #[case::after_end_column(Position::new(2, 5), false)]
    fn test_contains(#[case] position: Position, #[case] expected: bool) {
        let range = Range::new(Position::new(1, 1), Position::new(2, 4));
        assert_eq!(range.contains(&position), expected);
    }

    #[test]
    fn test_from_span_counts_chars() {
        let span = Span::new_extra("héllo", SourceId::default());
        let range: Range = span.into();
        assert_eq!(range, Range::new(Position::new(1, 1), Position::new(1, 6)));
    }
}
