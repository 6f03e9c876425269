//! Source locations attached to automaton edges.

use std::fmt;

/// A source-file region an edge originates from.
///
/// Locations are carried for diagnostics only: the checker and the
/// transformation passes embed them in error messages so a maintainer can
/// find the offending program fragment. Synthetic edges produced by the core
/// (splices, gates, the program-counter machinery) carry the
/// [`dummy`](FileLocation::dummy) location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FileLocation {
    /// Name of the source file.
    pub file: String,
    /// First line of the region (1-based; 0 for synthetic locations).
    pub start_line: u32,
    /// Last line of the region.
    pub end_line: u32,
}

impl FileLocation {
    /// Creates a location spanning the given lines of a file.
    #[must_use]
    pub fn new(file: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            start_line,
            end_line,
        }
    }

    /// Creates a location for a single line.
    #[must_use]
    pub fn line(file: impl Into<String>, line: u32) -> Self {
        Self::new(file, line, line)
    }

    /// The location used by synthetic edges that have no source counterpart.
    #[must_use]
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Returns `true` if this is the synthetic dummy location.
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.file.is_empty() && self.start_line == 0
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "<none>")
        } else if self.start_line == self.end_line {
            write!(f, "{}:{}", self.file, self.start_line)
        } else {
            write!(f, "{}:{}-{}", self.file, self.start_line, self.end_line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_single_line() {
        let loc = FileLocation::line("main.c", 12);
        assert_eq!(loc.to_string(), "main.c:12");
    }

    #[test]
    fn test_display_range() {
        let loc = FileLocation::new("main.c", 3, 7);
        assert_eq!(loc.to_string(), "main.c:3-7");
    }

    #[test]
    fn test_dummy() {
        let loc = FileLocation::dummy();
        assert!(loc.is_dummy());
        assert_eq!(loc.to_string(), "<none>");
    }
}
