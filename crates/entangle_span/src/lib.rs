use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A file/line/column position reported by the header parser.
///
/// Lines and columns are 1-based; `0` means the parser did not know.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        !self.file.as_os_str().is_empty()
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Byte offset of this position inside `source`, clamped to its length.
    pub fn offset_in(&self, source: &str) -> usize {
        let target_line = self.line.max(1) as usize;
        let mut offset = 0;
        for (index, line) in source.split_inclusive('\n').enumerate() {
            if index + 1 == target_line {
                let column = (self.column.max(1) as usize).saturating_sub(1);
                return offset + column.min(line.trim_end_matches('\n').len());
            }
            offset += line.len();
        }
        source.len()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_known() {
            return f.write_str("<unknown>");
        }
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_points_at_line_and_column() {
        let source = "int a;\nstruct B {};\n";
        let location = SourceLocation::new("b.hpp", 2, 8);
        assert_eq!(&source[location.offset_in(source)..], "B {};\n");
    }

    #[test]
    fn unknown_location_displays_placeholder() {
        assert_eq!(SourceLocation::unknown().to_string(), "<unknown>");
        assert_eq!(SourceLocation::new("a.hpp", 3, 1).to_string(), "a.hpp:3:1");
    }
}
