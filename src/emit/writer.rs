//! Indented Python source accumulation.

use std::fmt::Write as _;

/// Builds Python source one line at a time, indenting with tabs.
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    depth: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push('\t');
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Writes a docstring at the current depth.
    pub fn docstring(&mut self, text: &str) {
        let lines: Vec<&str> = text.lines().collect();
        match lines.as_slice() {
            [] => {}
            [only] => self.line(format!("\"\"\"{only}\"\"\"")),
            [first, rest @ ..] => {
                self.line(format!("\"\"\"{first}"));
                for line in rest {
                    self.line(line);
                }
                self.line("\"\"\"");
            }
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// A single-quoted Python string literal.
pub fn py_str(text: &str) -> String {
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('\'');
    for c in text.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(literal, "\\x{:02x}", c as u32);
            }
            c => literal.push(c),
        }
    }
    literal.push('\'');
    literal
}

/// Docstring text from a C++ documentation comment, or `None` if the
/// comment carries no text.
pub fn doc_text(comment: &str) -> Option<String> {
    let mut lines: Vec<String> = comment
        .lines()
        .map(|line| {
            let line = line.trim();
            let line = ["///<", "//!<", "///", "//!", "//", "/**<", "/*!<", "/**", "/*!", "/*"]
                .iter()
                .find_map(|marker| line.strip_prefix(marker))
                .unwrap_or(line);
            let line = line.strip_suffix("*/").unwrap_or(line);
            let line = line.strip_prefix('*').unwrap_or(line);
            line.trim().to_string()
        })
        .collect();
    while lines.first().is_some_and(String::is_empty) {
        lines.remove(0);
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    if lines.is_empty() {
        return None;
    }
    let mut text = lines.join("\n").replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
    if text.ends_with('"') {
        text.pop();
        text.push_str("\\\"");
    }
    Some(text)
}
