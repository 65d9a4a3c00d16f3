use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use entangle_span::SourceLocation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::DeclNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignored => "ignored",
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserDiagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub location: SourceLocation,
}

impl fmt::Display for ParserDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)
    }
}

/// Everything the generator needs from parsing one header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedUnit {
    pub root: DeclNode,
    #[serde(default)]
    pub diagnostics: Vec<ParserDiagnostic>,
    /// Files pulled in by `#include`, transitively.
    #[serde(default)]
    pub includes: Vec<PathBuf>,
}

impl ParsedUnit {
    pub fn new(root: DeclNode) -> Self {
        Self {
            root,
            diagnostics: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ParserDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity >= Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed declaration dump {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("libclang: {0}")]
    Clang(String),
}

/// A C++ header parser producing the declaration tree.
pub trait Frontend {
    fn name(&self) -> &'static str;

    fn parse(&self, header: &Path, flags: &[String]) -> Result<ParsedUnit, FrontendError>;
}
