use std::path::PathBuf;

use entangle_decl::{FrontendError, ParserDiagnostic};
use entangle_span::SourceLocation;
use entangle_utils::errors::Diagnostic;
use thiserror::Error;

use crate::mapper::TypeError;

/// A structural rule a requested declaration breaks. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("`{name}` has {count} base classes; only single inheritance can be bound")]
    MultipleInheritance { name: String, count: usize },
    #[error("`{name}` uses virtual inheritance, which has no fixed layout")]
    VirtualInheritance { name: String },
    #[error("`{name}` is variadic")]
    Variadic { name: String },
    #[error("`{name}` takes a `va_list` parameter")]
    VaListParameter { name: String },
    #[error("`{name}` is a {what}; templates cannot be bound")]
    Template { name: String, what: &'static str },
    #[error("{kind} `{name}` is not public")]
    NotPublic { name: String, kind: &'static str },
    #[error("`{name}` does not have external linkage")]
    NotExternal { name: String },
    #[error("anonymous {kind} cannot be bound")]
    Anonymous { kind: &'static str },
    #[error("union `{name}` cannot be bound")]
    Union { name: String },
    #[error("{kind} `{name}` is marked but its enclosing `{owner}` is not")]
    UnmarkedOwner {
        name: String,
        kind: &'static str,
        owner: String,
    },
    #[error("marked {description} `{name}` is not a bindable declaration")]
    UnsupportedDeclaration { name: String, description: String },
    #[error("`{name}` is a reserved identifier ({reason})")]
    ReservedIdentifier { name: String, reason: &'static str },
    #[error("`{name}` has no Python operator equivalent")]
    UnsupportedOperator { name: String },
    #[error("free operator `{name}` cannot be bound; declare it as a member")]
    FreeOperator { name: String },
    #[error("enum `{name}` has no enumerators")]
    EmptyEnum { name: String },
    #[error("`{path}` is bound as a {incoming} but the name is already taken by a {existing}")]
    NamingConflict {
        path: String,
        existing: &'static str,
        incoming: &'static str,
    },
    #[error("`{path}` has two different definitions")]
    ConflictingDefinition { path: String },
    #[error(
        "overloads of `{name}` taking {arity} argument(s) cannot be told apart by argument count or first argument type"
    )]
    AmbiguousOverload { name: String, arity: usize },
    #[error("overload set `{name}` mixes static and instance methods")]
    MixedStaticOverload { name: String },
    #[error("`{name}` has no linker symbol")]
    MissingSymbol { name: String },
    #[error("linker symbol `{symbol}` is declared with two different signatures")]
    SymbolSignatureConflict { symbol: String },
    #[error("`{name}` has no fields; zero-sized structures cannot be represented")]
    EmptyAggregate { name: String },
    #[error("the parser did not report a size and alignment for `{name}`")]
    MissingLayoutSize { name: String },
    #[error(
        "computed layout of `{name}` is {computed} bytes but the C++ type is {reported} bytes"
    )]
    LayoutSizeMismatch {
        name: String,
        computed: u64,
        reported: u64,
    },
    #[error(
        "field `{field}` of `{name}` is computed at bit {computed} but the C++ type places it at bit {reported}"
    )]
    FieldOffsetMismatch {
        name: String,
        field: String,
        computed: u64,
        reported: u64,
    },
    #[error("members of `{name}` would be placed in the tail padding of its base `{base}`")]
    TailPaddingReuse { name: String, base: String },
    #[error("bit-field `{field}` of `{name}` must have an integer type")]
    InvalidBitField { name: String, field: String },
    #[error("base class `{base}` of `{name}` is not bound")]
    UnresolvedBase { name: String, base: String },
    #[error("aggregate `{name}` contains itself by value through `{through}`")]
    LayoutCycle { name: String, through: String },
    #[error("symbol order violated: {detail}")]
    ScopeOrder { detail: String },
    #[error("{context}: {error}")]
    Type {
        context: String,
        #[source]
        error: TypeError,
    },
}

/// A violation pinned to the declaration that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {violation}")]
pub struct BindError {
    pub location: SourceLocation,
    pub violation: Violation,
    /// Other declarations involved, e.g. every colliding overload.
    pub related: Vec<SourceLocation>,
}

impl BindError {
    pub fn new(location: SourceLocation, violation: Violation) -> Self {
        Self {
            location,
            violation,
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, related: impl IntoIterator<Item = SourceLocation>) -> Self {
        self.related.extend(related);
        self
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diagnostic =
            Diagnostic::error(self.location.clone(), self.violation.to_string())
                .with_label("cannot be bound");
        for location in &self.related {
            diagnostic = diagnostic.with_related(location.clone(), "also declared here");
        }
        match &self.violation {
            Violation::Type {
                error:
                    TypeError::MissingDefinition {
                        suggestion: Some(suggestion),
                        ..
                    },
                ..
            } => diagnostic.with_suggestion(format!("did you mean `{suggestion}`?")),
            Violation::Type {
                error: TypeError::MissingDefinition { .. },
                ..
            } => diagnostic.with_help("mark the type's definition for binding"),
            Violation::AmbiguousOverload { .. } => diagnostic
                .with_help("rename one overload or change its first parameter to a distinct class"),
            Violation::LayoutSizeMismatch { .. } | Violation::FieldOffsetMismatch { .. } => diagnostic
                .with_help("the type probably relies on packing, tail-padding reuse or a different target ABI"),
            Violation::TailPaddingReuse { .. } => diagnostic
                .with_help("ctypes cannot overlap a base with derived members; give the base no tail padding"),
            _ => diagnostic,
        }
    }
}

pub type BindResult<T> = Result<T, BindError>;

/// Anything that stops a generation run.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("parsing {} failed", header.display())]
    Parse {
        header: PathBuf,
        diagnostics: Vec<ParserDiagnostic>,
    },
    #[error(transparent)]
    Frontend(#[from] FrontendError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    /// Diagnostics to render for this failure, if it has any.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Parse { diagnostics, .. } => diagnostics
                .iter()
                .map(|diagnostic| {
                    Diagnostic::error(diagnostic.location.clone(), diagnostic.message.clone())
                })
                .collect(),
            Self::Bind(error) => vec![error.to_diagnostic()],
            Self::Frontend(_) | Self::Io { .. } => Vec::new(),
        }
    }
}
