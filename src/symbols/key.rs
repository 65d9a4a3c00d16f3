use std::cmp::Ordering;
use std::fmt;

/// Declaration kinds in emission order within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeclRank {
    Namespace,
    Enum,
    Function,
    Struct,
    Class,
    Constructor,
    Destructor,
    Method,
}

impl DeclRank {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Struct => "struct",
            Self::Class => "class",
            Self::Constructor => "constructor",
            Self::Destructor => "destructor",
            Self::Method => "method",
        }
    }

    pub fn is_aggregate(self) -> bool {
        matches!(self, Self::Struct | Self::Class)
    }

    pub fn is_callable(self) -> bool {
        matches!(
            self,
            Self::Function | Self::Constructor | Self::Destructor | Self::Method
        )
    }

    pub fn is_member(self) -> bool {
        matches!(self, Self::Constructor | Self::Destructor | Self::Method)
    }
}

/// One step of a qualified path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    pub rank: DeclRank,
    pub name: String,
}

impl Segment {
    pub fn new(rank: DeclRank, name: impl Into<String>) -> Self {
        Self {
            rank,
            name: name.into(),
        }
    }

    pub fn namespace(name: impl Into<String>) -> Self {
        Self::new(DeclRank::Namespace, name)
    }
}

/// Structural key of a symbol table entry.
///
/// Keys order by their full segment sequence, so an aggregate's entry sorts
/// immediately before everything nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    pub scope: Vec<Segment>,
    pub leaf: Segment,
}

impl SymbolKey {
    pub fn new(scope: Vec<Segment>, leaf: Segment) -> Self {
        Self { scope, leaf }
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.scope.iter().chain(std::iter::once(&self.leaf))
    }

    pub fn name(&self) -> &str {
        &self.leaf.name
    }

    pub fn rank(&self) -> DeclRank {
        self.leaf.rank
    }

    /// Dotted path of the Python object, e.g. `ns0.class2`.
    pub fn python_path(&self) -> String {
        join(self.segments(), ".")
    }

    /// Dotted path of the enclosing scope; empty at module level.
    pub fn scope_path(&self) -> String {
        join(self.scope.iter(), ".")
    }

    /// This entry's own path, used as the scope of its members.
    pub fn as_scope(&self) -> Vec<Segment> {
        self.segments().cloned().collect()
    }
}

fn join<'a>(segments: impl Iterator<Item = &'a Segment>, separator: &str) -> String {
    segments
        .map(|segment| segment.name.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

impl Ord for SymbolKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for SymbolKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(self.segments(), "::"))
    }
}
