use std::fmt;

use serde::{Deserialize, Serialize};

/// Built-in C++ arithmetic and character types, after typedef resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fundamental {
    Void,
    Bool,
    /// Plain `char`, whichever signedness the target gives it.
    Char,
    SChar,
    UChar,
    WChar,
    Char16,
    Char32,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
}

impl Fundamental {
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Char | Self::SChar | Self::Short | Self::Int | Self::Long | Self::LongLong
        )
    }

    pub fn is_integer(self) -> bool {
        !matches!(
            self,
            Self::Void | Self::Float | Self::Double | Self::LongDouble
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::LongDouble)
    }

    /// `char` and `wchar_t`, whose pointers are treated as text.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Char | Self::WChar)
    }

    pub fn spelling(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::SChar => "signed char",
            Self::UChar => "unsigned char",
            Self::WChar => "wchar_t",
            Self::Char16 => "char16_t",
            Self::Char32 => "char32_t",
            Self::Short => "short",
            Self::UShort => "unsigned short",
            Self::Int => "int",
            Self::UInt => "unsigned int",
            Self::Long => "long",
            Self::ULong => "unsigned long",
            Self::LongLong => "long long",
            Self::ULongLong => "unsigned long long",
            Self::Float => "float",
            Self::Double => "double",
            Self::LongDouble => "long double",
        }
    }
}

/// Reference to a user-defined enum or aggregate by the parser's unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub usr: String,
    pub spelling: String,
}

impl TypeRef {
    pub fn new(usr: impl Into<String>, spelling: impl Into<String>) -> Self {
        Self {
            usr: usr.into(),
            spelling: spelling.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirection {
    Pointer,
    LValueReference,
    RValueReference,
}

impl Indirection {
    pub fn is_reference(self) -> bool {
        !matches!(self, Self::Pointer)
    }
}

/// Structural form of a type with every alias resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalType {
    Fundamental(Fundamental),
    Pointer(Box<CanonicalType>),
    LValueReference(Box<CanonicalType>),
    RValueReference(Box<CanonicalType>),
    ConstantArray {
        element: Box<CanonicalType>,
        len: u64,
    },
    Enum(TypeRef),
    Record(TypeRef),
    /// Anything the binding model has no representation for (function pointers,
    /// member pointers, incomplete arrays, vectors). Carries the parser's spelling.
    Unsupported(String),
}

impl CanonicalType {
    pub fn indirection(&self) -> Option<(Indirection, &Self)> {
        match self {
            Self::Pointer(pointee) => Some((Indirection::Pointer, pointee)),
            Self::LValueReference(pointee) => Some((Indirection::LValueReference, pointee)),
            Self::RValueReference(pointee) => Some((Indirection::RValueReference, pointee)),
            _ => None,
        }
    }

    /// The aggregate this type names, looking through one level of indirection.
    pub fn record_ref(&self) -> Option<&TypeRef> {
        match self {
            Self::Record(record) => Some(record),
            other => match other.indirection() {
                Some((_, Self::Record(record))) => Some(record),
                _ => None,
            },
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Fundamental(Fundamental::Void))
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fundamental(kind) => f.write_str(kind.spelling()),
            Self::Pointer(pointee) => write!(f, "{pointee}*"),
            Self::LValueReference(pointee) => write!(f, "{pointee}&"),
            Self::RValueReference(pointee) => write!(f, "{pointee}&&"),
            Self::ConstantArray { element, len } => write!(f, "{element}[{len}]"),
            Self::Enum(named) | Self::Record(named) => f.write_str(&named.spelling),
            Self::Unsupported(spelling) => f.write_str(spelling),
        }
    }
}

/// A declared type: the parser's spelling plus its canonical structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualType {
    pub spelling: String,
    pub canonical: CanonicalType,
}

impl QualType {
    pub fn new(spelling: impl Into<String>, canonical: CanonicalType) -> Self {
        Self {
            spelling: spelling.into(),
            canonical,
        }
    }

    pub fn void() -> Self {
        Self::fundamental(Fundamental::Void)
    }

    pub fn fundamental(kind: Fundamental) -> Self {
        Self::from(CanonicalType::Fundamental(kind))
    }

    pub fn record(usr: &str, spelling: &str) -> Self {
        Self::from(CanonicalType::Record(TypeRef::new(usr, spelling)))
    }

    pub fn enumeration(usr: &str, spelling: &str) -> Self {
        Self::from(CanonicalType::Enum(TypeRef::new(usr, spelling)))
    }

    pub fn pointer_to(self) -> Self {
        Self::from(CanonicalType::Pointer(Box::new(self.canonical)))
    }

    pub fn reference_to(self) -> Self {
        Self::from(CanonicalType::LValueReference(Box::new(self.canonical)))
    }

    pub fn array_of(self, len: u64) -> Self {
        Self::from(CanonicalType::ConstantArray {
            element: Box::new(self.canonical),
            len,
        })
    }
}

impl Default for QualType {
    fn default() -> Self {
        Self::void()
    }
}

impl From<CanonicalType> for QualType {
    fn from(canonical: CanonicalType) -> Self {
        Self {
            spelling: canonical.to_string(),
            canonical,
        }
    }
}
