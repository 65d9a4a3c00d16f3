//! Declaration model consumed by the binding generator, plus the front ends
//! that produce it from C++ headers.

#[cfg(feature = "libclang")]
pub mod clang;
pub mod frontend;
pub mod json;
pub mod node;
pub mod types;

pub use frontend::{Frontend, FrontendError, ParsedUnit, ParserDiagnostic, Severity};
pub use node::{
    Access, BaseDecl, Callable, DeclKind, DeclNode, EnumConstant, EnumDecl, EnumValue, FieldDecl,
    Linkage, OtherDecl, Param, RecordDecl, RecordTag, TemplateDecl, TemplateKind,
};
pub use types::{CanonicalType, Fundamental, Indirection, QualType, TypeRef};
