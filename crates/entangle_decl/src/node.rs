use std::fmt;
use std::path::PathBuf;

use entangle_span::SourceLocation;
use serde::{Deserialize, Serialize};

use crate::types::{Fundamental, QualType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Protected,
    Private,
    /// Namespace-scope declarations have no access specifier.
    #[default]
    Unspecified,
}

impl Access {
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public | Self::Unspecified)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    External,
    UniqueExternal,
    Internal,
    #[default]
    None,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTag {
    Struct,
    Class,
    Union,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    ClassTemplate,
    FunctionTemplate,
    PartialSpecialization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: QualType,
}

impl Param {
    pub fn new(name: &str, ty: QualType) -> Self {
        Self {
            name: (!name.is_empty()).then(|| name.to_string()),
            ty,
        }
    }
}

/// Shared payload of functions, constructors, destructors and methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callable {
    #[serde(default)]
    pub mangled_name: Option<String>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub result: QualType,
    #[serde(default)]
    pub is_variadic: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_pure_virtual: bool,
    #[serde(default)]
    pub is_const: bool,
}

impl Callable {
    pub fn has_va_list_param(&self) -> bool {
        self.params
            .iter()
            .any(|param| param.ty.spelling.contains("va_list"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    #[serde(default = "yes")]
    pub is_definition: bool,
    #[serde(default)]
    pub is_scoped: bool,
    pub underlying: Fundamental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Signed(i64),
    Unsigned(u64),
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(value) => write!(f, "{value}"),
            Self::Unsigned(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumConstant {
    pub value: EnumValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub tag: RecordTag,
    #[serde(default = "yes")]
    pub is_definition: bool,
    /// Byte size reported by the parser; authoritative for the layout self-check.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub align: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    #[serde(rename = "type")]
    pub ty: QualType,
    #[serde(default)]
    pub bit_width: Option<u32>,
    /// Offset from the start of the record in bits, when the parser knows it.
    #[serde(default)]
    pub offset_bits: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseDecl {
    #[serde(rename = "type")]
    pub ty: QualType,
    #[serde(default)]
    pub is_virtual: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDecl {
    pub template: TemplateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherDecl {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclKind {
    TranslationUnit,
    Namespace,
    Enum(EnumDecl),
    EnumConstant(EnumConstant),
    Function(Callable),
    Record(RecordDecl),
    Constructor(Callable),
    Destructor(Callable),
    Method(Callable),
    Field(FieldDecl),
    BaseSpecifier(BaseDecl),
    Template(TemplateDecl),
    /// Declarations the binding model never looks at (typedefs, variables, usings...).
    Other(OtherDecl),
}

impl DeclKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::TranslationUnit => "translation unit",
            Self::Namespace => "namespace",
            Self::Enum(_) => "enum",
            Self::EnumConstant(_) => "enum constant",
            Self::Function(_) => "function",
            Self::Record(record) => match record.tag {
                RecordTag::Struct => "struct",
                RecordTag::Class => "class",
                RecordTag::Union => "union",
            },
            Self::Constructor(_) => "constructor",
            Self::Destructor(_) => "destructor",
            Self::Method(_) => "method",
            Self::Field(_) => "field",
            Self::BaseSpecifier(_) => "base specifier",
            Self::Template(_) => "template",
            Self::Other(_) => "declaration",
        }
    }
}

/// One node of the parsed declaration tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclNode {
    #[serde(flatten)]
    pub kind: DeclKind,
    #[serde(default)]
    pub name: Option<String>,
    /// Parser-unique identifier (a clang USR), stable across translation units.
    #[serde(default)]
    pub usr: Option<String>,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default)]
    pub children: Vec<DeclNode>,
}

const fn yes() -> bool {
    true
}

impl DeclNode {
    pub fn new(kind: DeclKind, name: Option<&str>) -> Self {
        Self {
            kind,
            name: name.filter(|name| !name.is_empty()).map(str::to_string),
            usr: None,
            access: Access::Unspecified,
            linkage: Linkage::None,
            location: SourceLocation::unknown(),
            comment: None,
            annotations: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn translation_unit(file: impl Into<PathBuf>) -> Self {
        let mut node = Self::new(DeclKind::TranslationUnit, None);
        node.location = SourceLocation::new(file, 0, 0);
        node
    }

    pub fn namespace(name: &str) -> Self {
        Self::new(DeclKind::Namespace, Some(name))
    }

    pub fn enumeration(name: Option<&str>, underlying: Fundamental, is_scoped: bool) -> Self {
        Self::new(
            DeclKind::Enum(EnumDecl {
                is_definition: true,
                is_scoped,
                underlying,
            }),
            name,
        )
    }

    pub fn enum_constant(name: &str, value: EnumValue) -> Self {
        Self::new(DeclKind::EnumConstant(EnumConstant { value }), Some(name))
    }

    pub fn function(name: &str, params: Vec<Param>, result: QualType) -> Self {
        let mut node = Self::new(
            DeclKind::Function(Callable {
                params,
                result,
                ..Callable::default()
            }),
            Some(name),
        );
        node.linkage = Linkage::External;
        node
    }

    pub fn record(tag: RecordTag, name: &str, size: u64, align: u64) -> Self {
        Self::new(
            DeclKind::Record(RecordDecl {
                tag,
                is_definition: true,
                size: Some(size),
                align: Some(align),
            }),
            Some(name),
        )
    }

    pub fn constructor(class_name: &str, params: Vec<Param>) -> Self {
        Self::member(
            DeclKind::Constructor(Callable {
                params,
                ..Callable::default()
            }),
            class_name,
        )
    }

    pub fn destructor(class_name: &str) -> Self {
        Self::member(
            DeclKind::Destructor(Callable::default()),
            &format!("~{class_name}"),
        )
    }

    pub fn method(name: &str, params: Vec<Param>, result: QualType) -> Self {
        Self::member(
            DeclKind::Method(Callable {
                params,
                result,
                ..Callable::default()
            }),
            name,
        )
    }

    pub fn field(name: &str, ty: QualType) -> Self {
        let mut node = Self::new(
            DeclKind::Field(FieldDecl {
                ty,
                bit_width: None,
                offset_bits: None,
            }),
            Some(name),
        );
        node.access = Access::Public;
        node
    }

    pub fn bit_field(name: &str, ty: QualType, width: u32) -> Self {
        let mut node = Self::field(name, ty);
        if let DeclKind::Field(field) = &mut node.kind {
            field.bit_width = Some(width);
        }
        node
    }

    pub fn base(ty: QualType) -> Self {
        let mut node = Self::new(
            DeclKind::BaseSpecifier(BaseDecl {
                ty,
                is_virtual: false,
            }),
            None,
        );
        node.access = Access::Public;
        node
    }

    pub fn template(name: &str, template: TemplateKind) -> Self {
        Self::new(DeclKind::Template(TemplateDecl { template }), Some(name))
    }

    fn member(kind: DeclKind, name: &str) -> Self {
        let mut node = Self::new(kind, Some(name));
        node.access = Access::Public;
        node.linkage = Linkage::External;
        node
    }

    pub fn with_usr(mut self, usr: &str) -> Self {
        self.usr = Some(usr.to_string());
        self
    }

    /// Sets the linker symbol of a callable; a no-op on other kinds.
    pub fn with_mangled(mut self, symbol: &str) -> Self {
        if let Some(callable) = self.callable_mut() {
            callable.mangled_name = Some(symbol.to_string());
        }
        self
    }

    pub fn annotated(mut self, marker: &str) -> Self {
        self.annotations.push(marker.to_string());
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn at(mut self, file: &str, line: u32, column: u32) -> Self {
        self.location = SourceLocation::new(file, line, column);
        self
    }

    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    /// Records the parser-reported bit offset of a field; a no-op on other kinds.
    pub fn at_offset(mut self, bits: u64) -> Self {
        if let DeclKind::Field(field) = &mut self.kind {
            field.offset_bits = Some(bits);
        }
        self
    }

    /// Applies `update` to the callable payload, if this node has one.
    pub fn with_callable(mut self, update: impl FnOnce(&mut Callable)) -> Self {
        if let Some(callable) = self.callable_mut() {
            update(callable);
        }
        self
    }

    /// Marks an enum or aggregate as a forward declaration.
    pub fn declaration_only(mut self) -> Self {
        match &mut self.kind {
            DeclKind::Enum(decl) => decl.is_definition = false,
            DeclKind::Record(decl) => decl.is_definition = false,
            _ => {}
        }
        self
    }

    pub fn callable(&self) -> Option<&Callable> {
        match &self.kind {
            DeclKind::Function(callable)
            | DeclKind::Constructor(callable)
            | DeclKind::Destructor(callable)
            | DeclKind::Method(callable) => Some(callable),
            _ => None,
        }
    }

    fn callable_mut(&mut self) -> Option<&mut Callable> {
        match &mut self.kind {
            DeclKind::Function(callable)
            | DeclKind::Constructor(callable)
            | DeclKind::Destructor(callable)
            | DeclKind::Method(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn is_marked(&self, marker: &str) -> bool {
        self.annotations.iter().any(|annotation| annotation == marker)
    }

    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }

    /// Identity used to merge repeated declarations of one entity.
    pub fn identity(&self) -> String {
        if let Some(usr) = &self.usr {
            return usr.clone();
        }
        if let Some(symbol) = self.callable().and_then(|c| c.mangled_name.as_ref()) {
            return symbol.clone();
        }
        let mut identity = format!("{}:{}", self.kind.describe(), self.name_or(""));
        if let Some(callable) = self.callable() {
            let params = callable
                .params
                .iter()
                .map(|param| param.ty.spelling.as_str())
                .collect::<Vec<_>>()
                .join(",");
            identity.push_str(&format!("({params})"));
        }
        identity
    }
}
