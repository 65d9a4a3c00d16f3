//! libclang front end, enabled by the `libclang` feature.

use std::path::{Path, PathBuf};

use ::clang::diagnostic::Severity as ClangSeverity;
use ::clang::{Accessibility, Clang, Entity, EntityKind, Index, Linkage as ClangLinkage, Type, TypeKind};
use entangle_span::SourceLocation;
use tracing::{debug, trace};

use crate::frontend::{Frontend, FrontendError, ParsedUnit, ParserDiagnostic, Severity};
use crate::node::{
    Access, BaseDecl, Callable, DeclKind, DeclNode, EnumConstant, EnumDecl, EnumValue, FieldDecl,
    Linkage, OtherDecl, Param, RecordDecl, RecordTag, TemplateDecl, TemplateKind,
};
use crate::types::{CanonicalType, Fundamental, QualType, TypeRef};

/// Parses headers with libclang, skipping function bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClangFrontend;

impl Frontend for ClangFrontend {
    fn name(&self) -> &'static str {
        "clang"
    }

    fn parse(&self, header: &Path, flags: &[String]) -> Result<ParsedUnit, FrontendError> {
        // One libclang instance per translation unit; dropped before returning.
        let clang = Clang::new().map_err(FrontendError::Clang)?;
        let index = Index::new(&clang, false, false);
        debug!(header = %header.display(), flags = ?flags, "parsing with libclang");

        let unit = index
            .parser(header)
            .arguments(flags)
            .skip_function_bodies(true)
            .detailed_preprocessing_record(true)
            .parse()
            .map_err(|error| FrontendError::Clang(format!("{}: {error}", header.display())))?;

        let diagnostics = unit
            .get_diagnostics()
            .iter()
            .map(|diagnostic| ParserDiagnostic {
                severity: match diagnostic.get_severity() {
                    ClangSeverity::Ignored => Severity::Ignored,
                    ClangSeverity::Note => Severity::Note,
                    ClangSeverity::Warning => Severity::Warning,
                    ClangSeverity::Error => Severity::Error,
                    ClangSeverity::Fatal => Severity::Fatal,
                },
                message: diagnostic.get_text(),
                location: location_of(diagnostic.get_location()),
            })
            .collect::<Vec<_>>();

        let root_entity = unit.get_entity();
        let mut includes = Vec::new();
        let mut root = DeclNode::translation_unit(header);
        for child in root_entity.get_children() {
            if child.get_kind() == EntityKind::InclusionDirective {
                if let Some(file) = child.get_file() {
                    includes.push(file.get_path());
                }
                continue;
            }
            if child.is_in_system_header() {
                continue;
            }
            if let Some(node) = convert_entity(&child) {
                root.children.push(node);
            }
        }
        includes.sort();
        includes.dedup();

        Ok(ParsedUnit {
            root,
            diagnostics,
            includes,
        })
    }
}

fn location_of(location: ::clang::source::SourceLocation<'_>) -> SourceLocation {
    let file_location = location.get_file_location();
    SourceLocation {
        file: file_location
            .file
            .map(|file| file.get_path())
            .unwrap_or_else(PathBuf::new),
        line: file_location.line,
        column: file_location.column,
    }
}

fn convert_entity(entity: &Entity<'_>) -> Option<DeclNode> {
    let kind = match entity.get_kind() {
        EntityKind::Namespace => DeclKind::Namespace,
        EntityKind::EnumDecl => DeclKind::Enum(EnumDecl {
            is_definition: entity.is_definition(),
            is_scoped: entity.is_scoped(),
            underlying: entity
                .get_enum_underlying_type()
                .and_then(|ty| fundamental_of(ty.get_canonical_type().get_kind()))
                .unwrap_or(Fundamental::Int),
        }),
        EntityKind::EnumConstantDecl => {
            let (signed, unsigned) = entity.get_enum_constant_value()?;
            let is_unsigned = entity
                .get_semantic_parent()
                .and_then(|parent| parent.get_enum_underlying_type())
                .and_then(|ty| fundamental_of(ty.get_canonical_type().get_kind()))
                .is_some_and(|kind| !kind.is_signed());
            DeclKind::EnumConstant(EnumConstant {
                value: if is_unsigned {
                    EnumValue::Unsigned(unsigned)
                } else {
                    EnumValue::Signed(signed)
                },
            })
        }
        EntityKind::FunctionDecl => DeclKind::Function(callable_of(entity)),
        EntityKind::StructDecl | EntityKind::ClassDecl | EntityKind::UnionDecl => {
            let ty = entity.get_type();
            DeclKind::Record(RecordDecl {
                tag: match entity.get_kind() {
                    EntityKind::StructDecl => RecordTag::Struct,
                    EntityKind::ClassDecl => RecordTag::Class,
                    _ => RecordTag::Union,
                },
                is_definition: entity.is_definition(),
                size: ty.and_then(|ty| ty.get_sizeof().ok()).map(|size| size as u64),
                align: ty.and_then(|ty| ty.get_alignof().ok()).map(|align| align as u64),
            })
        }
        EntityKind::Constructor => DeclKind::Constructor(callable_of(entity)),
        EntityKind::Destructor => DeclKind::Destructor(callable_of(entity)),
        EntityKind::Method | EntityKind::ConversionFunction => {
            DeclKind::Method(callable_of(entity))
        }
        EntityKind::FieldDecl => DeclKind::Field(FieldDecl {
            ty: qual_type(entity.get_type()?),
            bit_width: entity
                .is_bit_field()
                .then(|| entity.get_bit_field_width())
                .flatten()
                .map(|width| width as u32),
            offset_bits: entity.get_offset_of_field().ok().map(|bits| bits as u64),
        }),
        EntityKind::BaseSpecifier => DeclKind::BaseSpecifier(BaseDecl {
            ty: qual_type(entity.get_type()?),
            is_virtual: entity.is_virtual_base(),
        }),
        EntityKind::ClassTemplate => DeclKind::Template(TemplateDecl {
            template: TemplateKind::ClassTemplate,
        }),
        EntityKind::FunctionTemplate => DeclKind::Template(TemplateDecl {
            template: TemplateKind::FunctionTemplate,
        }),
        EntityKind::ClassTemplatePartialSpecialization => DeclKind::Template(TemplateDecl {
            template: TemplateKind::PartialSpecialization,
        }),
        // Attributes are folded into their owner's annotation list.
        EntityKind::AnnotateAttr | EntityKind::ParmDecl => return None,
        other => DeclKind::Other(OtherDecl {
            description: format!("{other:?}"),
        }),
    };

    let mut node = DeclNode::new(kind, entity.get_name().as_deref());
    node.usr = entity.get_usr().map(|usr| usr.0);
    node.access = match entity.get_accessibility() {
        Some(Accessibility::Public) => Access::Public,
        Some(Accessibility::Protected) => Access::Protected,
        Some(Accessibility::Private) => Access::Private,
        None => Access::Unspecified,
    };
    node.linkage = match entity.get_linkage() {
        Some(ClangLinkage::External) => Linkage::External,
        Some(ClangLinkage::UniqueExternal) => Linkage::UniqueExternal,
        Some(ClangLinkage::Internal) => Linkage::Internal,
        Some(ClangLinkage::Automatic) | None => Linkage::None,
    };
    if let Some(location) = entity.get_location() {
        node.location = location_of(location);
    }
    node.comment = entity.get_comment();

    for child in entity.get_children() {
        if child.get_kind() == EntityKind::AnnotateAttr {
            if let Some(annotation) = child.get_name() {
                node.annotations.push(annotation);
            }
        } else if let Some(converted) = convert_entity(&child) {
            node.children.push(converted);
        }
    }
    trace!(kind = node.kind.describe(), name = ?node.name, "converted entity");
    Some(node)
}

fn callable_of(entity: &Entity<'_>) -> Callable {
    let params = entity
        .get_arguments()
        .unwrap_or_default()
        .iter()
        .map(|argument| Param {
            name: argument.get_name().filter(|name| !name.is_empty()),
            ty: argument
                .get_type()
                .map(qual_type)
                .unwrap_or_else(|| QualType::from(CanonicalType::Unsupported("<unknown>".into()))),
        })
        .collect();
    Callable {
        mangled_name: entity.get_mangled_name(),
        params,
        result: entity
            .get_result_type()
            .map(qual_type)
            .unwrap_or_else(QualType::void),
        is_variadic: entity.is_variadic(),
        is_static: entity.is_static_method(),
        is_virtual: entity.is_virtual_method(),
        is_pure_virtual: entity.is_pure_virtual_method(),
        is_const: entity.is_const_method(),
    }
}

fn qual_type(ty: Type<'_>) -> QualType {
    QualType::new(ty.get_display_name(), canonical_of(ty.get_canonical_type()))
}

fn canonical_of(ty: Type<'_>) -> CanonicalType {
    if let Some(kind) = fundamental_of(ty.get_kind()) {
        return CanonicalType::Fundamental(kind);
    }
    let pointee = || {
        ty.get_pointee_type()
            .map(|pointee| Box::new(canonical_of(pointee.get_canonical_type())))
    };
    let named = || {
        ty.get_declaration().map(|decl| {
            TypeRef::new(
                decl.get_usr().map(|usr| usr.0).unwrap_or_default(),
                ty.get_display_name(),
            )
        })
    };
    let resolved = match ty.get_kind() {
        TypeKind::Pointer => pointee().map(CanonicalType::Pointer),
        TypeKind::LValueReference => pointee().map(CanonicalType::LValueReference),
        TypeKind::RValueReference => pointee().map(CanonicalType::RValueReference),
        TypeKind::ConstantArray => ty.get_element_type().zip(ty.get_size()).map(|(element, len)| {
            CanonicalType::ConstantArray {
                element: Box::new(canonical_of(element.get_canonical_type())),
                len: len as u64,
            }
        }),
        TypeKind::Enum => named().map(CanonicalType::Enum),
        TypeKind::Record => named().map(CanonicalType::Record),
        _ => None,
    };
    resolved.unwrap_or_else(|| CanonicalType::Unsupported(ty.get_display_name()))
}

fn fundamental_of(kind: TypeKind) -> Option<Fundamental> {
    Some(match kind {
        TypeKind::Void => Fundamental::Void,
        TypeKind::Bool => Fundamental::Bool,
        TypeKind::CharS | TypeKind::CharU => Fundamental::Char,
        TypeKind::SChar => Fundamental::SChar,
        TypeKind::UChar => Fundamental::UChar,
        TypeKind::WChar => Fundamental::WChar,
        TypeKind::Char16 => Fundamental::Char16,
        TypeKind::Char32 => Fundamental::Char32,
        TypeKind::Short => Fundamental::Short,
        TypeKind::UShort => Fundamental::UShort,
        TypeKind::Int => Fundamental::Int,
        TypeKind::UInt => Fundamental::UInt,
        TypeKind::Long => Fundamental::Long,
        TypeKind::ULong => Fundamental::ULong,
        TypeKind::LongLong => Fundamental::LongLong,
        TypeKind::ULongLong => Fundamental::ULongLong,
        TypeKind::Float => Fundamental::Float,
        TypeKind::Double => Fundamental::Double,
        TypeKind::LongDouble => Fundamental::LongDouble,
        _ => return None,
    })
}
