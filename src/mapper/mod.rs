//! Canonical C++ type → Python `ctypes` type or type hint.

pub mod abi;

use entangle_decl::{CanonicalType, Fundamental, Indirection, TypeRef};
use entangle_utils::suggest::find_best_match;
use thiserror::Error;
use tracing::trace;

pub use abi::{Layout, TargetAbi};

/// What the mapped type string is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Parameter annotation in the user-facing signature.
    ArgumentHint,
    /// Return annotation in the user-facing signature.
    ReturnHint,
    /// Element of a foreign function's `argtypes`.
    FfiArgument,
    /// A foreign function's `restype`.
    FfiReturn,
    /// Type of an entry in a structure's `_fields_`.
    AggregateField,
}

impl Purpose {
    fn is_hint(self) -> bool {
        matches!(self, Self::ArgumentHint | Self::ReturnHint)
    }

    fn is_return(self) -> bool {
        matches!(self, Self::ReturnHint | Self::FfiReturn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("`{spelling}` has more than one level of pointer or reference indirection")]
    PointerDepth { spelling: String },
    #[error("`{spelling}` passes an enum by pointer or reference; pass the enum by value")]
    EnumIndirection { spelling: String },
    #[error("returning `{spelling}` is unsupported; character references cannot be returned")]
    CharReferenceReturn { spelling: String },
    #[error("array `{spelling}` is only allowed as a structure field")]
    ArrayOutsideAggregate { spelling: String },
    #[error("missing definition for `{spelling}`")]
    MissingDefinition {
        spelling: String,
        suggestion: Option<String>,
    },
    #[error("`void` cannot be used as a value here")]
    VoidValue,
    #[error("no layout is known for `{spelling}`")]
    IncompleteLayout { spelling: String },
    #[error("unsupported type `{spelling}`")]
    Unsupported { spelling: String },
    #[error("size of `{spelling}` does not fit in 64 bits")]
    LayoutOverflow { spelling: String },
}

/// A user-defined type the binding knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedType {
    Enum {
        path: String,
        underlying: Fundamental,
    },
    Aggregate {
        path: String,
        layout: Option<Layout>,
    },
}

/// Lookup of bound enums and aggregates by the parser's unique identifier.
pub trait TypeResolver {
    fn resolve(&self, named: &TypeRef) -> Option<NamedType>;

    /// Qualified names of every bound type, for "did you mean" hints.
    fn bound_names(&self) -> Vec<String>;
}

pub struct TypeMapper<'a> {
    resolver: &'a dyn TypeResolver,
    abi: TargetAbi,
}

impl<'a> TypeMapper<'a> {
    pub fn new(resolver: &'a dyn TypeResolver, abi: TargetAbi) -> Self {
        Self { resolver, abi }
    }

    pub fn abi(&self) -> &TargetAbi {
        &self.abi
    }

    pub fn map(&self, ty: &CanonicalType, purpose: Purpose) -> Result<String, TypeError> {
        check_depth(ty)?;
        let mapped = match ty {
            CanonicalType::Fundamental(kind) => self.fundamental(*kind, purpose)?,
            CanonicalType::Pointer(_)
            | CanonicalType::LValueReference(_)
            | CanonicalType::RValueReference(_) => {
                let Some((indirection, pointee)) = ty.indirection() else {
                    return Err(unsupported(ty));
                };
                self.indirect(ty, indirection, pointee, purpose)?
            }
            CanonicalType::ConstantArray { element, len } => {
                if purpose != Purpose::AggregateField {
                    return Err(TypeError::ArrayOutsideAggregate {
                        spelling: ty.to_string(),
                    });
                }
                format!("({} * {len})", self.map(element, purpose)?)
            }
            CanonicalType::Enum(named) => match self.resolve(named)? {
                NamedType::Enum { .. } if purpose.is_hint() => "int".to_string(),
                NamedType::Enum { underlying, .. } => self.ffi_name(underlying),
                NamedType::Aggregate { .. } => return Err(self.missing(named)),
            },
            CanonicalType::Record(named) => match self.resolve(named)? {
                NamedType::Aggregate { path, .. } => path,
                NamedType::Enum { .. } => return Err(self.missing(named)),
            },
            CanonicalType::Unsupported(_) => return Err(unsupported(ty)),
        };
        trace!(ty = %ty, ?purpose, mapped = %mapped, "mapped type");
        Ok(mapped)
    }

    /// Size and alignment of `ty` as a structure field.
    pub fn field_layout(&self, ty: &CanonicalType) -> Result<Layout, TypeError> {
        check_depth(ty)?;
        match ty {
            CanonicalType::Fundamental(kind) => {
                self.abi.fundamental(*kind).ok_or(TypeError::VoidValue)
            }
            CanonicalType::Pointer(_)
            | CanonicalType::LValueReference(_)
            | CanonicalType::RValueReference(_) => Ok(self.abi.pointer),
            CanonicalType::ConstantArray { element, len } => {
                let element = self.field_layout(element)?;
                let size = element.size.checked_mul(*len).ok_or_else(|| {
                    TypeError::LayoutOverflow {
                        spelling: ty.to_string(),
                    }
                })?;
                Ok(Layout::new(size, element.align))
            }
            CanonicalType::Enum(named) => match self.resolve(named)? {
                NamedType::Enum { underlying, .. } => {
                    self.abi.fundamental(underlying).ok_or(TypeError::VoidValue)
                }
                NamedType::Aggregate { .. } => Err(self.missing(named)),
            },
            CanonicalType::Record(named) => match self.resolve(named)? {
                NamedType::Aggregate { layout, .. } => {
                    layout.ok_or_else(|| TypeError::IncompleteLayout {
                        spelling: named.spelling.clone(),
                    })
                }
                NamedType::Enum { .. } => Err(self.missing(named)),
            },
            CanonicalType::Unsupported(_) => Err(unsupported(ty)),
        }
    }

    /// The `ctypes` scalar for a fundamental, e.g. `ctypes.c_int32`.
    pub fn ffi_name(&self, kind: Fundamental) -> String {
        let name = match kind {
            Fundamental::Void => return "None".to_string(),
            Fundamental::Bool => "c_bool",
            Fundamental::Char => "c_char",
            Fundamental::SChar => "c_int8",
            Fundamental::UChar => "c_uint8",
            Fundamental::WChar => "c_wchar",
            Fundamental::Char16 | Fundamental::UShort => "c_uint16",
            Fundamental::Char32 | Fundamental::UInt => "c_uint32",
            Fundamental::Short => "c_int16",
            Fundamental::Int => "c_int32",
            Fundamental::Long if self.abi.long_size == 8 => "c_int64",
            Fundamental::Long => "c_int32",
            Fundamental::ULong if self.abi.long_size == 8 => "c_uint64",
            Fundamental::ULong => "c_uint32",
            Fundamental::LongLong => "c_int64",
            Fundamental::ULongLong => "c_uint64",
            Fundamental::Float => "c_float",
            Fundamental::Double => "c_double",
            Fundamental::LongDouble => "c_longdouble",
        };
        format!("ctypes.{name}")
    }

    fn fundamental(&self, kind: Fundamental, purpose: Purpose) -> Result<String, TypeError> {
        if kind == Fundamental::Void {
            return match purpose {
                Purpose::ReturnHint | Purpose::FfiReturn => Ok("None".to_string()),
                _ => Err(TypeError::VoidValue),
            };
        }
        let mapped = match purpose {
            Purpose::ArgumentHint | Purpose::ReturnHint => match kind {
                Fundamental::Bool => "bool",
                Fundamental::WChar => "str",
                Fundamental::Char if purpose == Purpose::ArgumentHint => "bytes | int",
                Fundamental::Char => "bytes",
                other if other.is_floating() => "float",
                _ => "int",
            }
            .to_string(),
            Purpose::FfiArgument | Purpose::FfiReturn | Purpose::AggregateField => {
                self.ffi_name(kind)
            }
        };
        Ok(mapped)
    }

    fn indirect(
        &self,
        ty: &CanonicalType,
        indirection: Indirection,
        pointee: &CanonicalType,
        purpose: Purpose,
    ) -> Result<String, TypeError> {
        match pointee {
            CanonicalType::Fundamental(kind) => {
                self.indirect_fundamental(ty, indirection, *kind, purpose)
            }
            CanonicalType::Enum(named) => {
                self.resolve(named)?;
                Err(TypeError::EnumIndirection {
                    spelling: ty.to_string(),
                })
            }
            CanonicalType::Record(named) => {
                let path = match self.resolve(named)? {
                    NamedType::Aggregate { path, .. } => path,
                    NamedType::Enum { .. } => return Err(self.missing(named)),
                };
                Ok(match purpose {
                    Purpose::ArgumentHint => path,
                    Purpose::ReturnHint => format!("ctypes._Pointer[{path}]"),
                    Purpose::FfiArgument | Purpose::FfiReturn => {
                        format!("ctypes.POINTER({path})")
                    }
                    // Opaque so mutually-pointing aggregates never depend on each other's layout.
                    Purpose::AggregateField => "ctypes.c_void_p".to_string(),
                })
            }
            CanonicalType::Pointer(_)
            | CanonicalType::LValueReference(_)
            | CanonicalType::RValueReference(_) => Err(TypeError::PointerDepth {
                spelling: ty.to_string(),
            }),
            CanonicalType::ConstantArray { .. } | CanonicalType::Unsupported(_) => {
                Err(unsupported(ty))
            }
        }
    }

    fn indirect_fundamental(
        &self,
        ty: &CanonicalType,
        indirection: Indirection,
        kind: Fundamental,
        purpose: Purpose,
    ) -> Result<String, TypeError> {
        if purpose.is_return() && kind.is_text() && indirection.is_reference() {
            return Err(TypeError::CharReferenceReturn {
                spelling: ty.to_string(),
            });
        }
        let ffi = self.ffi_name(kind);
        let mapped = match purpose {
            Purpose::ArgumentHint if indirection.is_reference() && kind != Fundamental::Void => ffi,
            Purpose::ArgumentHint => "Any".to_string(),
            Purpose::ReturnHint => match kind {
                Fundamental::Void => "int | None".to_string(),
                Fundamental::Char => "bytes | None".to_string(),
                Fundamental::WChar => "str | None".to_string(),
                _ => format!("ctypes._Pointer[{ffi}]"),
            },
            Purpose::FfiReturn => match kind {
                Fundamental::Void => "ctypes.c_void_p".to_string(),
                Fundamental::Char => "ctypes.c_char_p".to_string(),
                Fundamental::WChar => "ctypes.c_wchar_p".to_string(),
                _ => format!("ctypes.POINTER({ffi})"),
            },
            Purpose::FfiArgument | Purpose::AggregateField => match kind {
                Fundamental::Void => "ctypes.c_void_p".to_string(),
                _ => format!("ctypes.POINTER({ffi})"),
            },
        };
        Ok(mapped)
    }

    fn resolve(&self, named: &TypeRef) -> Result<NamedType, TypeError> {
        self.resolver
            .resolve(named)
            .ok_or_else(|| self.missing(named))
    }

    fn missing(&self, named: &TypeRef) -> TypeError {
        let names = self.resolver.bound_names();
        let suggestion = find_best_match(&named.spelling, names.iter().map(String::as_str))
            .map(str::to_string);
        TypeError::MissingDefinition {
            spelling: named.spelling.clone(),
            suggestion,
        }
    }
}

fn unsupported(ty: &CanonicalType) -> TypeError {
    TypeError::Unsupported {
        spelling: ty.to_string(),
    }
}

/// Rejects a pointer or reference whose pointee is itself a pointer or reference.
fn check_depth(ty: &CanonicalType) -> Result<(), TypeError> {
    match ty {
        CanonicalType::ConstantArray { element, .. } => check_depth(element),
        other => match other.indirection() {
            Some((_, pointee)) if pointee.indirection().is_some() => Err(TypeError::PointerDepth {
                spelling: ty.to_string(),
            }),
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use entangle_decl::QualType;

    use super::*;

    #[derive(Default)]
    struct Known(BTreeMap<String, NamedType>);

    impl Known {
        fn with(mut self, usr: &str, named: NamedType) -> Self {
            self.0.insert(usr.to_string(), named);
            self
        }
    }

    impl TypeResolver for Known {
        fn resolve(&self, named: &TypeRef) -> Option<NamedType> {
            self.0.get(&named.usr).cloned()
        }

        fn bound_names(&self) -> Vec<String> {
            self.0
                .values()
                .map(|named| match named {
                    NamedType::Enum { path, .. } | NamedType::Aggregate { path, .. } => path.clone(),
                })
                .collect()
        }
    }

    fn known() -> Known {
        Known::default()
            .with(
                "c:@S@Widget",
                NamedType::Aggregate {
                    path: "ns.Widget".into(),
                    layout: Some(Layout::new(16, 8)),
                },
            )
            .with(
                "c:@E@Mode",
                NamedType::Enum {
                    path: "ns.Mode".into(),
                    underlying: Fundamental::Short,
                },
            )
    }

    fn canonical(ty: QualType) -> CanonicalType {
        ty.canonical
    }

    const ALL_PURPOSES: [Purpose; 5] = [
        Purpose::ArgumentHint,
        Purpose::ReturnHint,
        Purpose::FfiArgument,
        Purpose::FfiReturn,
        Purpose::AggregateField,
    ];

    #[test]
    fn double_indirection_is_rejected_for_every_purpose() {
        let resolver = known();
        let mapper = TypeMapper::new(&resolver, TargetAbi::LP64);
        let int = QualType::fundamental(Fundamental::Int);
        let widget = QualType::record("c:@S@Widget", "Widget");
        let nested = [
            canonical(int.clone().pointer_to().pointer_to()),
            canonical(int.clone().pointer_to().reference_to()),
            canonical(widget.clone().pointer_to().pointer_to()),
            canonical(QualType::void().pointer_to().pointer_to()),
            canonical(int.pointer_to().pointer_to().array_of(2)),
        ];
        for ty in &nested {
            for purpose in ALL_PURPOSES {
                let result = mapper.map(ty, purpose);
                assert!(
                    matches!(result, Err(TypeError::PointerDepth { .. })),
                    "{ty} as {purpose:?} gave {result:?}"
                );
            }
        }
    }

    #[test]
    fn array_sizes_that_overflow_are_rejected() -> Result<(), TypeError> {
        let resolver = known();
        let mapper = TypeMapper::new(&resolver, TargetAbi::LP64);
        let double = QualType::fundamental(Fundamental::Double);
        let grid = canonical(double.clone().array_of(4).array_of(3));
        assert_eq!(mapper.field_layout(&grid)?, Layout::new(96, 8));
        let huge = canonical(double.array_of(u64::MAX / 2));
        assert!(matches!(
            mapper.field_layout(&huge),
            Err(TypeError::LayoutOverflow { .. })
        ));
        Ok(())
    }

    #[test]
    fn fundamentals_map_to_fixed_width_types() -> Result<(), TypeError> {
        let resolver = known();
        let lp64 = TypeMapper::new(&resolver, TargetAbi::LP64);
        let llp64 = TypeMapper::new(&resolver, TargetAbi::LLP64);
        let long = CanonicalType::Fundamental(Fundamental::Long);
        assert_eq!(lp64.map(&long, Purpose::FfiArgument)?, "ctypes.c_int64");
        assert_eq!(llp64.map(&long, Purpose::FfiArgument)?, "ctypes.c_int32");
        let wide = CanonicalType::Fundamental(Fundamental::WChar);
        assert_eq!(lp64.map(&wide, Purpose::ArgumentHint)?, "str");
        assert_eq!(lp64.map(&wide, Purpose::AggregateField)?, "ctypes.c_wchar");
        let void = CanonicalType::Fundamental(Fundamental::Void);
        assert_eq!(lp64.map(&void, Purpose::FfiReturn)?, "None");
        assert_eq!(lp64.map(&void, Purpose::FfiArgument), Err(TypeError::VoidValue));
        Ok(())
    }

    #[test]
    fn pointers_to_fundamentals_depend_on_purpose() -> Result<(), TypeError> {
        let resolver = known();
        let mapper = TypeMapper::new(&resolver, TargetAbi::LP64);
        let float_ptr = canonical(QualType::fundamental(Fundamental::Float).pointer_to());
        let float_ref = canonical(QualType::fundamental(Fundamental::Float).reference_to());
        assert_eq!(mapper.map(&float_ptr, Purpose::ArgumentHint)?, "Any");
        assert_eq!(mapper.map(&float_ref, Purpose::ArgumentHint)?, "ctypes.c_float");
        assert_eq!(
            mapper.map(&float_ptr, Purpose::FfiArgument)?,
            "ctypes.POINTER(ctypes.c_float)"
        );

        let char_ptr = canonical(QualType::fundamental(Fundamental::Char).pointer_to());
        assert_eq!(mapper.map(&char_ptr, Purpose::FfiReturn)?, "ctypes.c_char_p");
        assert_eq!(mapper.map(&char_ptr, Purpose::ReturnHint)?, "bytes | None");
        assert_eq!(
            mapper.map(&char_ptr, Purpose::AggregateField)?,
            "ctypes.POINTER(ctypes.c_char)"
        );

        let void_ptr = canonical(QualType::void().pointer_to());
        assert_eq!(mapper.map(&void_ptr, Purpose::FfiReturn)?, "ctypes.c_void_p");
        assert_eq!(mapper.map(&void_ptr, Purpose::ReturnHint)?, "int | None");

        let wide_ref = canonical(QualType::fundamental(Fundamental::WChar).reference_to());
        assert!(matches!(
            mapper.map(&wide_ref, Purpose::ReturnHint),
            Err(TypeError::CharReferenceReturn { .. })
        ));
        assert_eq!(mapper.map(&wide_ref, Purpose::FfiArgument)?, "ctypes.POINTER(ctypes.c_wchar)");
        Ok(())
    }

    #[test]
    fn enums_travel_as_their_underlying_integer() -> Result<(), TypeError> {
        let resolver = known();
        let mapper = TypeMapper::new(&resolver, TargetAbi::LP64);
        let mode = QualType::enumeration("c:@E@Mode", "Mode");
        assert_eq!(mapper.map(&mode.canonical, Purpose::ArgumentHint)?, "int");
        assert_eq!(mapper.map(&mode.canonical, Purpose::FfiArgument)?, "ctypes.c_int16");
        assert!(matches!(
            mapper.map(&mode.pointer_to().canonical, Purpose::FfiArgument),
            Err(TypeError::EnumIndirection { .. })
        ));
        Ok(())
    }

    #[test]
    fn aggregates_resolve_through_the_symbol_table() -> Result<(), TypeError> {
        let resolver = known();
        let mapper = TypeMapper::new(&resolver, TargetAbi::LP64);
        let widget = QualType::record("c:@S@Widget", "Widget");
        assert_eq!(mapper.map(&widget.canonical, Purpose::FfiArgument)?, "ns.Widget");
        let by_ptr = widget.clone().pointer_to().canonical;
        assert_eq!(mapper.map(&by_ptr, Purpose::FfiArgument)?, "ctypes.POINTER(ns.Widget)");
        assert_eq!(mapper.map(&by_ptr, Purpose::AggregateField)?, "ctypes.c_void_p");

        let typo = QualType::record("c:@S@Widgit", "Widgit");
        match mapper.map(&typo.canonical, Purpose::FfiArgument) {
            Err(TypeError::MissingDefinition { spelling, suggestion }) => {
                assert_eq!(spelling, "Widgit");
                assert_eq!(suggestion.as_deref(), Some("ns.Widget"));
            }
            other => panic!("expected missing definition, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn arrays_are_layout_only() -> Result<(), TypeError> {
        let resolver = known();
        let mapper = TypeMapper::new(&resolver, TargetAbi::LP64);
        let array = QualType::fundamental(Fundamental::Double).array_of(4).canonical;
        assert_eq!(
            mapper.map(&array, Purpose::AggregateField)?,
            "(ctypes.c_double * 4)"
        );
        assert_eq!(mapper.field_layout(&array)?, Layout::new(32, 8));
        assert!(matches!(
            mapper.map(&array, Purpose::FfiArgument),
            Err(TypeError::ArrayOutsideAggregate { .. })
        ));
        Ok(())
    }
}
