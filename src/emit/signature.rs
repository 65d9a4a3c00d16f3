//! How one C++ callable is called from Python: parameter names, marshaling,
//! type hints and the foreign function's `argtypes`/`restype`.

use std::collections::BTreeSet;

use entangle_decl::{CanonicalType, DeclKind, DeclNode, Fundamental};

use super::writer::py_str;
use crate::error::{BindError, BindResult, Violation};
use crate::mapper::{Purpose, TypeError, TypeMapper};
use crate::symbols::naming::check_identifier;
use crate::symbols::{DeclRank, SymbolEntry, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Free function or static method.
    Free,
    /// Instance method; `self` is passed by pointer.
    Instance,
    Constructor,
    Destructor,
}

impl Receiver {
    pub fn takes_self(self) -> bool {
        self != Self::Free
    }
}

/// Conversion applied to a Python argument before the foreign call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marshal {
    Direct,
    /// Pointer to a fundamental; accepts ctypes objects and buffer providers.
    Buffer { ctype: Option<String> },
    /// Aggregate; derived instances are narrowed to their embedded base.
    Upcast { path: String },
}

#[derive(Debug, Clone)]
pub struct ParamPlan {
    pub name: String,
    pub hint: String,
    pub ffi: String,
    pub marshal: Marshal,
}

impl ParamPlan {
    pub fn argument(&self, value: &str) -> String {
        match &self.marshal {
            Marshal::Direct => value.to_string(),
            Marshal::Buffer { ctype } => format!(
                "_entangle_pointer_or_buffer({value}, {})",
                ctype.as_deref().unwrap_or("None")
            ),
            Marshal::Upcast { path } => format!("_entangle_upcast({value}, {path})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallPlan<'a> {
    pub decl: &'a DeclNode,
    pub symbol: String,
    pub receiver: Receiver,
    /// Python path of the owning aggregate for members.
    pub owner: Option<String>,
    pub params: Vec<ParamPlan>,
    pub result_hint: String,
    pub restype: String,
}

impl CallPlan<'_> {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn argtypes(&self) -> Vec<String> {
        let receiver = self
            .owner
            .as_ref()
            .filter(|_| self.receiver.takes_self())
            .map(|owner| format!("ctypes.POINTER({owner})"));
        receiver
            .into_iter()
            .chain(self.params.iter().map(|param| param.ffi.clone()))
            .collect()
    }

    /// `name(self, a: int) -> int` as shown in a signature or docstring.
    pub fn signature(&self, name: &str) -> String {
        let mut params: Vec<String> = Vec::new();
        if self.receiver.takes_self() {
            params.push("self".to_string());
        }
        params.extend(
            self.params
                .iter()
                .map(|param| format!("{}: {}", param.name, param.hint)),
        );
        format!("{name}({}) -> {}", params.join(", "), self.result_hint)
    }

    /// The foreign call, with each argument taken from `values`.
    pub fn call(&self, values: &[String]) -> String {
        let mut args: Vec<String> = Vec::new();
        if self.receiver.takes_self() {
            args.push("ctypes.byref(self)".to_string());
        }
        args.extend(
            self.params
                .iter()
                .zip(values)
                .map(|(param, value)| param.argument(value)),
        );
        format!("_entangle_sym[{}]({})", py_str(&self.symbol), args.join(", "))
    }

    /// Statements that perform the call and return its result.
    pub fn body(&self, values: &[String]) -> Vec<String> {
        let call = self.call(values);
        match self.receiver {
            Receiver::Constructor => vec![call, "return".to_string()],
            Receiver::Destructor => vec![
                "if self._b_needsfree_:".to_string(),
                format!("\t{call}"),
                "return".to_string(),
            ],
            Receiver::Free | Receiver::Instance => vec![format!("return {call}")],
        }
    }
}

pub fn plan_call<'a>(
    entry: &SymbolEntry,
    decl: &'a DeclNode,
    table: &SymbolTable,
    mapper: &TypeMapper<'_>,
) -> BindResult<CallPlan<'a>> {
    let Some(callable) = decl.callable() else {
        return Err(BindError::new(
            decl.location.clone(),
            Violation::UnsupportedDeclaration {
                name: entry.key.to_string(),
                description: decl.kind.describe().to_string(),
            },
        ));
    };
    let receiver = match &decl.kind {
        DeclKind::Constructor(_) => Receiver::Constructor,
        DeclKind::Destructor(_) => Receiver::Destructor,
        DeclKind::Method(callable) if !callable.is_static => Receiver::Instance,
        _ => Receiver::Free,
    };
    let owner = entry
        .key
        .rank()
        .is_member()
        .then(|| entry.key.scope_path());

    let symbol = match &callable.mangled_name {
        Some(symbol) if !symbol.is_empty() => symbol.clone(),
        // Unmangled names are only meaningful for `extern "C"` style functions.
        _ if entry.key.rank() == DeclRank::Function => decl.name_or(entry.key.name()).to_string(),
        _ => {
            return Err(BindError::new(
                decl.location.clone(),
                Violation::MissingSymbol {
                    name: entry.key.to_string(),
                },
            ));
        }
    };

    let type_error = |what: String, error: TypeError| {
        BindError::new(
            decl.location.clone(),
            Violation::Type {
                context: format!("{what} of `{}`", entry.key),
                error,
            },
        )
    };

    let mut used = BTreeSet::new();
    let mut params = Vec::with_capacity(callable.params.len());
    for (index, param) in callable.params.iter().enumerate() {
        let name = param_name(index, param.name.as_deref(), &mut used);
        let canonical = &param.ty.canonical;
        let what = || format!("parameter `{name}`");
        let hint = mapper
            .map(canonical, Purpose::ArgumentHint)
            .map_err(|error| type_error(what(), error))?;
        let ffi = mapper
            .map(canonical, Purpose::FfiArgument)
            .map_err(|error| type_error(what(), error))?;
        let marshal = marshal_for(canonical, table, mapper);
        params.push(ParamPlan {
            name,
            hint,
            ffi,
            marshal,
        });
    }

    let (result_hint, restype) = match receiver {
        Receiver::Constructor | Receiver::Destructor => ("None".to_string(), "None".to_string()),
        Receiver::Free | Receiver::Instance => {
            let result = &callable.result.canonical;
            let hint = mapper
                .map(result, Purpose::ReturnHint)
                .map_err(|error| type_error("return type".to_string(), error))?;
            let restype = mapper
                .map(result, Purpose::FfiReturn)
                .map_err(|error| type_error("return type".to_string(), error))?;
            (hint, restype)
        }
    };

    Ok(CallPlan {
        decl,
        symbol,
        receiver,
        owner,
        params,
        result_hint,
        restype,
    })
}

fn marshal_for(ty: &CanonicalType, table: &SymbolTable, mapper: &TypeMapper<'_>) -> Marshal {
    if let Some(aggregate) = table.aggregate_of(ty) {
        return Marshal::Upcast {
            path: aggregate.key.python_path(),
        };
    }
    match ty.indirection() {
        Some((indirection, CanonicalType::Fundamental(kind))) if !indirection.is_reference() => {
            Marshal::Buffer {
                ctype: (*kind != Fundamental::Void).then(|| mapper.ffi_name(*kind)),
            }
        }
        _ => Marshal::Direct,
    }
}

/// The C++ parameter name when Python can use it, else `argN`.
fn param_name(index: usize, name: Option<&str>, used: &mut BTreeSet<String>) -> String {
    let usable = name.filter(|name| {
        check_identifier(name).is_ok()
            && !matches!(*name, "self" | "args")
            && !is_positional(name)
            && !used.contains(*name)
    });
    let chosen = usable.map_or_else(|| format!("arg{index}"), str::to_string);
    used.insert(chosen.clone());
    chosen
}

fn is_positional(name: &str) -> bool {
    name.strip_prefix("arg")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
