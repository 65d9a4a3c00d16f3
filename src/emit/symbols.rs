//! The symbol section: one `_entangle_bind` per linker symbol.

use std::collections::BTreeMap;

use entangle_span::SourceLocation;

use super::signature::plan_call;
use super::writer::{CodeWriter, py_str};
use crate::error::{BindError, BindResult, Violation};
use crate::mapper::TypeMapper;
use crate::symbols::SymbolTable;

struct Binding {
    argtypes: String,
    restype: String,
    location: SourceLocation,
}

pub fn emit_symbols(table: &SymbolTable, mapper: &TypeMapper<'_>) -> BindResult<String> {
    let mut bindings: BTreeMap<String, Binding> = BTreeMap::new();
    for entry in table.entries().filter(|entry| entry.key.rank().is_callable()) {
        for decl in &entry.decls {
            let plan = plan_call(entry, decl, table, mapper)?;
            let binding = Binding {
                argtypes: format!("[{}]", plan.argtypes().join(", ")),
                restype: plan.restype.clone(),
                location: decl.location.clone(),
            };
            match bindings.get(&plan.symbol) {
                Some(existing)
                    if existing.argtypes != binding.argtypes
                        || existing.restype != binding.restype =>
                {
                    return Err(BindError::new(
                        binding.location,
                        Violation::SymbolSignatureConflict {
                            symbol: plan.symbol,
                        },
                    )
                    .with_related([existing.location.clone()]));
                }
                Some(_) => {}
                None => {
                    bindings.insert(plan.symbol, binding);
                }
            }
        }
    }

    let mut w = CodeWriter::new();
    for (symbol, binding) in &bindings {
        w.line(format!(
            "_entangle_bind({}, {}, {})",
            py_str(symbol),
            binding.argtypes,
            binding.restype
        ));
    }
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use entangle_decl::{DeclNode, Fundamental, Param, QualType};

    use super::*;
    use crate::mapper::TargetAbi;
    use crate::symbols::SymbolTableBuilder;

    const MARK: &str = "entanglement";

    fn emit(functions: Vec<DeclNode>) -> BindResult<String> {
        let root = DeclNode::translation_unit("api.hpp").with_children(functions);
        let mut builder = SymbolTableBuilder::new(MARK);
        builder.add_unit(&root)?;
        let table = builder.finish()?;
        emit_symbols(&table, &TypeMapper::new(&table, TargetAbi::LP64))
    }

    fn aliased(name: &str, param: Fundamental) -> DeclNode {
        DeclNode::function(name, vec![Param::new("x", QualType::fundamental(param))], QualType::void())
            .with_mangled("_Z6sharedi")
            .annotated(MARK)
    }

    #[test]
    fn one_symbol_is_bound_once() -> BindResult<()> {
        let text = emit(vec![aliased("first", Fundamental::Int), aliased("second", Fundamental::Int)])?;
        assert_eq!(text, "_entangle_bind('_Z6sharedi', [ctypes.c_int32], None)\n");
        Ok(())
    }

    #[test]
    fn one_symbol_with_two_signatures_is_rejected() {
        match emit(vec![aliased("first", Fundamental::Int), aliased("second", Fundamental::Double)]) {
            Err(error) => {
                assert_eq!(
                    error.violation,
                    Violation::SymbolSignatureConflict {
                        symbol: "_Z6sharedi".to_string()
                    }
                );
                assert_eq!(error.related.len(), 1);
            }
            Ok(text) => panic!("expected a signature conflict, got {text}"),
        }
    }
}
