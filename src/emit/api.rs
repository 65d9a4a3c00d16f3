//! The user-facing half of the module: namespaces, classes, enums and the
//! functions that call into the library.

use entangle_decl::DeclKind;

use super::overload::{plan_dispatch, write_dispatcher};
use super::signature::{CallPlan, Receiver, plan_call};
use super::writer::{CodeWriter, doc_text};
use crate::error::{BindError, BindResult, Violation};
use crate::mapper::TypeMapper;
use crate::order::ScopeEvent;
use crate::symbols::{DeclRank, SymbolEntry, SymbolTable};

pub fn emit_api(
    events: &[ScopeEvent<'_>],
    table: &SymbolTable,
    mapper: &TypeMapper<'_>,
) -> BindResult<String> {
    let mut w = CodeWriter::new();
    let mut scopes: Vec<DeclRank> = Vec::new();
    for event in events {
        match *event {
            ScopeEvent::Push(segment) => {
                if segment.rank == DeclRank::Namespace {
                    if w.depth() == 0 {
                        w.blank();
                    }
                    w.line(format!("class {}:", segment.name));
                }
                w.indent();
                scopes.push(segment.rank);
            }
            ScopeEvent::Pop(_) => {
                w.line("pass");
                w.dedent();
                scopes.pop();
                if w.depth() == 0 {
                    w.blank();
                }
            }
            ScopeEvent::Member(entry) => {
                let scope = scopes.last().copied();
                match entry.key.rank() {
                    DeclRank::Enum => write_enum(&mut w, entry)?,
                    DeclRank::Struct | DeclRank::Class => write_aggregate(&mut w, entry),
                    DeclRank::Namespace => {}
                    DeclRank::Function
                    | DeclRank::Constructor
                    | DeclRank::Destructor
                    | DeclRank::Method => write_callable(&mut w, entry, scope, table, mapper)?,
                }
            }
        }
    }
    Ok(w.finish())
}

fn write_enum(w: &mut CodeWriter, entry: &SymbolEntry) -> BindResult<()> {
    let node = entry.primary();
    let DeclKind::Enum(decl) = &node.kind else {
        return Err(BindError::new(
            node.location.clone(),
            Violation::ScopeOrder {
                detail: format!("`{}` is keyed as an enum", entry.key),
            },
        ));
    };
    let name = entry.key.name();
    let constants: Vec<(&str, String)> = node
        .children
        .iter()
        .filter_map(|child| match (&child.kind, &child.name) {
            (DeclKind::EnumConstant(constant), Some(constant_name)) => {
                Some((constant_name.as_str(), constant.value.to_string()))
            }
            _ => None,
        })
        .collect();

    w.line(format!("class {name}(enum.IntEnum):"));
    w.indent();
    if let Some(doc) = node.comment.as_deref().and_then(doc_text) {
        w.docstring(&doc);
    }
    for (constant, value) in &constants {
        w.line(format!("{constant} = {value}"));
    }
    w.dedent();
    if !decl.is_scoped {
        for (constant, _) in &constants {
            w.line(format!("{constant} = {name}.{constant}"));
        }
    }
    Ok(())
}

fn write_aggregate(w: &mut CodeWriter, entry: &SymbolEntry) {
    if w.depth() == 0 {
        w.blank();
    }
    w.line(format!("class {}(_EntangleStructure):", entry.key.name()));
    // The scope push that follows opens the body at this depth.
    if let Some(doc) = entry.primary().comment.as_deref().and_then(doc_text) {
        w.indent();
        w.docstring(&doc);
        w.dedent();
    }
}

fn write_callable(
    w: &mut CodeWriter,
    entry: &SymbolEntry,
    scope: Option<DeclRank>,
    table: &SymbolTable,
    mapper: &TypeMapper<'_>,
) -> BindResult<()> {
    let plans = entry
        .decls
        .iter()
        .map(|decl| plan_call(entry, decl, table, mapper))
        .collect::<BindResult<Vec<_>>>()?;
    let Some(first) = plans.first() else {
        return Ok(());
    };
    if entry.key.rank() == DeclRank::Destructor && plans.len() > 1 {
        return Err(BindError::new(
            entry.location().clone(),
            Violation::ConflictingDefinition {
                path: entry.key.to_string(),
            },
        )
        .with_related(plans[1..].iter().map(|plan| plan.decl.location.clone())));
    }

    let name = entry.key.name();
    let is_static = first.receiver == Receiver::Free;
    if w.depth() == 0 {
        w.blank();
    }
    // Namespaces are classes too, so anything nested needs the decorator.
    if is_static && scope.is_some() {
        w.line("@_entangle_builtins.staticmethod");
    }

    if let [plan] = plans.as_slice() {
        write_direct(w, name, plan);
        return Ok(());
    }
    let buckets = plan_dispatch(&entry.key.python_path(), &plans, table)?;
    let doc = overload_doc(name, &plans);
    write_dispatcher(w, name, &entry.key.python_path(), &plans, &buckets, &doc);
    Ok(())
}

fn write_direct(w: &mut CodeWriter, name: &str, plan: &CallPlan<'_>) {
    w.line(format!("def {}:", plan.signature(name)));
    w.indent();
    if let Some(doc) = plan.decl.comment.as_deref().and_then(doc_text) {
        w.docstring(&doc);
    }
    let values: Vec<String> = plan.params.iter().map(|param| param.name.clone()).collect();
    for statement in plan.body(&values) {
        w.line(statement);
    }
    w.dedent();
}

fn overload_doc(name: &str, plans: &[CallPlan<'_>]) -> String {
    let mut doc = String::from("Overloads:\n");
    for plan in plans {
        doc.push('\n');
        doc.push_str(&plan.signature(name));
        if let Some(text) = plan.decl.comment.as_deref().and_then(doc_text) {
            for line in text.lines() {
                doc.push('\n');
                if !line.is_empty() {
                    doc.push_str("    ");
                    doc.push_str(line);
                }
            }
        }
    }
    doc
}
