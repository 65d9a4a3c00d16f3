//! Runtime dispatch for overloaded callables.
//!
//! Candidates are told apart by argument count first. Within one count, the
//! class of the first argument decides, most-derived class tested first; a
//! candidate whose first parameter is not a class is the fallback.

use std::collections::BTreeMap;

use super::signature::{CallPlan, Receiver};
use super::writer::CodeWriter;
use crate::error::{BindError, BindResult, Violation};
use crate::symbols::SymbolTable;

#[derive(Debug)]
pub struct Branch<'p, 'a> {
    /// Class the first argument must be an instance of.
    pub guard: Option<String>,
    pub plan: &'p CallPlan<'a>,
}

#[derive(Debug)]
pub struct Bucket<'p, 'a> {
    pub arity: usize,
    pub branches: Vec<Branch<'p, 'a>>,
}

impl Bucket<'_, '_> {
    /// The last branch accepts anything.
    pub fn is_exhaustive(&self) -> bool {
        self.branches.last().is_some_and(|branch| branch.guard.is_none())
    }
}

pub fn plan_dispatch<'p, 'a>(
    name: &str,
    plans: &'p [CallPlan<'a>],
    table: &SymbolTable,
) -> BindResult<Vec<Bucket<'p, 'a>>> {
    if let Some(first) = plans.first() {
        let is_static = |plan: &CallPlan<'_>| plan.receiver == Receiver::Free;
        if plans.iter().any(|plan| is_static(plan) != is_static(first)) {
            return Err(BindError::new(
                first.decl.location.clone(),
                Violation::MixedStaticOverload {
                    name: name.to_string(),
                },
            )
            .with_related(plans[1..].iter().map(|plan| plan.decl.location.clone())));
        }
    }

    let mut by_arity: BTreeMap<usize, Vec<&'p CallPlan<'a>>> = BTreeMap::new();
    for plan in plans {
        by_arity.entry(plan.arity()).or_default().push(plan);
    }

    let mut buckets = Vec::with_capacity(by_arity.len());
    for (arity, candidates) in by_arity {
        if let [only] = candidates.as_slice() {
            buckets.push(Bucket {
                arity,
                branches: vec![Branch {
                    guard: None,
                    plan: only,
                }],
            });
            continue;
        }

        let mut by_generation: BTreeMap<u32, Vec<(&'p CallPlan<'a>, Option<String>)>> =
            BTreeMap::new();
        for plan in candidates {
            let first_class = plan
                .decl
                .callable()
                .and_then(|callable| callable.params.first())
                .and_then(|param| table.aggregate_of(&param.ty.canonical));
            let generation = first_class.map_or(0, |entry| entry.generation());
            let guard = first_class.map(|entry| entry.key.python_path());
            by_generation.entry(generation).or_default().push((plan, guard));
        }

        if let Some(clash) = by_generation.values().find(|group| group.len() > 1) {
            let mut locations = clash.iter().map(|(plan, _)| plan.decl.location.clone());
            let first = locations.next().unwrap_or_default();
            return Err(BindError::new(
                first,
                Violation::AmbiguousOverload {
                    name: name.to_string(),
                    arity,
                },
            )
            .with_related(locations));
        }

        let branches = by_generation
            .into_iter()
            .rev()
            .flat_map(|(_, group)| group)
            .map(|(plan, guard)| Branch { guard, plan })
            .collect();
        buckets.push(Bucket { arity, branches });
    }
    Ok(buckets)
}

/// Writes the dispatching `def` for an overload set.
pub fn write_dispatcher(
    w: &mut CodeWriter,
    name: &str,
    qualified: &str,
    plans: &[CallPlan<'_>],
    buckets: &[Bucket<'_, '_>],
    doc: &str,
) {
    let receiver = plans.first().map_or(Receiver::Free, |plan| plan.receiver);
    let (params, result) = match receiver {
        Receiver::Free => ("*args: Any", "Any"),
        Receiver::Instance => ("self, *args: Any", "Any"),
        Receiver::Constructor | Receiver::Destructor => ("self, *args: Any", "None"),
    };
    w.line(format!("def {name}({params}) -> {result}:"));
    w.indent();
    w.docstring(doc);
    for bucket in buckets {
        let values: Vec<String> = (0..bucket.arity).map(|index| format!("args[{index}]")).collect();
        w.line(format!("if _entangle_builtins.len(args) == {}:", bucket.arity));
        w.indent();
        for branch in &bucket.branches {
            match &branch.guard {
                Some(class) => {
                    w.line(format!("if _entangle_isinstance(args[0], {class}):"));
                    w.indent();
                    for statement in branch.plan.body(&values) {
                        w.line(statement);
                    }
                    w.dedent();
                }
                None => {
                    for statement in branch.plan.body(&values) {
                        w.line(statement);
                    }
                }
            }
        }
        if !bucket.is_exhaustive() {
            w.line(format!(
                "raise _entangle_builtins.TypeError(f'{qualified}: no overload accepts a first argument of type {{_entangle_builtins.type(args[0]).__name__}}')"
            ));
        }
        w.dedent();
    }
    w.line(format!(
        "raise _entangle_builtins.TypeError(f'{qualified}: no overload takes {{_entangle_builtins.len(args)}} arguments')"
    ));
    w.dedent();
}
