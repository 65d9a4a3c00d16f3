//! Turns the sorted symbol table into a flat stream of scope events.
//!
//! Python class bodies cannot be reopened, so every member of a scope has to
//! be emitted in one contiguous run. Key order guarantees that; this module
//! checks it while rebuilding the scope nesting.

use tracing::trace;

use crate::error::{BindError, BindResult, Violation};
use crate::symbols::{DeclRank, Segment, SymbolEntry, SymbolTable};

#[derive(Debug, Clone, Copy)]
pub enum ScopeEvent<'a> {
    Push(&'a Segment),
    Member(&'a SymbolEntry),
    Pop(&'a Segment),
}

impl ScopeEvent<'_> {
    /// Short text form, e.g. `push ns0` or `member ns0.fn1`.
    pub fn describe(&self) -> String {
        match self {
            Self::Push(segment) => format!("push {}", segment.name),
            Self::Member(entry) => format!("member {}", entry.key.python_path()),
            Self::Pop(segment) => format!("pop {}", segment.name),
        }
    }
}

/// Table entries in emission order.
pub fn sorted_entries(table: &SymbolTable) -> Vec<&SymbolEntry> {
    table.entries().collect()
}

/// Rebuilds scope pushes and pops around `entries`, which must be strictly
/// ascending by key.
pub fn scope_events<'a>(entries: &[&'a SymbolEntry]) -> BindResult<Vec<ScopeEvent<'a>>> {
    let mut stack: Vec<&'a Segment> = Vec::new();
    let mut events = Vec::with_capacity(entries.len() * 2);
    let mut previous: Option<&'a SymbolEntry> = None;

    for &entry in entries {
        let key = &entry.key;
        if let Some(previous) = previous {
            if previous.key >= *key {
                return Err(order_error(
                    entry,
                    format!("`{key}` follows `{}`", previous.key),
                ));
            }
        }

        let common = stack
            .iter()
            .zip(&key.scope)
            .take_while(|(open, wanted)| ***open == **wanted)
            .count();
        while stack.len() > common {
            if let Some(segment) = stack.pop() {
                events.push(ScopeEvent::Pop(segment));
            }
        }
        for segment in &key.scope[common..] {
            // An aggregate scope only opens straight after its own entry.
            if segment.rank != DeclRank::Namespace {
                return Err(order_error(
                    entry,
                    format!("`{key}` is separated from its enclosing `{}`", segment.name),
                ));
            }
            stack.push(segment);
            events.push(ScopeEvent::Push(segment));
        }

        events.push(ScopeEvent::Member(entry));
        if key.rank().is_aggregate() {
            stack.push(&key.leaf);
            events.push(ScopeEvent::Push(&key.leaf));
        }
        previous = Some(entry);
    }
    while let Some(segment) = stack.pop() {
        events.push(ScopeEvent::Pop(segment));
    }
    trace!(events = events.len(), "scope events rebuilt");
    Ok(events)
}

fn order_error(entry: &SymbolEntry, detail: String) -> BindError {
    BindError::new(entry.location().clone(), Violation::ScopeOrder { detail })
}
