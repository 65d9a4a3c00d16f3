//! Python source generation from a finished symbol table.

pub mod api;
pub mod layout;
pub mod overload;
pub mod signature;
pub mod symbols;
pub mod writer;

use tracing::debug;

use crate::error::BindResult;
use crate::mapper::TypeMapper;
use crate::order::{scope_events, sorted_entries};
use crate::symbols::SymbolTable;

/// The three generated sections, in module order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub api: String,
    pub layout: String,
    pub symbols: String,
}

pub fn emit_sections(table: &SymbolTable, mapper: &TypeMapper<'_>) -> BindResult<Sections> {
    let entries = sorted_entries(table);
    let events = scope_events(&entries)?;
    let api = api::emit_api(&events, table, mapper)?;
    let layout = layout::emit_layouts(table, mapper)?;
    let symbols = symbols::emit_symbols(table, mapper)?;
    debug!(
        api = api.len(),
        layout = layout.len(),
        symbols = symbols.len(),
        "emitted sections"
    );
    Ok(Sections {
        api,
        layout,
        symbols,
    })
}
