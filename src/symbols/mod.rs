//! The symbol table: every bound declaration under a structural key.

pub mod key;
pub mod naming;
pub mod table;

pub use key::{DeclRank, Segment, SymbolKey};
pub use table::{RecordInfo, SymbolEntry, SymbolTable, SymbolTableBuilder};
