//! Generates Python `ctypes` bindings for annotated declarations in C++ headers.

pub mod assemble;
pub mod cli;
pub mod config;
pub mod depfile;
pub mod emit;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod order;
pub mod pipeline;
pub mod symbols;
pub mod version;
