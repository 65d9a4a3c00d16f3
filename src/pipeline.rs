//! One generation run: parse every header, build the symbol table, emit the
//! module and write it together with its dependency manifest.

use std::path::PathBuf;

use entangle_decl::{Frontend, Severity};
use entangle_utils::profiler::{PhaseTiming, Profiler};
use tracing::{debug, info, warn};

use crate::assemble::{Provenance, assemble, resolve_timestamp, write_atomically};
use crate::config::Config;
use crate::depfile::DependencyManifest;
use crate::emit::emit_sections;
use crate::error::GenerateError;
use crate::mapper::TypeMapper;
use crate::symbols::SymbolTableBuilder;

/// A generated module that has not been written yet.
#[derive(Debug)]
pub struct Generation {
    pub source: String,
    /// Headers and everything they include.
    pub dependencies: Vec<PathBuf>,
    pub symbols: usize,
    pub timings: Vec<PhaseTiming>,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The manifest shows the existing output is current.
    UpToDate,
    Written {
        output: PathBuf,
        bytes: usize,
        symbols: usize,
    },
}

pub fn generate(config: &Config, frontend: &dyn Frontend) -> Result<Generation, GenerateError> {
    let mut profiler = Profiler::new();
    let mut builder = SymbolTableBuilder::new(&config.annotation);
    let mut dependencies = config.headers.clone();

    for header in &config.headers {
        let unit =
            profiler.record_phase("Parse", || frontend.parse(header, &config.compiler_flags))?;
        let notes = unit
            .diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Warning);
        for diagnostic in notes {
            warn!(header = %header.display(), "{diagnostic}");
        }
        if unit.has_errors() {
            return Err(GenerateError::Parse {
                header: header.clone(),
                diagnostics: unit.errors().cloned().collect(),
            });
        }
        debug!(header = %header.display(), includes = unit.includes.len(), "parsed");
        dependencies.extend(unit.includes.iter().cloned());
        profiler.record_phase("Collect", || builder.add_unit(&unit.root))?;
    }

    let table = profiler.record_phase("Resolve", || builder.finish())?;
    let mapper = TypeMapper::new(&table, config.abi);
    let sections = profiler.record_phase("Emit", || emit_sections(&table, &mapper))?;

    let provenance = Provenance {
        library: config.library.clone(),
        headers: config.headers.clone(),
        timestamp: resolve_timestamp(config.source_date_epoch, &config.headers),
        invocation: config.invocation.clone(),
    };
    let source = assemble(&provenance, &sections);
    info!(symbols = table.len(), bytes = source.len(), "generated bindings");

    Ok(Generation {
        source,
        dependencies,
        symbols: table.len(),
        timings: profiler.phases().to_vec(),
    })
}

/// Generates and writes the output unless the manifest says it is current.
pub fn run(config: &Config, frontend: &dyn Frontend) -> Result<RunOutcome, GenerateError> {
    let manifest_path = config.manifest_path();
    let existing = DependencyManifest::load(&manifest_path).map_err(|source| GenerateError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    if existing.is_some_and(|manifest| {
        manifest.is_current(&config.invocation, &config.output, &manifest_path)
    }) {
        info!(output = %config.output.display(), "bindings are up to date");
        return Ok(RunOutcome::UpToDate);
    }

    let generation = generate(config, frontend)?;
    for phase in &generation.timings {
        debug!(phase = %phase.name, micros = phase.duration.as_micros(), "phase timing");
    }
    write_atomically(&config.output, &generation.source).map_err(|source| GenerateError::Io {
        path: config.output.clone(),
        source,
    })?;
    // Written last so an interrupted run never looks current.
    let manifest = DependencyManifest::new(config.invocation.clone(), generation.dependencies);
    write_atomically(&manifest_path, &manifest.render()).map_err(|source| GenerateError::Io {
        path: manifest_path.clone(),
        source,
    })?;

    Ok(RunOutcome::Written {
        output: config.output.clone(),
        bytes: generation.source.len(),
        symbols: generation.symbols,
    })
}
