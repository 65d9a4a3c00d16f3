use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use entangle_decl::Frontend;
use entangle_decl::json::JsonFrontend;
use entangle_utils::errors::emit_diagnostics;
use entangle_utils::logger;
use tracing::debug;

use crate::config::{Config, ConfigError, Environment, FrontendKind, USAGE};
use crate::pipeline::{self, RunOutcome};
use crate::version::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "entangle",
    version = VERSION,
    about = "Generates Python ctypes bindings for annotated C++ headers",
    override_usage = "entangle [COMPILER FLAGS]... <LIBRARY> <HEADER>... <OUTPUT>"
)]
pub struct EntangleCli {
    /// Compiler flags (anything starting with '-'), the library, the headers and the output.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    arguments: Vec<String>,
}

impl EntangleCli {
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = EntangleCli::parse();
    run_with(cli.arguments(), &Environment::capture())
}

/// Runs one generation for already split-off command line arguments.
pub fn run_with(arguments: &[String], env: &Environment) -> Result<()> {
    let config = match Config::from_args(arguments, env) {
        Ok(config) => config,
        Err(error @ ConfigError::Usage { .. }) => {
            eprintln!("{}: {error}", "error".red().bold());
            eprintln!("{USAGE}");
            bail!("usage error");
        }
        Err(error) => return Err(error).context("invalid configuration"),
    };
    let frontend = select_frontend(config.frontend)?;
    debug!(frontend = frontend.name(), headers = config.headers.len(), "starting run");

    match pipeline::run(&config, frontend.as_ref()) {
        Ok(RunOutcome::UpToDate) => {
            println!("{} {}", "up to date".green().bold(), config.output.display());
            Ok(())
        }
        Ok(RunOutcome::Written {
            output,
            bytes,
            symbols,
        }) => {
            println!(
                "{} {} ({symbols} declarations, {bytes} bytes)",
                "wrote".green().bold(),
                output.display()
            );
            Ok(())
        }
        Err(error) => {
            let diagnostics = error.diagnostics();
            if diagnostics.is_empty() {
                return Err(error).context("binding generation failed");
            }
            emit_diagnostics(&diagnostics);
            bail!("binding generation failed");
        }
    }
}

fn select_frontend(kind: FrontendKind) -> Result<Box<dyn Frontend>> {
    match kind {
        FrontendKind::Json => Ok(Box::new(JsonFrontend)),
        #[cfg(feature = "libclang")]
        FrontendKind::Clang => Ok(Box::new(entangle_decl::clang::ClangFrontend)),
        #[cfg(not(feature = "libclang"))]
        FrontendKind::Clang => {
            bail!("this build of entangle has no libclang support; set ENTANGLE_FRONTEND=json")
        }
    }
}
