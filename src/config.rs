//! Run configuration assembled from the command line and environment.

use std::path::PathBuf;

use thiserror::Error;

use crate::depfile::DependencyManifest;
use crate::mapper::TargetAbi;

pub const DEFAULT_ANNOTATION: &str = "entanglement";
pub const FRONTEND_ENV: &str = "ENTANGLE_FRONTEND";
pub const SOURCE_DATE_EPOCH_ENV: &str = "SOURCE_DATE_EPOCH";

pub const USAGE: &str = "usage: entangle [COMPILER FLAGS]... <LIBRARY> <HEADER>... <OUTPUT>\n\
\n\
Arguments starting with '-' are passed to the C++ parser; the first other\n\
argument names the shared library, the last names the Python module to\n\
write and everything in between is a header to bind.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendKind {
    /// Reads `<header>.decl.json` declaration dumps.
    Json,
    /// Parses headers with libclang.
    Clang,
}

impl FrontendKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "clang" | "libclang" => Ok(Self::Clang),
            other => Err(ConfigError::UnknownFrontend(other.to_string())),
        }
    }

    fn default_for_build() -> Self {
        if cfg!(feature = "libclang") {
            Self::Clang
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("expected a library, at least one header and an output path; got {found} argument(s)")]
    Usage { found: usize },
    #[error("unknown frontend `{0}` (expected `json` or `clang`)")]
    UnknownFrontend(String),
    #[error("{SOURCE_DATE_EPOCH_ENV} must be a whole number of seconds, got `{0}`")]
    InvalidEpoch(String),
}

/// Environment variables a run depends on, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub frontend: Option<String>,
    pub source_date_epoch: Option<String>,
}

impl Environment {
    pub fn capture() -> Self {
        Self {
            frontend: std::env::var(FRONTEND_ENV).ok(),
            source_date_epoch: std::env::var(SOURCE_DATE_EPOCH_ENV).ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Library file name, loaded from the generated module's directory.
    pub library: String,
    pub headers: Vec<PathBuf>,
    pub output: PathBuf,
    pub compiler_flags: Vec<String>,
    pub annotation: String,
    pub abi: TargetAbi,
    pub frontend: FrontendKind,
    /// Arguments as given, recorded in the output and the manifest.
    pub invocation: String,
    pub source_date_epoch: Option<i64>,
}

impl Config {
    /// Splits `arguments` into compiler flags and `<library> <header>... <output>`.
    pub fn from_args(arguments: &[String], env: &Environment) -> Result<Self, ConfigError> {
        let (compiler_flags, positional): (Vec<String>, Vec<String>) = arguments
            .iter()
            .cloned()
            .partition(|argument| argument.starts_with('-'));
        let [library, headers @ .., output] = positional.as_slice() else {
            return Err(ConfigError::Usage {
                found: positional.len(),
            });
        };
        if headers.is_empty() {
            return Err(ConfigError::Usage {
                found: positional.len(),
            });
        }

        let frontend = match env.frontend.as_deref() {
            Some(value) if !value.trim().is_empty() => FrontendKind::parse(value)?,
            _ => FrontendKind::default_for_build(),
        };
        let source_date_epoch = match env.source_date_epoch.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(value) => Some(
                value
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidEpoch(value.to_string()))?,
            ),
        };

        Ok(Self {
            library: library.clone(),
            headers: headers.iter().map(PathBuf::from).collect(),
            output: PathBuf::from(output),
            compiler_flags,
            annotation: DEFAULT_ANNOTATION.to_string(),
            abi: TargetAbi::host(),
            frontend,
            invocation: arguments.join(" "),
            source_date_epoch,
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        DependencyManifest::path_for(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn flags_are_separated_from_positionals() -> Result<(), ConfigError> {
        let arguments = args(&[
            "-std=c++17",
            "libdemo.so",
            "-Iinclude",
            "a.hpp",
            "b.hpp",
            "demo.py",
            "-DNDEBUG",
        ]);
        let config = Config::from_args(&arguments, &Environment::default())?;
        assert_eq!(config.library, "libdemo.so");
        assert_eq!(config.headers, vec![PathBuf::from("a.hpp"), PathBuf::from("b.hpp")]);
        assert_eq!(config.output, PathBuf::from("demo.py"));
        assert_eq!(config.compiler_flags, args(&["-std=c++17", "-Iinclude", "-DNDEBUG"]));
        assert_eq!(config.invocation, arguments.join(" "));
        assert_eq!(config.manifest_path(), PathBuf::from("demo.py.d.txt"));
        Ok(())
    }

    #[test]
    fn too_few_positionals_is_a_usage_error() {
        let result = Config::from_args(&args(&["-O2", "lib.so", "out.py"]), &Environment::default());
        assert_eq!(result, Err(ConfigError::Usage { found: 2 }));
    }

    #[test]
    fn environment_selects_frontend_and_epoch() -> Result<(), ConfigError> {
        let env = Environment {
            frontend: Some("JSON".to_string()),
            source_date_epoch: Some("1700000000".to_string()),
        };
        let config = Config::from_args(&args(&["lib.so", "a.hpp", "out.py"]), &env)?;
        assert_eq!(config.frontend, FrontendKind::Json);
        assert_eq!(config.source_date_epoch, Some(1_700_000_000));

        let bad = Environment {
            frontend: Some("gcc".to_string()),
            ..Environment::default()
        };
        assert_eq!(
            Config::from_args(&args(&["lib.so", "a.hpp", "out.py"]), &bad),
            Err(ConfigError::UnknownFrontend("gcc".to_string()))
        );
        Ok(())
    }
}
