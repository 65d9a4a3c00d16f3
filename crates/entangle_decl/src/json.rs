use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::frontend::{Frontend, FrontendError, ParsedUnit};

/// Reads a serialized [`ParsedUnit`] instead of parsing C++.
///
/// The dump is the header itself when it ends in `.json`, otherwise the
/// sidecar `<header>.decl.json`. Compiler flags are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFrontend;

impl JsonFrontend {
    pub fn dump_path(header: &Path) -> PathBuf {
        if header.extension().is_some_and(|ext| ext == "json") {
            return header.to_path_buf();
        }
        let mut sidecar = header.as_os_str().to_owned();
        sidecar.push(".decl.json");
        PathBuf::from(sidecar)
    }
}

impl Frontend for JsonFrontend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, header: &Path, _flags: &[String]) -> Result<ParsedUnit, FrontendError> {
        let path = Self::dump_path(header);
        debug!(dump = %path.display(), "loading declaration dump");
        let text = fs::read_to_string(&path).map_err(|source| FrontendError::Io {
            path: path.clone(),
            source,
        })?;
        let mut unit: ParsedUnit =
            serde_json::from_str(&text).map_err(|source| FrontendError::Json {
                path: path.clone(),
                source,
            })?;
        if path != header {
            unit.includes.push(path);
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::DeclKind;
    use anyhow::Result;

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            JsonFrontend::dump_path(Path::new("inc/a.hpp")),
            PathBuf::from("inc/a.hpp.decl.json")
        );
        assert_eq!(
            JsonFrontend::dump_path(Path::new("inc/a.json")),
            PathBuf::from("inc/a.json")
        );
    }

    #[test]
    fn parses_sidecar_and_records_it_as_dependency() -> Result<()> {
        let dir = tempfile::Builder::new().prefix("entangle-json").tempdir()?;
        let header = dir.path().join("a.hpp");
        fs::write(&header, "// header\n")?;
        fs::write(
            dir.path().join("a.hpp.decl.json"),
            r#"{
                "root": {"kind": "translation_unit", "children": [{"kind": "namespace", "name": "ns0"}]},
                "diagnostics": [{"severity": "warning", "message": "unused"}]
            }"#,
        )?;

        let unit = JsonFrontend.parse(&header, &[])?;
        assert_eq!(unit.root.children[0].kind, DeclKind::Namespace);
        assert!(!unit.has_errors());
        assert_eq!(unit.includes, vec![dir.path().join("a.hpp.decl.json")]);
        Ok(())
    }

    #[test]
    fn missing_dump_is_an_io_error() {
        let result = JsonFrontend.parse(Path::new("/nonexistent/entangle/a.hpp"), &[]);
        assert!(matches!(result, Err(FrontendError::Io { .. })));
    }
}
