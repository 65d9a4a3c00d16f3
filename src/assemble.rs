//! Stitches the generated sections into one Python module and writes it.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use tempfile::NamedTempFile;

use crate::emit::Sections;
use crate::emit::writer::py_str;
use crate::version::VERSION;

pub const EPILOGUE: &str = "# entangle: end of generated bindings\n";

/// What the header comment records about a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub library: String,
    pub headers: Vec<PathBuf>,
    pub timestamp: DateTime<Utc>,
    pub invocation: String,
}

/// Runtime support shared by every generated module.
const RUNTIME: &str = r#"

class _EntangleStructure(ctypes.Structure):
	_entangle_base_ = None

	def __getattr__(self, name: str) -> Any:
		if name.startswith('_entangle') or _entangle_builtins.type(self)._entangle_base_ is None:
			raise _entangle_builtins.AttributeError(name)
		return _entangle_builtins.getattr(self._entangle_base, name)


def _entangle_isinstance(arg: Any, cls: type) -> bool:
	kind = arg._type_ if _entangle_builtins.isinstance(arg, ctypes._Pointer) else _entangle_builtins.type(arg)
	while kind is not None:
		if kind is cls:
			return True
		kind = _entangle_builtins.getattr(kind, '_entangle_base_', None)
	return False


def _entangle_base_of(arg: Any) -> Any:
	return _entangle_builtins.getattr(_entangle_builtins.type(arg), '_entangle_base_', None)


def _entangle_upcast(arg: Any, cls: type) -> Any:
	if arg is None:
		return None
	if _entangle_builtins.isinstance(arg, ctypes._Pointer):
		arg = arg.contents
	while _entangle_builtins.type(arg) is not cls and _entangle_base_of(arg) is not None:
		arg = arg._entangle_base
	return arg


def _entangle_pointer_or_buffer(arg: Any, ctype: Any) -> Any:
	if arg is None or _entangle_builtins.isinstance(arg, (ctypes.Array, ctypes._Pointer, ctypes._SimpleCData)):
		return arg
	if _entangle_builtins.hasattr(arg, 'ctypes'):
		return arg.ctypes.data_as(ctypes.c_void_p if ctype is None else ctypes.POINTER(ctype))
	raise _entangle_builtins.TypeError(f'expected a ctypes object or an array exposing .ctypes, got {_entangle_builtins.type(arg).__name__}')


_entangle_sym: dict[str, Any] = {}


def _entangle_bind(name: str, argtypes: list[Any], restype: Any) -> None:
	try:
		function = _entangle_lib[name]
	except _entangle_builtins.AttributeError as error:
		raise _entangle_builtins.ImportError(f'entangle: symbol {name} is missing from {_entangle_lib._name}') from error
	function.argtypes = argtypes
	function.restype = restype
	_entangle_sym[name] = function
"#;

pub fn assemble(provenance: &Provenance, sections: &Sections) -> String {
    let mut module = String::new();
    module.push_str(&header(provenance));
    module.push_str("from __future__ import annotations\n\n");
    module.push_str("import builtins as _entangle_builtins\nimport ctypes\nimport enum\nimport os\nfrom typing import Any\n\n");
    module.push_str(&format!(
        "_entangle_library = os.path.join(os.path.dirname(os.path.abspath(__file__)), {})\n",
        py_str(&provenance.library)
    ));
    module.push_str("try:\n\t_entangle_lib = ctypes.CDLL(_entangle_library)\n");
    module.push_str("except _entangle_builtins.OSError as error:\n");
    module.push_str(
        "\traise _entangle_builtins.ImportError(f'entangle: cannot load {_entangle_library}: {error}') from error\n",
    );
    module.push_str(RUNTIME);
    for (title, body) in [
        ("api", &sections.api),
        ("layout", &sections.layout),
        ("symbols", &sections.symbols),
    ] {
        module.push_str(&format!("\n\n# entangle: {title}\n\n"));
        module.push_str(body.trim_end_matches('\n'));
        module.push('\n');
    }
    module.push('\n');
    module.push_str(EPILOGUE);
    module
}

fn header(provenance: &Provenance) -> String {
    let headers = provenance
        .headers
        .iter()
        .map(|header| header.display().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let mut text = String::new();
    text.push_str(&format!("# Generated by entangle {VERSION}. Do not edit.\n"));
    text.push_str(&format!("# library: {}\n", provenance.library));
    text.push_str(&format!("# headers: {headers}\n"));
    text.push_str(&format!(
        "# generated: {}\n",
        provenance.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    text.push_str(&format!("# invocation: {}\n", provenance.invocation.replace('\n', " ")));
    text
}

/// `SOURCE_DATE_EPOCH` if given, else the newest header modification time.
pub fn resolve_timestamp(source_date_epoch: Option<i64>, headers: &[PathBuf]) -> DateTime<Utc> {
    if let Some(timestamp) = source_date_epoch.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
        return timestamp;
    }
    headers
        .iter()
        .filter_map(|header| header.metadata().and_then(|meta| meta.modified()).ok())
        .max()
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |newest: SystemTime| newest.into())
}

/// Replaces `path` with `contents` without ever exposing a partial file.
pub fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance {
            library: "libdemo.so".to_string(),
            headers: vec![PathBuf::from("include/demo.hpp")],
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            invocation: "libdemo.so include/demo.hpp demo.py".to_string(),
        }
    }

    #[test]
    fn module_has_fixed_section_order() {
        let sections = Sections {
            api: "def f() -> int:\n\treturn _entangle_sym['f']()\n".to_string(),
            layout: String::new(),
            symbols: "_entangle_bind('f', [], ctypes.c_int32)\n".to_string(),
        };
        let module = assemble(&provenance(), &sections);
        assert!(module.starts_with("# Generated by entangle "));
        assert!(module.contains("# generated: 2023-11-14T22:13:20Z\n"));
        let position = |needle: &str| module.find(needle).unwrap_or(usize::MAX);
        assert!(position("from __future__ import annotations") < position("class _EntangleStructure"));
        assert!(position("# entangle: api") < position("# entangle: layout"));
        assert!(position("# entangle: layout") < position("# entangle: symbols"));
        assert!(module.ends_with(EPILOGUE));
        assert!(module.contains("'libdemo.so'"));
    }

    #[test]
    fn runtime_reaches_builtins_through_the_alias() {
        let sections = Sections {
            api: String::new(),
            layout: String::new(),
            symbols: String::new(),
        };
        let module = assemble(&provenance(), &sections);
        assert!(module.contains("import builtins as _entangle_builtins\n"));
        for name in ["len", "type", "isinstance", "getattr", "hasattr", "TypeError", "AttributeError", "ImportError"] {
            for (index, _) in module.match_indices(&format!("{name}(")) {
                let before = module[..index].chars().next_back();
                assert!(
                    before.is_some_and(|c| c == '.' || c == '_' || c.is_ascii_alphanumeric()),
                    "bare `{name}` at byte {index}"
                );
            }
        }
    }

    #[test]
    fn source_date_epoch_wins() {
        let timestamp = resolve_timestamp(Some(86_400), &[]);
        assert_eq!(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true), "1970-01-02T00:00:00Z");
        assert_eq!(resolve_timestamp(None, &[]), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn atomic_write_replaces_contents() -> std::io::Result<()> {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("out.py");
        write_atomically(&path, "first\n")?;
        write_atomically(&path, "second\n")?;
        assert_eq!(std::fs::read_to_string(&path)?, "second\n");
        Ok(())
    }
}
