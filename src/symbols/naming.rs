use sha1::{Digest, Sha1};

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Attributes `ctypes.Structure` itself defines or looks up.
const CTYPES_RESERVED: &[&str] = &[
    "_objects",
    "from_address",
    "from_buffer",
    "from_buffer_copy",
    "from_param",
    "in_dll",
];

/// Names the generated module imports at top level.
const MODULE_NAMES: &[&str] = &["Any", "annotations", "ctypes", "enum", "os"];

/// Checks that `name` can be emitted verbatim as a Python attribute.
/// The error is the reason it cannot.
pub fn check_identifier(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("not a valid Python identifier");
    }
    if PYTHON_KEYWORDS.contains(&name) {
        return Err("Python keyword");
    }
    if name.starts_with("_entangle") {
        return Err("reserved for generated code");
    }
    let bytes = name.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'_' && (bytes[1].is_ascii_uppercase() || bytes[1] == b'_') {
        return Err("leading underscore followed by an uppercase letter or underscore");
    }
    if bytes.len() > 2 && name.starts_with('_') && name.ends_with('_') {
        return Err("_sunder_ names are reserved by ctypes and enum");
    }
    if CTYPES_RESERVED.contains(&name) {
        return Err("reserved by ctypes");
    }
    if MODULE_NAMES.contains(&name) {
        return Err("shadows a name the generated module imports");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorName {
    NotOperator,
    Dunder(&'static str),
    Unsupported,
}

/// Python special method for a member `operator<token>` taking `arity`
/// explicit parameters.
pub fn operator_dunder(name: &str, arity: usize) -> OperatorName {
    let Some(rest) = name.strip_prefix("operator") else {
        return OperatorName::NotOperator;
    };
    if rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        return OperatorName::NotOperator;
    }
    let dunder = match (rest.trim(), arity) {
        ("+", 0) => "__pos__",
        ("-", 0) => "__neg__",
        ("~", 0) => "__invert__",
        ("bool", 0) => "__bool__",
        ("+", 1) => "__add__",
        ("-", 1) => "__sub__",
        ("*", 1) => "__mul__",
        ("/", 1) => "__truediv__",
        ("%", 1) => "__mod__",
        ("&", 1) => "__and__",
        ("|", 1) => "__or__",
        ("^", 1) => "__xor__",
        ("<<", 1) => "__lshift__",
        (">>", 1) => "__rshift__",
        ("==", 1) => "__eq__",
        ("!=", 1) => "__ne__",
        ("<", 1) => "__lt__",
        ("<=", 1) => "__le__",
        (">", 1) => "__gt__",
        (">=", 1) => "__ge__",
        ("[]", 1) => "__getitem__",
        ("+=", 1) => "__iadd__",
        ("-=", 1) => "__isub__",
        ("*=", 1) => "__imul__",
        ("/=", 1) => "__itruediv__",
        ("%=", 1) => "__imod__",
        ("&=", 1) => "__iand__",
        ("|=", 1) => "__ior__",
        ("^=", 1) => "__ixor__",
        ("<<=", 1) => "__ilshift__",
        (">>=", 1) => "__irshift__",
        ("()", _) => "__call__",
        _ => return OperatorName::Unsupported,
    };
    OperatorName::Dunder(dunder)
}

/// Stable name for an anonymous enum, derived from its unique identifier.
pub fn anonymous_name(identity: &str) -> String {
    let digest = Sha1::digest(identity.as_bytes());
    let hex = format!("{digest:x}");
    format!("anonymous_{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_identifiers_are_explained() {
        assert_eq!(check_identifier("class"), Err("Python keyword"));
        assert_eq!(
            check_identifier("_Reserved"),
            Err("leading underscore followed by an uppercase letter or underscore")
        );
        assert_eq!(
            check_identifier("__hidden"),
            Err("leading underscore followed by an uppercase letter or underscore")
        );
        assert_eq!(
            check_identifier("_fields_"),
            Err("_sunder_ names are reserved by ctypes and enum")
        );
        assert_eq!(check_identifier("from_param"), Err("reserved by ctypes"));
        assert_eq!(check_identifier("_entangle_lib"), Err("reserved for generated code"));
        assert_eq!(check_identifier("ctypes"), Err("shadows a name the generated module imports"));
        assert_eq!(check_identifier("ns::x"), Err("not a valid Python identifier"));
        assert_eq!(check_identifier("m_value"), Ok(()));
        assert_eq!(check_identifier("_lower"), Ok(()));
    }

    #[test]
    fn operators_normalize_by_arity() {
        assert_eq!(operator_dunder("operator-", 0), OperatorName::Dunder("__neg__"));
        assert_eq!(operator_dunder("operator-", 1), OperatorName::Dunder("__sub__"));
        assert_eq!(operator_dunder("operator()", 3), OperatorName::Dunder("__call__"));
        assert_eq!(operator_dunder("operator bool", 0), OperatorName::Dunder("__bool__"));
        assert_eq!(operator_dunder("operator=", 1), OperatorName::Unsupported);
        assert_eq!(operator_dunder("operator++", 0), OperatorName::Unsupported);
        assert_eq!(operator_dunder("operator*", 0), OperatorName::Unsupported);
        assert_eq!(operator_dunder("operators", 0), OperatorName::NotOperator);
        assert_eq!(operator_dunder("run", 0), OperatorName::NotOperator);
    }

    #[test]
    fn anonymous_names_are_stable_hashes() {
        let first = anonymous_name("c:@Ea@ANONYMOUS_ENUM_0");
        assert_eq!(first, anonymous_name("c:@Ea@ANONYMOUS_ENUM_0"));
        assert_ne!(first, anonymous_name("c:@Ea@OTHER"));
        assert!(first.starts_with("anonymous_"));
        assert_eq!(first.len(), "anonymous_".len() + 8);
        assert_eq!(check_identifier(&first), Ok(()));
    }
}
