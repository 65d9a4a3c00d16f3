//! Checks that need external tools; each test returns early when its tool is
//! not installed.

mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use common::{MARK, Workspace, geo_namespace, int, level_enum, set_level};
use entangle::error::{GenerateError, Violation};
use entangle::pipeline::run;
use entangle_decl::json::JsonFrontend;
use entangle_decl::{DeclNode, Fundamental, Param, QualType, RecordTag};

fn installed(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn cxx() -> Option<&'static str> {
    ["c++", "g++", "clang++"].into_iter().find(|program| installed(program))
}

fn checked(output: Output, what: &str) -> Result<String> {
    if !output.status.success() {
        bail!(
            "{what} failed:\n{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn python(script: &str, argument: &Path) -> Result<String> {
    let output = Command::new("python3").arg("-c").arg(script).arg(argument).output()?;
    checked(output, "python3")
}

fn compile_library(compiler: &str, source: &Path, library: &Path) -> Result<()> {
    let output = Command::new(compiler)
        .args(["-shared", "-fPIC", "-o"])
        .arg(library)
        .arg(source)
        .output()?;
    checked(output, compiler).map(|_| ())
}

fn function(name: &str, params: Vec<Param>, symbol: &str) -> DeclNode {
    DeclNode::function(name, params, int())
        .with_mangled(symbol)
        .annotated(MARK)
}

fn ints(names: &[&str]) -> Vec<Param> {
    names.iter().map(|name| Param::new(name, int())).collect()
}

/// `len(int)`, which shadows the builtin, and `f` overloaded on 0, 2 and 4 ints.
fn shadowing_overloads() -> Vec<DeclNode> {
    vec![
        function("len", ints(&["x"]), "_Z3leni"),
        function("f", Vec::new(), "_Z1fv"),
        function("f", ints(&["a", "b"]), "_Z1fii"),
        function("f", ints(&["a", "b", "c", "d"]), "_Z1fiiii"),
    ]
}

const SHADOWING_SOURCE: &str = "\
int len(int x) { return x + 1; }
int f() { return -1; }
int f(int a, int b) { return a + b; }
int f(int a, int b, int c, int d) { return a * b * c * d; }
";

const SHADOWING_SCRIPT: &str = "\
import sys
sys.path.insert(0, sys.argv[1])
import demo
assert demo.len(3) == 4
assert demo.f() == -1
assert demo.f(2, 3) == 5
assert demo.f(1, 2, 3, 4) == 24
try:
    demo.f(1)
except TypeError as error:
    assert 'no overload takes 1 arguments' in str(error), error
else:
    raise AssertionError('f accepted one argument')
print('ok')
";

#[test]
fn generated_module_is_valid_python() -> Result<()> {
    if !installed("python3") {
        eprintln!("python3 not found; skipping");
        return Ok(());
    }
    let workspace = Workspace::new()?;
    let mut declarations = vec![level_enum(), set_level(), geo_namespace()];
    declarations.extend(shadowing_overloads());
    let header = workspace.header("all.hpp", declarations)?;
    let output = workspace.output("demo.py");
    run(&workspace.config(&[header], &output)?, &JsonFrontend)?;

    python(
        "import sys; p = sys.argv[1]; compile(open(p).read(), p, 'exec')",
        &output,
    )?;
    Ok(())
}

#[test]
fn shadowed_builtins_keep_dispatch_working() -> Result<()> {
    let Some(compiler) = cxx().filter(|_| installed("python3")) else {
        eprintln!("python3 or a C++ compiler not found; skipping");
        return Ok(());
    };
    let workspace = Workspace::new()?;
    let source = workspace.output("demo.cpp");
    fs::write(&source, SHADOWING_SOURCE)?;
    compile_library(compiler, &source, &workspace.output("libdemo.so"))?;

    let header = workspace.header("demo.hpp", shadowing_overloads())?;
    run(&workspace.config(&[header], &workspace.output("demo.py"))?, &JsonFrontend)?;

    let printed = python(SHADOWING_SCRIPT, workspace.path())?;
    assert_eq!(printed.trim(), "ok");
    Ok(())
}

const TAIL_PADDING_SOURCE: &str = r#"
#include <cstdio>
struct Base { Base(); virtual ~Base(); int a; char b; };
Base::Base() {}
Base::~Base() {}
struct Derived : Base { Derived(); char c[3]; int x; };
Derived::Derived() {}
int main() {
    std::printf("%zu %zu %zu %zu\n", sizeof(Base), alignof(Base), sizeof(Derived), alignof(Derived));
}
"#;

#[test]
fn compiler_tail_padding_reuse_is_rejected() -> Result<()> {
    let Some(compiler) = cxx() else {
        eprintln!("no C++ compiler found; skipping");
        return Ok(());
    };
    let workspace = Workspace::new()?;
    let source = workspace.output("layout.cpp");
    let program = workspace.output("layout");
    fs::write(&source, TAIL_PADDING_SOURCE)?;
    checked(
        Command::new(compiler).arg("-o").arg(&program).arg(&source).output()?,
        compiler,
    )?;
    let printed = checked(Command::new(&program).output()?, "layout program")?;
    let sizes = printed
        .split_whitespace()
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .context("layout program printed something other than sizes")?;
    let [base_size, base_align, derived_size, derived_align] = sizes[..] else {
        bail!("expected four sizes, got {printed:?}");
    };

    let base = DeclNode::record(RecordTag::Struct, "Base", base_size, base_align)
        .with_usr("c:@S@Base")
        .annotated(MARK)
        .with_children([
            DeclNode::constructor("Base", Vec::new()),
            DeclNode::destructor("Base").with_callable(|callable| callable.is_virtual = true),
            DeclNode::field("a", int()),
            DeclNode::field("b", QualType::fundamental(Fundamental::Char)),
        ]);
    let derived = DeclNode::record(RecordTag::Struct, "Derived", derived_size, derived_align)
        .with_usr("c:@S@Derived")
        .annotated(MARK)
        .with_children([
            DeclNode::base(QualType::record("c:@S@Base", "Base")),
            DeclNode::constructor("Derived", Vec::new()),
            DeclNode::field("c", QualType::fundamental(Fundamental::Char).array_of(3)),
            DeclNode::field("x", int()),
        ]);
    let header = workspace.header("layout.hpp", vec![base, derived])?;
    let output = workspace.output("layout.py");

    match run(&workspace.config(&[header], &output)?, &JsonFrontend) {
        Err(GenerateError::Bind(error)) => assert_eq!(
            error.violation,
            Violation::TailPaddingReuse {
                name: "Derived".to_string(),
                base: "Base".to_string(),
            }
        ),
        other => panic!("expected tail padding reuse to be rejected, got {other:?}"),
    }
    assert!(!output.exists());
    Ok(())
}
