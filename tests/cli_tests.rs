mod common;

use std::fs;
use std::process::Command;

use anyhow::Result;
use common::{EPOCH, Workspace, geo_namespace};
use entangle::cli::run_with;

fn entangle() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_entangle"));
    command
        .env("ENTANGLE_FRONTEND", "json")
        .env("SOURCE_DATE_EPOCH", EPOCH)
        .env("NO_COLOR", "1");
    command
}

#[test]
fn too_few_arguments_prints_usage() -> Result<()> {
    let output = entangle().args(["libdemo.so", "demo.py"]).output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("usage: entangle"), "{stderr}");
    assert!(!stderr.contains("Error:"), "{stderr}");
    Ok(())
}

#[test]
fn run_with_reports_usage_errors() {
    let arguments = vec!["-O2".to_string(), "lib.so".to_string()];
    match run_with(&arguments, &common::json_env()) {
        Err(error) => assert_eq!(error.to_string(), "usage error"),
        Ok(()) => panic!("expected a usage error"),
    }
}

#[test]
fn binary_writes_module_and_manifest() -> Result<()> {
    let workspace = Workspace::new()?;
    let header = workspace.header("geo.hpp", vec![geo_namespace()])?;
    let output = workspace.output("geo.py");
    let arguments = workspace.arguments(&[header], &output);

    let first = entangle().args(&arguments).output()?;
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert!(String::from_utf8_lossy(&first.stdout).contains("wrote"));

    let module = fs::read_to_string(&output)?;
    assert!(module.starts_with("# Generated by entangle "));
    assert!(module.ends_with("# entangle: end of generated bindings\n"));
    let manifest = fs::read_to_string(workspace.output("geo.py.d.txt"))?;
    assert_eq!(manifest.lines().next(), Some(arguments.join(" ").as_str()));

    let second = entangle().args(&arguments).output()?;
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("up to date"));
    assert_eq!(fs::read_to_string(&output)?, module);
    Ok(())
}

#[test]
fn bind_errors_exit_nonzero_without_writing() -> Result<()> {
    let workspace = Workspace::new()?;
    let function = entangle_decl::DeclNode::function(
        "printf_like",
        vec![entangle_decl::Param::new("format", common::char_type().pointer_to())],
        common::int(),
    )
    .with_callable(|callable| callable.is_variadic = true)
    .annotated(common::MARK)
    .at("variadic.hpp", 1, 5);
    let header = workspace.header("variadic.hpp", vec![function])?;
    let output = workspace.output("variadic.py");

    let result = entangle().args(workspace.arguments(&[header], &output)).output()?;
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("`printf_like` is variadic"), "{stderr}");
    assert!(!output.exists());
    Ok(())
}
