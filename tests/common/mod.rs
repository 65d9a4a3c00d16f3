#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use entangle::config::{Config, Environment};
use entangle_decl::{
    DeclNode, EnumValue, Fundamental, Param, ParsedUnit, ParserDiagnostic, QualType, RecordTag,
};

pub const MARK: &str = "entanglement";
/// 2023-11-14T22:13:20Z
pub const EPOCH: &str = "1700000000";

/// A scratch directory holding headers and their declaration dumps.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("entangle-test").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `name` and the `<name>.decl.json` dump the JSON front end reads.
    pub fn header(&self, name: &str, declarations: Vec<DeclNode>) -> Result<PathBuf> {
        self.header_with_diagnostics(name, declarations, Vec::new())
    }

    pub fn header_with_diagnostics(
        &self,
        name: &str,
        declarations: Vec<DeclNode>,
        diagnostics: Vec<ParserDiagnostic>,
    ) -> Result<PathBuf> {
        let header = self.dir.path().join(name);
        fs::write(&header, "#pragma once\n")?;
        let root = DeclNode::translation_unit(&header).with_children(declarations);
        let mut unit = ParsedUnit::new(root);
        unit.diagnostics = diagnostics;
        let dump = serde_json::to_string_pretty(&unit)?;
        let mut sidecar = header.as_os_str().to_owned();
        sidecar.push(".decl.json");
        fs::write(PathBuf::from(sidecar), dump)?;
        Ok(header)
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn arguments(&self, headers: &[PathBuf], output: &Path) -> Vec<String> {
        let mut arguments = vec!["-std=c++17".to_string(), "libdemo.so".to_string()];
        arguments.extend(headers.iter().map(|header| header.display().to_string()));
        arguments.push(output.display().to_string());
        arguments
    }

    pub fn config(&self, headers: &[PathBuf], output: &Path) -> Result<Config> {
        Ok(Config::from_args(&self.arguments(headers, output), &json_env())?)
    }
}

pub fn json_env() -> Environment {
    Environment {
        frontend: Some("json".to_string()),
        source_date_epoch: Some(EPOCH.to_string()),
    }
}

pub fn int() -> QualType {
    QualType::fundamental(Fundamental::Int)
}

pub fn double() -> QualType {
    QualType::fundamental(Fundamental::Double)
}

/// `enum class Level : short { LOW = -32768, OFF = -1, HIGH = 32767 }`
pub fn level_enum() -> DeclNode {
    DeclNode::enumeration(Some("Level"), Fundamental::Short, true)
        .with_usr("c:@E@Level")
        .annotated(MARK)
        .at("common.hpp", 3, 12)
        .with_children([
            DeclNode::enum_constant("LOW", EnumValue::Signed(-32768)),
            DeclNode::enum_constant("OFF", EnumValue::Signed(-1)),
            DeclNode::enum_constant("HIGH", EnumValue::Signed(32767)),
        ])
}

pub fn set_level() -> DeclNode {
    DeclNode::function(
        "set_level",
        vec![Param::new(
            "level",
            QualType::enumeration("c:@E@Level", "Level"),
        )],
        QualType::void(),
    )
    .with_usr("c:@F@set_level#$@E@Level#")
    .with_mangled("_Z9set_level5Level")
    .annotated(MARK)
    .at("common.hpp", 5, 6)
}

/// `namespace geo { struct Point { double x, y; }; double norm(const Point&); }`
pub fn geo_namespace() -> DeclNode {
    let point = QualType::record("c:@N@geo@S@Point", "geo::Point");
    DeclNode::namespace("geo").with_children([
        DeclNode::record(RecordTag::Struct, "Point", 16, 8)
            .with_usr("c:@N@geo@S@Point")
            .annotated(MARK)
            .with_comment("/// A point in the plane.")
            .at("geo.hpp", 2, 8)
            .with_children([
                DeclNode::field("x", double()),
                DeclNode::field("y", double()),
            ]),
        DeclNode::function(
            "norm",
            vec![Param::new("point", point.reference_to())],
            double(),
        )
        .with_usr("c:@N@geo@F@norm#&1$@N@geo@S@Point#")
        .with_mangled("_ZN3geo4normERKNS_5PointE")
        .annotated(MARK)
        .at("geo.hpp", 6, 8),
    ])
}

pub fn char_type() -> QualType {
    QualType::fundamental(Fundamental::Char)
}
