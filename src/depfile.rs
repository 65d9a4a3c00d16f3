//! The dependency manifest written next to the output (`<output>.d.txt`).
//!
//! Line one is the invocation; every following line is a file the output was
//! generated from. A rerun with the same invocation is skipped while nothing
//! listed is newer than the manifest itself.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyManifest {
    pub invocation: String,
    pub dependencies: Vec<PathBuf>,
}

impl DependencyManifest {
    pub fn new(invocation: impl Into<String>, dependencies: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut dependencies: Vec<PathBuf> = dependencies.into_iter().collect();
        dependencies.sort();
        dependencies.dedup();
        Self {
            invocation: invocation.into(),
            dependencies,
        }
    }

    pub fn path_for(output: &Path) -> PathBuf {
        let mut name = OsString::from(output.as_os_str());
        name.push(".d.txt");
        PathBuf::from(name)
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let invocation = lines.next()?.to_string();
        let dependencies = lines
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect();
        Some(Self {
            invocation,
            dependencies,
        })
    }

    pub fn render(&self) -> String {
        let mut text = self.invocation.replace('\n', " ");
        text.push('\n');
        for dependency in &self.dependencies {
            text.push_str(&dependency.display().to_string());
            text.push('\n');
        }
        text
    }

    /// `Ok(None)` when no manifest has been written yet.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Whether `output` can be reused for `invocation`.
    pub fn is_current(&self, invocation: &str, output: &Path, manifest: &Path) -> bool {
        if self.invocation != invocation {
            debug!("invocation changed");
            return false;
        }
        let Some(written) = modified(manifest) else {
            return false;
        };
        std::iter::once(output)
            .chain(self.dependencies.iter().map(PathBuf::as_path))
            .all(|path| match modified(path) {
                Some(time) if time <= written => true,
                Some(_) => {
                    debug!(path = %path.display(), "dependency is newer than the manifest");
                    false
                }
                None => {
                    debug!(path = %path.display(), "dependency is missing");
                    false
                }
            })
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
