//! Per-request scratch directory holding the source and build artifacts

use crate::registry::{LanguageSpec, TemplateVars, Toolchain};
use crate::source::PreparedSource;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DIR_PREFIX: &str = "polyrun-";

/// Temporary artifacts owned by one execution.
///
/// Everything lives under a uniquely named directory, so concurrent
/// executions never collide and cleanup only touches what this request
/// created. The directory is removed by [`Workspace::cleanup`] or, on any
/// other exit path (early return, panic), when the value is dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    source: PathBuf,
    output: PathBuf,
    class_name: String,
    artifacts: Vec<PathBuf>,
}

impl Workspace {
    /// Create the directory under `root` (system temp dir when `None`) and
    /// write the prepared source into it.
    pub fn create(
        root: Option<&Path>,
        spec: &LanguageSpec,
        prepared: &PreparedSource,
    ) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let source = dir.path().join(&prepared.file_name);
        std::fs::write(&source, &prepared.content)?;

        let stem = prepared.stem();
        let output = match &spec.toolchain {
            Toolchain::Interpreted { .. } => source.clone(),
            Toolchain::Compiled { .. } => dir
                .path()
                .join(format!("{}{}", stem, std::env::consts::EXE_SUFFIX)),
            Toolchain::ClassBased { .. } => dir.path().join(format!("{}.class", stem)),
            Toolchain::ArchiveBased { .. } => dir.path().join(format!("{}.jar", stem)),
        };

        let mut artifacts = vec![source.clone()];
        if output != source {
            artifacts.push(output.clone());
        }

        Ok(Self {
            dir,
            class_name: prepared.class_name.clone().unwrap_or_default(),
            source,
            output,
            artifacts,
        })
    }

    /// The request's private directory, also the child's working directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Where the compile step is expected to leave its artifact
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Paths this workspace knows it created
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Whether `program` points at an artifact inside this workspace
    pub fn contains(&self, program: &str) -> bool {
        Path::new(program).starts_with(self.dir.path())
    }

    pub fn vars(&self) -> TemplateVars<'_> {
        TemplateVars {
            source: &self.source,
            output: &self.output,
            dir: self.dir.path(),
            class: &self.class_name,
        }
    }

    /// Remove the artifacts and the directory, logging anything left behind
    pub fn cleanup(self) {
        for artifact in &self.artifacts {
            if let Err(e) = std::fs::remove_file(artifact) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %artifact.display(), error = %e, "Failed to remove artifact");
                }
            }
        }
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove workspace");
        }
    }
}
