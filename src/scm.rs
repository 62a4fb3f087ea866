//! Source-control revision lookup.
//!
//! [`ScmRevisionProvider`] asks each registered [`ScmRevisionQuery`] in
//! turn whether it recognizes the build directory and uses the first one
//! that does. The lookup never fails: an unrecognized directory or a
//! failing query yields [`CodeRevision::unknown`].

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::models::CodeRevision;

/// Determines the revision of a working directory.
pub trait RevisionProvider: Send + Sync {
    fn determine_revision_of(&self, directory: &Path) -> CodeRevision;
}

/// One source-control system.
pub trait ScmRevisionQuery: Send + Sync {
    /// Short name stored in `build.scm`, e.g. `"git"`.
    fn name(&self) -> &str;

    /// Whether `directory` is managed by this SCM.
    fn supports(&self, directory: &Path) -> bool;

    fn query_revision(&self, directory: &Path) -> Result<CodeRevision>;
}

pub struct ScmRevisionProvider {
    queries: Vec<Box<dyn ScmRevisionQuery>>,
}

impl ScmRevisionProvider {
    pub fn new(queries: Vec<Box<dyn ScmRevisionQuery>>) -> Self {
        Self { queries }
    }
}

impl Default for ScmRevisionProvider {
    fn default() -> Self {
        Self::new(vec![Box::new(GitRevisionQuery)])
    }
}

impl RevisionProvider for ScmRevisionProvider {
    fn determine_revision_of(&self, directory: &Path) -> CodeRevision {
        let Some(query) = self.queries.iter().find(|q| q.supports(directory)) else {
            debug!(directory = %directory.display(), "no scm recognized");
            return CodeRevision::unknown();
        };

        match query.query_revision(directory) {
            Ok(revision) => revision,
            Err(err) => {
                debug!(scm = query.name(), error = %err, "revision lookup failed");
                CodeRevision::unknown()
            }
        }
    }
}

/// Git working trees, resolved with `git rev-parse HEAD`.
pub struct GitRevisionQuery;

impl ScmRevisionQuery for GitRevisionQuery {
    fn name(&self) -> &str {
        "git"
    }

    fn supports(&self, directory: &Path) -> bool {
        directory
            .ancestors()
            .any(|ancestor| ancestor.join(".git").exists())
    }

    fn query_revision(&self, directory: &Path) -> Result<CodeRevision> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(directory)
            .output()
            .with_context(|| "Failed to execute 'git rev-parse'. Is git installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git rev-parse HEAD failed: {}", stderr.trim());
        }

        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if hash.is_empty() {
            bail!("git rev-parse HEAD returned nothing");
        }
        Ok(CodeRevision::new(self.name(), hash))
    }
}
