//! Write side: materialize a project's documentation on disk.
//!
//! [`Publish`] is the one operation the publish endpoint exposes.
//! [`DiskPublisher`] implements it against a [`WorkDir`]; the network
//! transport in [`server`] decodes requests and dispatches to whichever
//! implementation it was built with.
//!
//! A call is best-effort across files: documents are written in the order
//! supplied and the first failure aborts the rest, leaving earlier files in
//! place. Each single file is replaced atomically, so readers see either the
//! old or the new content, never a mix.

pub mod client;
pub mod protocol;
pub mod server;

use crate::error::PublishError;
use crate::workdir::{WorkDir, normalize_relative};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub use client::{PublishClient, collect_docs};
pub use server::PublishServer;

/// Default TCP port of the publish endpoint.
pub const DEFAULT_PUBLISH_PORT: u16 = 12341;

/// One file of a publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDoc {
    /// Path relative to the project directory, `/`-separated.
    pub path: String,
    pub content: Vec<u8>,
}

impl ProjectDoc {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A project name plus the files to write for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub project: String,
    pub project_docs: Vec<ProjectDoc>,
}

/// The publish operation.
///
/// Implementations perform blocking I/O; async callers must run them on the
/// blocking pool.
pub trait Publish: Send + Sync {
    fn publish(&self, request: PublishRequest) -> Result<(), PublishError>;
}

/// Writes published documents under the work directory.
#[derive(Debug, Clone)]
pub struct DiskPublisher {
    work_dir: Arc<WorkDir>,
}

impl DiskPublisher {
    pub fn new(work_dir: Arc<WorkDir>) -> Self {
        Self { work_dir }
    }

    /// Destination paths for every document, checked before any write.
    fn plan(&self, request: &PublishRequest) -> Result<Vec<PathBuf>, PublishError> {
        validate_project(&request.project)?;
        let project_dir = self.work_dir.project_dir(&request.project);

        request
            .project_docs
            .iter()
            .map(|doc| {
                let destination = match normalize_relative(&doc.path) {
                    Some(relative) if relative.file_name().is_some() => project_dir.join(relative),
                    _ => return Err(PublishError::UnsafePath(doc.path.clone())),
                };
                check_existing_ancestor(&project_dir, &destination, &doc.path)?;
                Ok(destination)
            })
            .collect()
    }
}

impl Publish for DiskPublisher {
    fn publish(&self, request: PublishRequest) -> Result<(), PublishError> {
        let destinations = self.plan(&request)?;
        let project_dir = self.work_dir.project_dir(&request.project);

        for (doc, destination) in request.project_docs.iter().zip(&destinations) {
            write_replacing(&project_dir, destination, doc)?;
            tracing::debug!(
                project = %request.project,
                path = %doc.path,
                bytes = doc.content.len(),
                "wrote document"
            );
        }

        tracing::info!(
            project = %request.project,
            files = destinations.len(),
            "published project"
        );
        Ok(())
    }
}

/// A project name must be exactly one normal path segment.
pub fn validate_project(project: &str) -> Result<(), PublishError> {
    let mut components = Path::new(project).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PublishError::InvalidProject(project.to_string())),
    }
}

/// Reject `destination` if its deepest existing ancestor at or below
/// `project_dir` resolves, through symlinks, to somewhere outside it.
///
/// `project_dir` sits directly under the canonical work root, so ancestors
/// above it need no check.
fn check_existing_ancestor(
    project_dir: &Path,
    destination: &Path,
    doc_path: &str,
) -> Result<(), PublishError> {
    let existing = destination
        .ancestors()
        .skip(1)
        .take_while(|dir| dir.starts_with(project_dir))
        .find(|dir| dir.symlink_metadata().is_ok());
    match existing {
        Some(dir) => check_contained(project_dir, dir, doc_path),
        None => Ok(()),
    }
}

fn check_contained(project_dir: &Path, dir: &Path, doc_path: &str) -> Result<(), PublishError> {
    let resolved = dir.canonicalize().map_err(|source| PublishError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if !resolved.starts_with(project_dir) {
        tracing::warn!(
            path = %doc_path,
            resolved = %resolved.display(),
            "publish path leaves the project"
        );
        return Err(PublishError::UnsafePath(doc_path.to_string()));
    }
    Ok(())
}

/// Replace the document's destination with its content, creating missing
/// parent directories inside `project_dir`.
fn write_replacing(
    project_dir: &Path,
    destination: &Path,
    doc: &ProjectDoc,
) -> Result<(), PublishError> {
    let io_err = |source| PublishError::Io {
        path: destination.to_path_buf(),
        source,
    };

    let parent = destination
        .parent()
        .ok_or_else(|| io_err(std::io::Error::other("destination has no parent directory")))?;
    // Checked again here: earlier documents of the same call may have
    // changed the tree since planning.
    check_existing_ancestor(project_dir, destination, &doc.path)?;
    if !parent.is_dir() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    check_contained(project_dir, parent, &doc.path)?;

    // Stage next to the target so the rename stays on one file system.
    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    staged.write_all(&doc.content).map_err(io_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Temp files start out owner-only; published docs are world-readable.
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(io_err)?;
    }
    staged.persist(destination).map_err(|e| io_err(e.error))?;
    Ok(())
}
