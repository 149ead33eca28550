//! The work directory: root of every published project.
//!
//! Each immediate subdirectory of the root is a project. [`WorkDir`] is built
//! once at startup from a canonicalized path and shared read-only by the HTTP
//! front end and the publish endpoint.
//!
//! # Containment
//!
//! [`resolve_within`] is the single gate between a client-supplied relative
//! path and the file system. A request is accepted only when
//!
//! 1. its lexical form never climbs above the root (`..` past the top,
//!    absolute paths and drive prefixes are rejected outright), and
//! 2. the canonical form of the joined path, with symlinks resolved, still
//!    has the canonical root as a component-wise ancestor.
//!
//! The ancestor test uses [`Path::starts_with`], which compares whole
//! components, so a root of `/work` never admits `/work-other`.

use crate::error::WorkDirError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// File name looked up inside each project directory for the listing icon.
pub const ICON_FILE_NAME: &str = "icon.png";

/// Per-project entry of the JSON project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Absolute path of the project's `icon.png`, or `None` when absent.
    pub icon: Option<PathBuf>,
}

/// Canonicalized root directory holding all projects.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Canonicalize `path` and check that it is a directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkDirError> {
        Ok(Self {
            root: canonical_dir(path.as_ref())?,
        })
    }

    /// Absolute, canonical root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `project` under the root. The name is not validated here.
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    /// Names of all projects, sorted.
    pub fn projects(&self) -> Result<Vec<String>, WorkDirError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| WorkDirError::io(&self.root, e))?;

        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WorkDirError::io(&self.root, e))?;
            // Follows symlinks, so a linked project directory is listed too.
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => projects.push(name),
                Err(raw) => tracing::warn!(name = ?raw, "skipping project with non UTF-8 name"),
            }
        }

        projects.sort();
        Ok(projects)
    }

    /// Project names mapped to their icon metadata.
    pub fn project_listing(&self) -> Result<BTreeMap<String, ProjectInfo>, WorkDirError> {
        let listing = self
            .projects()?
            .into_iter()
            .map(|name| {
                let icon_path = self.root.join(&name).join(ICON_FILE_NAME);
                let icon = icon_path.exists().then_some(icon_path);
                (name, ProjectInfo { icon })
            })
            .collect();
        Ok(listing)
    }

    /// Resolve a client-supplied relative path to an existing file system
    /// entry inside the root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, WorkDirError> {
        resolve_within(&self.root, requested)
    }
}

/// Canonicalize `path` and require it to be a directory.
pub fn canonical_dir(path: &Path) -> Result<PathBuf, WorkDirError> {
    let root = path.canonicalize().map_err(|e| WorkDirError::io(path, e))?;
    if !root.is_dir() {
        return Err(WorkDirError::NotADirectory(root));
    }
    Ok(root)
}

/// Lexically normalize a relative path.
///
/// Returns `None` if the path is absolute, carries a drive prefix, or uses
/// `..` to climb above its starting point. `.` segments are dropped.
pub fn normalize_relative(requested: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(normalized)
}

/// Resolve `requested` against `root`, which must already be canonical.
///
/// Missing entries yield [`WorkDirError::NotFound`]; anything that lands
/// outside `root`, lexically or through a symlink, yields
/// [`WorkDirError::Escape`].
pub fn resolve_within(root: &Path, requested: &str) -> Result<PathBuf, WorkDirError> {
    let relative =
        normalize_relative(requested).ok_or_else(|| WorkDirError::Escape(requested.to_string()))?;

    let candidate = root.join(relative);
    let resolved = match candidate.canonicalize() {
        Ok(path) => path,
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            return Err(WorkDirError::NotFound(requested.to_string()));
        }
        Err(e) => return Err(WorkDirError::io(candidate, e)),
    };

    if !resolved.starts_with(root) {
        return Err(WorkDirError::Escape(requested.to_string()));
    }

    Ok(resolved)
}
