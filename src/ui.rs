//! The front end's own UI: the index page template and its static assets.
//!
//! Both ship inside the binary. Assets can be swapped for a directory on
//! disk, which is then guarded exactly like project files.

use crate::error::WorkDirError;
use crate::workdir::{canonical_dir, normalize_relative, resolve_within};
use include_dir::{Dir, include_dir};
use minijinja::Environment;
use std::path::{Path, PathBuf};

static EMBEDDED_STATIC: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/src/assets/static");

pub const INDEX_TEMPLATE: &str = "index.html";

/// Template environment with every page registered.
pub fn templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(
        INDEX_TEMPLATE,
        include_str!("assets/templates/index.html"),
    )?;
    Ok(env)
}

/// Where `/static/<path>` is served from.
#[derive(Debug, Clone)]
pub enum StaticAssets {
    Embedded,
    /// Canonical directory on disk.
    Directory(PathBuf),
}

/// A located asset, ready to be sent.
#[derive(Debug)]
pub enum Asset {
    Embedded {
        path: PathBuf,
        contents: &'static [u8],
    },
    File(PathBuf),
}

impl StaticAssets {
    pub fn from_dir(static_dir: Option<&Path>) -> Result<Self, WorkDirError> {
        match static_dir {
            Some(dir) => Ok(StaticAssets::Directory(canonical_dir(dir)?)),
            None => Ok(StaticAssets::Embedded),
        }
    }

    /// Find `requested`, applying the same containment rules as project files.
    pub fn lookup(&self, requested: &str) -> Result<Asset, WorkDirError> {
        match self {
            StaticAssets::Embedded => {
                let path = normalize_relative(requested)
                    .ok_or_else(|| WorkDirError::Escape(requested.to_string()))?;
                let file = EMBEDDED_STATIC
                    .get_file(&path)
                    .ok_or_else(|| WorkDirError::NotFound(requested.to_string()))?;
                Ok(Asset::Embedded {
                    path,
                    contents: file.contents(),
                })
            }
            StaticAssets::Directory(root) => Ok(Asset::File(resolve_within(root, requested)?)),
        }
    }
}
