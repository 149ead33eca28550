use super::serve_file;
use crate::error::{ServerResult, WorkDirError};
use crate::state::ServerState;
use crate::workdir::{ProjectInfo, WorkDir};
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// File served when a request names a directory.
pub const DIRECTORY_INDEX: &str = "index.html";

/// Project names mapped to icon metadata (GET /api/get_projects)
///
/// # Response
///
/// ```json
/// {
///   "alpha": { "icon": "/srv/docs/alpha/icon.png" },
///   "beta": { "icon": null }
/// }
/// ```
pub async fn get_projects(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<BTreeMap<String, ProjectInfo>>> {
    let work_dir = state.work_dir.clone();
    let listing = tokio::task::spawn_blocking(move || work_dir.project_listing()).await??;
    Ok(Json(listing))
}

/// A published file (GET /projects/{*path})
///
/// `path` starts with the project name. Paths that resolve outside the work
/// directory are answered with 401. A directory is redirected to its
/// trailing-slash form, which then serves its `index.html`, so relative
/// links inside the page resolve against the directory.
pub async fn serve_project_file(
    State(state): State<Arc<ServerState>>,
    Path(path): Path<String>,
    request: Request,
) -> ServerResult<Response> {
    let work_dir = state.work_dir.clone();
    let document =
        tokio::task::spawn_blocking(move || resolve_document(&work_dir, &path)).await??;

    match document {
        Document::File(resolved) => Ok(serve_file(resolved, request).await),
        Document::Directory => {
            let location = directory_location(request.uri());
            Ok(Redirect::permanent(&location).into_response())
        }
    }
}

enum Document {
    File(PathBuf),
    /// A directory named without its trailing slash.
    Directory,
}

/// Resolve `requested`, falling back to the directory's index page.
fn resolve_document(work_dir: &WorkDir, requested: &str) -> Result<Document, WorkDirError> {
    let resolved = work_dir.resolve(requested)?;
    if !resolved.is_dir() {
        return Ok(Document::File(resolved));
    }
    if !requested.ends_with('/') {
        return Ok(Document::Directory);
    }
    let index = format!("{requested}{DIRECTORY_INDEX}");
    work_dir.resolve(&index).map(Document::File)
}

/// `uri` with a `/` appended to its path, query kept.
fn directory_location(uri: &Uri) -> String {
    match uri.query() {
        Some(query) => format!("{}/?{query}", uri.path()),
        None => format!("{}/", uri.path()),
    }
}
