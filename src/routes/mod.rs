//! HTTP route handlers
//!
//! - `pages`: the HTML index page
//! - `projects`: project listing API and project file serving
//! - `assets`: the front end's own static assets
//!
//! Every handler is read-only.

pub mod assets;
pub mod pages;
pub mod projects;

use crate::error::ServerError;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Stream a resolved file back, with content type guessed from its name.
pub(crate) async fn serve_file(path: PathBuf, request: Request) -> Response {
    let Ok(response) = ServeFile::new(path).oneshot(request).await;
    response.into_response()
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
