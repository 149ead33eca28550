//! Static assets handler

use super::serve_file;
use crate::error::ServerResult;
use crate::state::ServerState;
use crate::ui::Asset;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Serve the front end's UI assets (GET /static/{*path})
pub async fn serve_static(
    State(state): State<Arc<ServerState>>,
    Path(path): Path<String>,
    request: Request,
) -> ServerResult<Response> {
    let assets = state.assets.clone();
    let asset = tokio::task::spawn_blocking(move || assets.lookup(&path)).await??;

    match asset {
        Asset::Embedded { path, contents } => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref())],
                contents,
            )
                .into_response())
        }
        Asset::File(path) => Ok(serve_file(path, request).await),
    }
}
