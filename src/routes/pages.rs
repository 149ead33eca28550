use crate::error::ServerResult;
use crate::state::ServerState;
use crate::ui::INDEX_TEMPLATE;
use axum::extract::State;
use axum::response::Html;
use minijinja::context;
use std::sync::Arc;

/// Index page listing every published project (GET /)
pub async fn index_page(State(state): State<Arc<ServerState>>) -> ServerResult<Html<String>> {
    let work_dir = state.work_dir.clone();
    let projects = tokio::task::spawn_blocking(move || work_dir.projects()).await??;

    let html = state.templates.get_template(INDEX_TEMPLATE)?.render(context! {
        projects => projects,
        version => env!("CARGO_PKG_VERSION"),
    })?;

    Ok(Html(html))
}
