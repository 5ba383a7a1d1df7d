use crate::presenter::render_index;
use axum::response::Html;

/// GET /
pub async fn index() -> Html<String> {
    Html(render_index())
}
