pub mod badge;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

/// Wraps a rendered SVG badge. Badges change with every poll, so they are never cached.
pub fn svg_response(svg: String) -> Response {
    ([(header::CONTENT_TYPE, mime::IMAGE_SVG.as_ref()), (header::CACHE_CONTROL, "no-cache")], svg)
        .into_response()
}
