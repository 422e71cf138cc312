use axum::middleware;
use axum::Router;

use crate::detect::{detect, Detector};

/// Build the application: every path answers with the welcome page, behind detection.
pub fn router(detector: Detector) -> Router {
    Router::new()
        .fallback(welcome)
        .layer(middleware::from_fn_with_state(detector, detect))
}

async fn welcome() -> &'static str {
    "Welcome to the server!"
}
