//! Static pages
//!
//! - GET /pages/about/
//! - GET /pages/rules/
//! - any unknown path: the 404 page

use axum::{extract::State, response::Response, routing::get, Router};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, RequestContext};
use crate::api::responses::{render, PageError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/about/", get(about))
        .route("/rules/", get(rules))
}

pub async fn about(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    render(&state, &ctx, "pages/about.html", TeraContext::new())
}

pub async fn rules(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    render(&state, &ctx, "pages/rules.html", TeraContext::new())
}

/// Router fallback
pub async fn not_found() -> PageError {
    PageError::NotFound
}
