//! Web layer
//!
//! Server-rendered pages built on axum. Handlers take a
//! [`middleware::RequestContext`], call a service and either render a
//! template or redirect.

pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod forms;
pub mod middleware;
pub mod pages;
pub mod posts;
pub mod profile;
pub mod responses;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

pub use middleware::{AppState, AuthenticatedUser, RequestContext};
pub use responses::PageError;

/// Build the site router with every page, the media files and the
/// request middleware.
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .merge(posts::protected_router())
        .merge(comments::protected_router())
        .merge(profile::protected_router())
        .merge(auth::protected_router())
        .route_layer(axum_middleware::from_fn(middleware::require_login));

    let media = ServeDir::new(&state.upload_config.path);
    let body_limit = middleware::body_limit(&state.upload_config);

    Router::new()
        .merge(posts::public_router())
        .merge(categories::router())
        .merge(profile::public_router())
        .merge(auth::public_router())
        .nest("/pages", pages::router())
        .merge(protected_routes)
        .nest_service("/media", media)
        .fallback(pages::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_context,
        ))
        // Outside the request context so the CSRF check parses forms under
        // the same limit as the handlers.
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests;
