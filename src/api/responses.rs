//! Page rendering and error responses
//!
//! Handlers return `Result<Response, PageError>`. A `PageError` carries no
//! body of its own: it marks the response with an [`ErrorPage`] and the
//! request middleware renders the matching template, with the viewer and
//! CSRF token available like on any other page.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, RequestContext};
use crate::services::{
    CommentServiceError, FieldErrors, PostServiceError, UserServiceError,
};

/// Errors a page handler can end with
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("Page not found")]
    NotFound,

    #[error("CSRF verification failed: {0}")]
    CsrfFailure(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PageError {
    /// The error page shown for this error
    pub fn page(&self) -> ErrorPage {
        match self {
            PageError::NotFound => ErrorPage::not_found(),
            PageError::CsrfFailure(reason) => ErrorPage::csrf_failure(reason),
            PageError::Internal(_) => ErrorPage::server_error(),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        if let PageError::Internal(e) = &self {
            tracing::error!("Request failed: {:#}", e);
        }
        let page = self.page();
        let mut response = page.status.into_response();
        response.extensions_mut().insert(page);
        response
    }
}

impl From<PostServiceError> for PageError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound | PostServiceError::Forbidden => PageError::NotFound,
            PostServiceError::ValidationError(errors) => {
                PageError::Internal(anyhow::anyhow!("Unhandled validation error: {}", errors))
            }
            PostServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<CommentServiceError> for PageError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::NotFound | CommentServiceError::Forbidden => PageError::NotFound,
            CommentServiceError::ValidationError(errors) => {
                PageError::Internal(anyhow::anyhow!("Unhandled validation error: {}", errors))
            }
            CommentServiceError::InternalError(e) => PageError::Internal(e),
        }
    }
}

impl From<UserServiceError> for PageError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound => PageError::NotFound,
            UserServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!("Unhandled user error: {}", other)),
        }
    }
}

/// Error page to render in place of a handler's body
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub template: &'static str,
    pub title: &'static str,
    /// Shown on the CSRF failure page
    pub reason: Option<String>,
}

impl ErrorPage {
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            template: "pages/404.html",
            title: "Ошибка 404",
            reason: None,
        }
    }

    pub fn server_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            template: "pages/500.html",
            title: "Ошибка 500",
            reason: None,
        }
    }

    pub fn csrf_failure(reason: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            template: "pages/403csrf.html",
            title: "Ошибка 403",
            reason: Some(reason.to_string()),
        }
    }
}

/// Variables every page template expects
pub fn base_context(ctx: &RequestContext) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("user", &ctx.user);
    context.insert("csrf_token", &ctx.csrf_token);
    context.insert("request_path", &ctx.path);
    context.insert("errors", &FieldErrors::new());
    context
}

/// Render `template` with the base variables plus `extra`.
pub fn render(
    state: &AppState,
    ctx: &RequestContext,
    template: &str,
    extra: TeraContext,
) -> Result<Response, PageError> {
    render_with_status(state, ctx, StatusCode::OK, template, extra)
}

pub fn render_with_status(
    state: &AppState,
    ctx: &RequestContext,
    status: StatusCode,
    template: &str,
    extra: TeraContext,
) -> Result<Response, PageError> {
    let mut context = base_context(ctx);
    context.extend(extra);
    let html = state.templates.render(template, &context)?;
    Ok((status, Html(html)).into_response())
}

/// Render an error page; never fails.
pub fn render_error_page(state: &AppState, ctx: &RequestContext, page: &ErrorPage) -> Response {
    let mut context = base_context(ctx);
    if let Some(reason) = &page.reason {
        context.insert("reason", reason);
    }
    let html = state
        .templates
        .render_with_fallback(page.template, &context, page.title);
    (page.status, Html(html)).into_response()
}

/// Redirect after a successful form submission
pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

pub fn post_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_error_marks_response() {
        let response = PageError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert_eq!(page.template, "pages/404.html");

        let response = PageError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ErrorPage>().is_some());

        let page = PageError::CsrfFailure("CSRF cookie not set".to_string()).page();
        assert_eq!(page.status, StatusCode::FORBIDDEN);
        assert_eq!(page.reason.as_deref(), Some("CSRF cookie not set"));
    }

    #[test]
    fn test_service_errors_map_to_pages() {
        assert!(matches!(
            PageError::from(PostServiceError::Forbidden),
            PageError::NotFound
        ));
        assert!(matches!(
            PageError::from(CommentServiceError::NotFound),
            PageError::NotFound
        ));
        assert!(matches!(
            PageError::from(UserServiceError::InternalError(anyhow::anyhow!("db"))),
            PageError::Internal(_)
        ));
    }

    #[test]
    fn test_urls() {
        assert_eq!(post_url(5), "/posts/5/");
        assert_eq!(profile_url("ivan"), "/profile/ivan/");
        assert_eq!(profile_url("a b"), "/profile/a%20b/");
    }
}
