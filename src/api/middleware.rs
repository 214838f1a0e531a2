//! Request middleware
//!
//! Every request passes through [`request_context`], which:
//! - resolves the `sessionid` cookie to the logged-in user
//! - makes sure the browser holds a `csrftoken` cookie
//! - rejects unsafe requests whose form does not echo that token
//! - renders error pages for handlers that returned a [`PageError`]
//!
//! The resulting [`RequestContext`] is stored in the request extensions
//! and handed to handlers through an extractor.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequest, FromRequestParts, Multipart, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::responses::{render_error_page, ErrorPage, PageError};
use crate::config::UploadConfig;
use crate::db::repositories::{
    SqlxCategoryRepository, SqlxCommentRepository, SqlxLocationRepository, SqlxPostRepository,
    SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    CommentService, LoginRateLimiter, MediaStore, PostService, UserService,
};
use crate::theme::TemplateEngine;

/// Cookie holding the session token
pub const SESSION_COOKIE: &str = "sessionid";

/// Cookie holding the CSRF token
pub const CSRF_COOKIE: &str = "csrftoken";

/// Form field that must echo the CSRF cookie
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";

/// Header accepted instead of the form field
const CSRF_HEADER: &str = "x-csrftoken";

/// CSRF cookie lifetime: one year
const CSRF_COOKIE_MAX_AGE: i64 = 365 * 24 * 60 * 60;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub comment_service: Arc<CommentService>,
    pub media: Arc<MediaStore>,
    pub templates: Arc<TemplateEngine>,
    pub upload_config: Arc<UploadConfig>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Wire the services over one pool.
    pub fn new(
        pool: DynDatabasePool,
        templates: TemplateEngine,
        upload_config: UploadConfig,
        session_expiration_days: i64,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let location_repo = SqlxLocationRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());

        Self {
            user_service: Arc::new(UserService::with_session_expiration(
                user_repo.clone(),
                session_repo,
                session_expiration_days,
            )),
            post_service: Arc::new(PostService::new(
                post_repo.clone(),
                category_repo,
                location_repo,
                user_repo,
            )),
            comment_service: Arc::new(CommentService::new(comment_repo, post_repo)),
            media: Arc::new(MediaStore::new(upload_config.clone())),
            templates: Arc::new(templates),
            upload_config: Arc::new(upload_config),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            pool,
        }
    }
}

/// Per-request state handed to handlers
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Logged-in user, `None` for anonymous viewers
    pub user: Option<User>,
    /// Session token from the cookie, if it resolved to a user
    pub session_id: Option<String>,
    pub csrf_token: String,
    /// Path and query of the request
    pub path: String,
}

impl RequestContext {
    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext {
                path: path_and_query(parts),
                ..RequestContext::default()
            }))
    }
}

/// The logged-in user on a login-required route
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.user.clone())
            .map(AuthenticatedUser)
            .ok_or_else(|| login_redirect(&path_and_query(parts)))
    }
}

/// Redirect to the login page, coming back to `next` afterwards
pub fn login_redirect(next: &str) -> Response {
    Redirect::to(&format!("/auth/login/?next={}", urlencoding::encode(next))).into_response()
}

fn path_and_query(parts: &Parts) -> String {
    uri_path_and_query(&parts.uri)
}

fn uri_path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Read one cookie from the request headers
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for the session cookie
pub fn session_cookie(token: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age
    )
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

fn new_csrf_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

fn is_unsafe(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Resolve the viewer, enforce CSRF and render error pages.
pub async fn request_context(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let mut ctx = RequestContext {
        path: path_and_query(&parts),
        ..RequestContext::default()
    };

    if let Some(token) = get_cookie(&parts.headers, SESSION_COOKIE) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                ctx.user = Some(user);
                ctx.session_id = Some(token);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }

    let cookie_token = get_cookie(&parts.headers, CSRF_COOKIE);
    let issue_cookie = cookie_token.is_none();
    ctx.csrf_token = cookie_token.clone().unwrap_or_else(new_csrf_token);

    // Buffer the body of unsafe requests so the token can be read from the
    // form before the handler parses it again.
    let body = if is_unsafe(&parts.method) {
        let limit = body_limit(&state.upload_config);
        let bytes = match to_bytes(body, limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Failed to read request body: {}", e);
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        };

        let failure = match &cookie_token {
            None => Some("CSRF cookie not set"),
            Some(expected) => {
                let submitted =
                    submitted_csrf_token(&parts.headers, &parts.extensions, bytes.clone()).await;
                let matches = submitted
                    .as_deref()
                    .is_some_and(|token| tokens_match(token, expected));
                (!matches).then_some("CSRF token missing or incorrect")
            }
        };
        if let Some(reason) = failure {
            tracing::warn!("Forbidden ({}): {}", reason, ctx.path);
            let page = PageError::CsrfFailure(reason.to_string()).page();
            return with_csrf_cookie(render_error_page(&state, &ctx, &page), &ctx, issue_cookie);
        }
        Body::from(bytes)
    } else {
        body
    };

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(ctx.clone());
    let response = next.run(request).await;

    let response = match response.extensions().get::<ErrorPage>().cloned() {
        Some(page) => {
            let (mut parts, _) = response.into_parts();
            let rendered = render_error_page(&state, &ctx, &page);
            // Keep cookies set by the handler.
            let cookies: Vec<HeaderValue> =
                parts.headers.get_all(header::SET_COOKIE).iter().cloned().collect();
            let (rendered_parts, body) = rendered.into_parts();
            parts.status = rendered_parts.status;
            parts.headers = rendered_parts.headers;
            for cookie in cookies {
                parts.headers.append(header::SET_COOKIE, cookie);
            }
            Response::from_parts(parts, body)
        }
        None => response,
    };

    with_csrf_cookie(response, &ctx, issue_cookie)
}

fn with_csrf_cookie(mut response: Response, ctx: &RequestContext, issue: bool) -> Response {
    if issue {
        let cookie = format!(
            "{}={}; Path=/; SameSite=Lax; Max-Age={}",
            CSRF_COOKIE, ctx.csrf_token, CSRF_COOKIE_MAX_AGE
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Largest request body accepted: one image plus the rest of the form
pub fn body_limit(config: &UploadConfig) -> usize {
    usize::try_from(config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024)
}

/// Compare two tokens in time independent of where they differ.
fn tokens_match(submitted: &str, expected: &str) -> bool {
    let (a, b) = (submitted.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Token sent with an unsafe request, from the header or the form body.
///
/// `extensions` are those of the original request, so the body limit it
/// was read under also applies to the form parser.
async fn submitted_csrf_token(
    headers: &HeaderMap,
    extensions: &Extensions,
    body: Bytes,
) -> Option<String> {
    if let Some(value) = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }

    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mut request = Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .ok()?;
    *request.extensions_mut() = extensions.clone();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .ok()?;
        fields.get(CSRF_FIELD).cloned()
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &()).await.ok()?;
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some(CSRF_FIELD) {
                return field.text().await.ok();
            }
        }
        None
    } else {
        None
    }
}

/// Redirect anonymous viewers of login-required routes to the login page.
pub async fn require_login(request: Request, next: Next) -> Response {
    let logged_in = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(|ctx| ctx.user.is_some());

    if logged_in {
        return next.run(request).await;
    }

    login_redirect(&uri_path_and_query(request.uri()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_get_cookie() {
        let headers = headers_with_cookie("csrftoken=abc; sessionid=xyz");
        assert_eq!(get_cookie(&headers, SESSION_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(get_cookie(&headers, CSRF_COOKIE).as_deref(), Some("abc"));
        assert_eq!(get_cookie(&headers, "other"), None);

        let empty = headers_with_cookie("sessionid=");
        assert_eq!(get_cookie(&empty, SESSION_COOKIE), None);
    }

    #[test]
    fn test_cookie_prefix_does_not_match() {
        let headers = headers_with_cookie("mysessionid=nope");
        assert_eq!(get_cookie(&headers, SESSION_COOKIE), None);
    }

    #[test]
    fn test_session_cookie_format() {
        let cookie = session_cookie("tok", 60);
        assert!(cookie.starts_with("sessionid=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=60"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_csrf_token_shape() {
        let token = new_csrf_token();
        assert_eq!(token.len(), 64);
        assert_ne!(token, new_csrf_token());
    }

    #[tokio::test]
    async fn test_submitted_token_from_urlencoded_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let body = Bytes::from_static(b"text=hi&csrfmiddlewaretoken=tok123");
        assert_eq!(
            submitted_csrf_token(&headers, &Extensions::new(), body).await.as_deref(),
            Some("tok123")
        );
    }

    #[tokio::test]
    async fn test_submitted_token_from_multipart_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=XYZ"),
        );
        let body = Bytes::from_static(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nHello\r\n\
--XYZ\r\nContent-Disposition: form-data; name=\"csrfmiddlewaretoken\"\r\n\r\ntok456\r\n--XYZ--\r\n",
        );
        assert_eq!(
            submitted_csrf_token(&headers, &Extensions::new(), body).await.as_deref(),
            Some("tok456")
        );
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc124", "abc123"));
        assert!(!tokens_match("abc12", "abc123"));
        assert!(!tokens_match("", "abc123"));
    }

    #[tokio::test]
    async fn test_submitted_token_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(
            submitted_csrf_token(&headers, &Extensions::new(), Bytes::new()).await.as_deref(),
            Some("from-header")
        );
    }
}
