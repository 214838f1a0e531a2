//! End-to-end tests of the router: middleware, handlers and templates
//! over an in-memory database.

use super::*;
use crate::config::UploadConfig;
use crate::db::repositories::{fixtures, PostRepository, SqlxPostRepository};
use crate::db::DynDatabasePool;
use crate::models::{PostFilter, User};
use crate::services::{LoginInput, RegisterInput};
use crate::theme::TemplateEngine;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tower::ServiceExt;

const CSRF: &str = "test-csrf-token";
const PASSWORD: &str = "quiet-river-42";

struct TestApp {
    app: Router,
    state: AppState,
    pool: DynDatabasePool,
    media: TempDir,
}

async fn setup() -> TestApp {
    let pool = fixtures::pool().await;
    let media = TempDir::new().unwrap();
    let templates = TemplateEngine::new(&media.path().join("no-overrides")).unwrap();
    let upload = UploadConfig {
        path: media.path().to_path_buf(),
        ..UploadConfig::default()
    };
    let state = AppState::new(pool.clone(), templates, upload, 14);
    TestApp {
        app: build_router(state.clone()),
        state,
        pool,
        media,
    }
}

impl TestApp {
    /// Register `username` and open a session for them.
    async fn login_as(&self, username: &str) -> (User, String) {
        let user = self
            .state
            .user_service
            .register(RegisterInput::new(username, PASSWORD, PASSWORD))
            .await
            .unwrap();
        let session = self
            .state
            .user_service
            .login(LoginInput::new(username, PASSWORD))
            .await
            .unwrap();
        (user, session.id)
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

fn cookies(session: Option<&str>) -> String {
    match session {
        Some(session) => format!("csrftoken={}; sessionid={}", CSRF, session),
        None => format!("csrftoken={}", CSRF),
    }
}

fn get(uri: &str, session: Option<&str>) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookies(session))
        .body(Body::empty())
        .unwrap()
}

fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Urlencoded POST carrying the CSRF token
fn post_form(uri: &str, session: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut all = vec![("csrfmiddlewaretoken", CSRF)];
    all.extend_from_slice(fields);
    raw_post(uri, session, &encode_form(&all))
}

fn raw_post(uri: &str, session: Option<&str>, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookies(session))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Multipart POST carrying the CSRF token and an optional PNG
fn post_multipart(
    uri: &str,
    session: Option<&str>,
    fields: &[(&str, &str)],
    image: Option<&[u8]>,
) -> Request<Body> {
    let mut body = Vec::new();
    let mut all = vec![("csrfmiddlewaretoken", CSRF)];
    all.extend_from_slice(fields);
    for (name, value) in all {
        body.extend_from_slice(
            format!(
                "--BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                name, value
            )
            .as_bytes(),
        );
    }
    if let Some(data) = image {
        body.extend_from_slice(
            b"--BOUNDARY\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n",
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--BOUNDARY--\r\n");

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookies(session))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

fn datetime_local(offset: Duration) -> String {
    (Utc::now() + offset).format("%Y-%m-%dT%H:%M").to_string()
}

// ============================================================================
// Listings and visibility
// ============================================================================

#[tokio::test]
async fn test_index_issues_csrf_cookie() {
    let app = setup().await;
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("csrftoken=")));
    let html = body_text(response).await;
    assert!(html.contains("Блогикум"));
}

#[tokio::test]
async fn test_existing_csrf_cookie_is_kept() {
    let app = setup().await;
    let response = app.send(get("/", None)).await;
    assert!(set_cookies(&response)
        .iter()
        .all(|c| !c.starts_with("csrftoken=")));
}

#[tokio::test]
async fn test_scheduled_post_is_only_visible_to_author() {
    let app = setup().await;
    let (author, session) = app.login_as("author").await;
    let post = fixtures::post(&app.pool, author.id, None, Utc::now() + Duration::days(1)).await;
    let url = format!("/posts/{}/", post.id);

    let response = app.send(get(&url, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Ошибка 404"));

    let index = body_text(app.send(get("/", None)).await).await;
    assert!(!index.contains(&url));

    let response = app.send(get(&url, Some(&session))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(&post.title));

    let own_index = body_text(app.send(get("/", Some(&session))).await).await;
    assert!(own_index.contains(&url));
}

#[tokio::test]
async fn test_non_numeric_post_id_is_not_found() {
    let app = setup().await;
    let response = app.send(get("/posts/abc/", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unpublished_category_page_is_not_found() {
    let app = setup().await;
    let author = fixtures::user(&app.pool, "author").await;
    let hidden = fixtures::category(&app.pool, "hidden", false).await;
    let open = fixtures::category(&app.pool, "open", true).await;
    let hidden_post =
        fixtures::post(&app.pool, author.id, Some(hidden.id), Utc::now() - Duration::hours(1)).await;
    let open_post =
        fixtures::post(&app.pool, author.id, Some(open.id), Utc::now() - Duration::hours(1)).await;

    let response = app.send(get("/category/hidden/", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(get("/category/open/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(&format!("/posts/{}/", open_post.id)));
    assert!(!html.contains(&format!("/posts/{}/", hidden_post.id)));

    let response = app.send(get("/category/missing/", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_page_past_the_end_shows_last_page() {
    let app = setup().await;
    let author = fixtures::user(&app.pool, "author").await;
    let mut posts = Vec::new();
    for i in 0..12 {
        posts.push(
            fixtures::post(&app.pool, author.id, None, Utc::now() - Duration::hours(i + 1)).await,
        );
    }
    let newest = &posts[0];
    let oldest = &posts[11];

    let last = body_text(app.send(get("/?page=99", None)).await).await;
    assert!(last.contains(&format!("/posts/{}/", oldest.id)));
    assert!(!last.contains(&format!("/posts/{}/", newest.id)));

    let first = body_text(app.send(get("/?page=abc", None)).await).await;
    assert!(first.contains(&format!("/posts/{}/", newest.id)));
    assert!(!first.contains(&format!("/posts/{}/", oldest.id)));
}

#[tokio::test]
async fn test_profile_page() {
    let app = setup().await;
    let (author, session) = app.login_as("author").await;
    let scheduled =
        fixtures::post(&app.pool, author.id, None, Utc::now() + Duration::days(2)).await;
    let url = format!("/posts/{}/", scheduled.id);

    let public = body_text(app.send(get("/profile/author/", None)).await).await;
    assert!(public.contains("author"));
    assert!(!public.contains(&url));

    let own = body_text(app.send(get("/profile/author/", Some(&session))).await).await;
    assert!(own.contains(&url));
    assert!(own.contains("/edit_profile/"));

    let response = app.send(get("/profile/nobody/", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Middleware
// ============================================================================

#[tokio::test]
async fn test_login_required_redirects_with_next() {
    let app = setup().await;
    let response = app.send(get("/posts/create/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/login/?next=%2Fposts%2Fcreate%2F");
}

#[tokio::test]
async fn test_post_with_wrong_csrf_token_is_forbidden() {
    let app = setup().await;
    let (author, session) = app.login_as("author").await;
    let post = fixtures::post(&app.pool, author.id, None, Utc::now() - Duration::hours(1)).await;
    let url = format!("/posts/{}/comment/", post.id);

    let request = raw_post(&url, Some(&session), "csrfmiddlewaretoken=wrong&text=hi");
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("CSRF token missing or incorrect"));

    let request = Request::builder()
        .method("POST")
        .uri(&url)
        .header(header::COOKIE, format!("sessionid={}", session))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("text=hi"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let comments = app.state.comment_service.list_for_post(post.id).await.unwrap();
    assert!(comments.is_empty());
}

#[tokio::test]
async fn test_unknown_path_renders_404_page() {
    let app = setup().await;
    let response = app.send(get("/no/such/page/", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let html = body_text(response).await;
    assert!(html.contains("Ошибка 404"));
    assert!(html.contains("/no/such/page/"));
}

#[tokio::test]
async fn test_static_pages() {
    let app = setup().await;
    for url in ["/pages/about/", "/pages/rules/"] {
        let response = app.send(get(url, None)).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", url);
    }
}

// ============================================================================
// Posts
// ============================================================================

#[tokio::test]
async fn test_create_post_with_image() {
    let app = setup().await;
    let (author, session) = app.login_as("alice").await;
    let category = fixtures::category(&app.pool, "travel", true).await;
    let category_id = category.id.to_string();
    let pub_date = datetime_local(-Duration::hours(1));

    let request = post_multipart(
        "/posts/create/",
        Some(&session),
        &[
            ("title", "Горы"),
            ("text", "Было красиво"),
            ("pub_date", pub_date.as_str()),
            ("category", category_id.as_str()),
            ("location", ""),
            ("is_published", "on"),
        ],
        Some(b"\x89PNG\r\n\x1a\nfake"),
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/alice/");

    let posts = SqlxPostRepository::new(app.pool.clone())
        .list(&PostFilter::all().by_author(author.id), 0, 10)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    let post = &posts[0].post;
    assert_eq!(post.title, "Горы");
    assert_eq!(post.category_id, Some(category.id));
    assert!(post.is_published);

    let image = post.image.as_deref().unwrap();
    assert!(image.starts_with("posts_images/"));
    assert!(app.media.path().join(image).exists());

    let response = app.send(get(&format!("/media/{}", image), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_post_with_large_image() {
    let app = setup().await;
    let (author, session) = app.login_as("alice").await;
    let pub_date = datetime_local(-Duration::hours(1));

    let mut image = b"\x89PNG\r\n\x1a\n".to_vec();
    image.resize(3 * 1024 * 1024, 0);

    let request = post_multipart(
        "/posts/create/",
        Some(&session),
        &[
            ("title", "Панорама"),
            ("text", "Большой снимок"),
            ("pub_date", pub_date.as_str()),
            ("is_published", "on"),
        ],
        Some(&image),
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let posts = SqlxPostRepository::new(app.pool.clone())
        .list(&PostFilter::all().by_author(author.id), 0, 10)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    let stored = posts[0].post.image.as_deref().unwrap();
    let size = std::fs::metadata(app.media.path().join(stored)).unwrap().len();
    assert_eq!(size, image.len() as u64);
}

#[tokio::test]
async fn test_text_file_is_not_accepted_as_image() {
    let app = setup().await;
    let (author, session) = app.login_as("alice").await;
    let pub_date = datetime_local(-Duration::hours(1));

    let request = post_multipart(
        "/posts/create/",
        Some(&session),
        &[
            ("title", "Заметка"),
            ("text", "Текст"),
            ("pub_date", pub_date.as_str()),
        ],
        Some(b"not an image at all"),
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Upload a valid image."));

    let count = SqlxPostRepository::new(app.pool.clone())
        .count(&PostFilter::all().by_author(author.id))
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(!app.media.path().join("posts_images").exists());
}

#[tokio::test]
async fn test_invalid_post_form_is_shown_again() {
    let app = setup().await;
    let (author, session) = app.login_as("alice").await;

    let request = post_multipart(
        "/posts/create/",
        Some(&session),
        &[("title", "   "), ("text", "Текст"), ("pub_date", "not a date")],
        None,
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Enter a valid date/time."));
    assert!(html.contains("Текст"));

    let count = SqlxPostRepository::new(app.pool.clone())
        .count(&PostFilter::all().by_author(author.id))
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_non_owner_cannot_edit_post() {
    let app = setup().await;
    let (author, _) = app.login_as("author").await;
    let (_, intruder_session) = app.login_as("intruder").await;
    let post = fixtures::post(&app.pool, author.id, None, Utc::now() - Duration::hours(1)).await;
    let detail = format!("/posts/{}/", post.id);
    let pub_date = datetime_local(Duration::zero());

    let response = app
        .send(get(&format!("/posts/{}/edit/", post.id), Some(&intruder_session)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let request = post_multipart(
        &format!("/posts/{}/edit/", post.id),
        Some(&intruder_session),
        &[("title", "Hacked"), ("text", "Hacked"), ("pub_date", pub_date.as_str())],
        None,
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let response = app
        .send(post_form(&format!("/posts/{}/delete/", post.id), Some(&intruder_session), &[]))
        .await;
    assert_eq!(location(&response), detail);

    let stored = SqlxPostRepository::new(app.pool.clone())
        .get_by_id(post.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, post.title);
    assert_eq!(stored.text, post.text);
}

#[tokio::test]
async fn test_owner_edits_and_deletes_post() {
    let app = setup().await;
    let (author, session) = app.login_as("author").await;
    let post = fixtures::post(&app.pool, author.id, None, Utc::now() - Duration::hours(1)).await;
    let pub_date = datetime_local(Duration::days(3));

    let form = body_text(
        app.send(get(&format!("/posts/{}/edit/", post.id), Some(&session)))
            .await,
    )
    .await;
    assert!(form.contains(&post.title));

    let request = post_multipart(
        &format!("/posts/{}/edit/", post.id),
        Some(&session),
        &[("title", "Новый заголовок"), ("text", "Новый текст"), ("pub_date", pub_date.as_str())],
        None,
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let repo = SqlxPostRepository::new(app.pool.clone());
    let updated = repo.get_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(updated.title, "Новый заголовок");
    assert!(!updated.is_published);
    assert!(updated.pub_date > Utc::now());

    let response = app
        .send(post_form(&format!("/posts/{}/delete/", post.id), Some(&session), &[]))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(repo.get_by_id(post.id).await.unwrap().is_none());
}

// ============================================================================
// Comments
// ============================================================================

#[tokio::test]
async fn test_comment_lifecycle() {
    let app = setup().await;
    let (author, author_session) = app.login_as("author").await;
    let (_, reader_session) = app.login_as("reader").await;
    let post = fixtures::post(&app.pool, author.id, None, Utc::now() - Duration::hours(1)).await;
    let detail = format!("/posts/{}/", post.id);

    let response = app
        .send(post_form(
            &format!("/posts/{}/comment/", post.id),
            Some(&reader_session),
            &[("text", "Отличный пост")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let html = body_text(app.send(get(&detail, None)).await).await;
    assert!(html.contains("Отличный пост"));

    let comments = app.state.comment_service.list_for_post(post.id).await.unwrap();
    assert_eq!(comments.len(), 1);
    let edit_url = format!("/posts/{}/edit_comment/{}/", post.id, comments[0].comment.id);

    // The post author does not own the comment.
    let response = app.send(get(&edit_url, Some(&author_session))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), detail);

    let response = app
        .send(post_form(&edit_url, Some(&reader_session), &[("text", "Исправлено")]))
        .await;
    assert_eq!(location(&response), detail);

    let response = app
        .send(post_form(&edit_url, Some(&reader_session), &[("text", "  ")]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("This field is required."));

    let delete_url = format!("/posts/{}/delete_comment/{}/", post.id, comments[0].comment.id);
    let response = app
        .send(post_form(&delete_url, Some(&reader_session), &[]))
        .await;
    assert_eq!(location(&response), detail);
    assert!(app
        .state
        .comment_service
        .list_for_post(post.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_comment_on_hidden_post_is_not_found() {
    let app = setup().await;
    let author = fixtures::user(&app.pool, "author").await;
    let (_, session) = app.login_as("reader").await;
    let post = fixtures::post(&app.pool, author.id, None, Utc::now() + Duration::days(1)).await;

    let response = app
        .send(post_form(
            &format!("/posts/{}/comment/", post.id),
            Some(&session),
            &[("text", "hi")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Authentication and profile
// ============================================================================

#[tokio::test]
async fn test_registration_then_login_honors_next() {
    let app = setup().await;

    let response = app
        .send(post_form(
            "/auth/registration/",
            None,
            &[("username", "newbie"), ("password1", PASSWORD), ("password2", PASSWORD)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app
        .send(post_form(
            "/auth/login/",
            None,
            &[("username", "newbie"), ("password", "wrong-password"), ("next", "/posts/create/")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Please enter a correct username and password"));

    let response = app
        .send(post_form(
            "/auth/login/",
            None,
            &[("username", "newbie"), ("password", PASSWORD), ("next", "/posts/create/")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/create/");
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("sessionid=") && c.contains("HttpOnly")));
}

#[tokio::test]
async fn test_registration_errors_are_shown() {
    let app = setup().await;
    let response = app
        .send(post_form(
            "/auth/registration/",
            None,
            &[("username", "newbie"), ("password1", PASSWORD), ("password2", "different-1")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("didn"));
    assert!(app
        .state
        .user_service
        .get_by_username("newbie")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_login_ignores_external_next() {
    let app = setup().await;
    app.login_as("walker").await;
    let response = app
        .send(post_form(
            "/auth/login/",
            None,
            &[("username", "walker"), ("password", PASSWORD), ("next", "https://evil.example/")],
        ))
        .await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_repeated_login_failures_are_limited() {
    let app = setup().await;
    app.login_as("target").await;

    for _ in 0..5 {
        app.send(post_form(
            "/auth/login/",
            None,
            &[("username", "target"), ("password", "nope-nope")],
        ))
        .await;
    }

    let response = app
        .send(post_form(
            "/auth/login/",
            None,
            &[("username", "target"), ("password", PASSWORD)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = setup().await;
    let (_, session) = app.login_as("leaver").await;

    let response = app.send(post_form("/auth/logout/", Some(&session), &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("sessionid=;") && c.contains("Max-Age=0")));
    assert!(body_text(response).await.contains("Вы вышли из системы"));

    let user = app.state.user_service.validate_session(&session).await.unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_password_change_rotates_session() {
    let app = setup().await;
    let (_, session) = app.login_as("changer").await;

    let response = app
        .send(post_form(
            "/auth/password_change/",
            Some(&session),
            &[
                ("old_password", PASSWORD),
                ("new_password1", "brand-new-secret-7"),
                ("new_password2", "brand-new-secret-7"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/password_change/done/");
    assert!(set_cookies(&response).iter().any(|c| c.starts_with("sessionid=")));

    let old = app.state.user_service.validate_session(&session).await.unwrap();
    assert!(old.is_none());
}

#[tokio::test]
async fn test_edit_profile_renames_user() {
    let app = setup().await;
    let (_, session) = app.login_as("oldname").await;

    let response = app
        .send(post_form(
            "/edit_profile/",
            Some(&session),
            &[
                ("username", "newname"),
                ("first_name", "Иван"),
                ("last_name", "Петров"),
                ("email", "ivan@example.com"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/newname/");

    let response = app
        .send(post_form(
            "/edit_profile/",
            Some(&session),
            &[("username", "newname"), ("email", "not-an-email")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
