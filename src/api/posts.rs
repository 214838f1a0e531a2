//! Post pages
//!
//! - GET /                     index of visible posts
//! - GET /posts/{id}/          detail with comments
//! - GET|POST /posts/create/   new post (login required)
//! - GET|POST /posts/{id}/edit/
//! - GET|POST /posts/{id}/delete/

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use tera::Context as TeraContext;

use crate::api::common::{parse_id, PageQuery};
use crate::api::forms::{CommentForm, PostForm, PostSubmission};
use crate::api::middleware::{AppState, AuthenticatedUser, RequestContext};
use crate::api::responses::{
    post_url, profile_url, redirect, render, render_with_status, PageError,
};
use crate::models::{PostInput, PostWithMeta, User};
use crate::services::{FieldErrors, PostServiceError};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/posts/{id}/", get(detail))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts/create/", get(create_form).post(create))
        .route("/posts/{id}/edit/", get(edit_form).post(edit))
        .route("/posts/{id}/delete/", get(delete_form).post(delete))
}

pub async fn index(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let page = state
        .post_service
        .index_page(ctx.user_id(), query.page.as_deref())
        .await?;

    let mut context = TeraContext::new();
    context.insert("page_obj", &page);
    render(&state, &ctx, "blog/index.html", context)
}

pub async fn detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Response, PageError> {
    let id = parse_id(&id)?;
    let post = state.post_service.detail(id, ctx.user_id()).await?;
    render_detail(
        &state,
        &ctx,
        &post,
        &CommentForm::default(),
        &FieldErrors::new(),
        StatusCode::OK,
    )
    .await
}

/// Detail page, also used to show a rejected comment form.
pub(crate) async fn render_detail(
    state: &AppState,
    ctx: &RequestContext,
    post: &PostWithMeta,
    form: &CommentForm,
    errors: &FieldErrors,
    status: StatusCode,
) -> Result<Response, PageError> {
    let comments = state.comment_service.list_for_post(post.post.id).await?;

    let mut context = TeraContext::new();
    context.insert("post", post);
    context.insert("comments", &comments);
    context.insert("form", form);
    context.insert("errors", errors);
    render_with_status(state, ctx, status, "blog/detail.html", context)
}

pub async fn create_form(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    render_post_form(
        &state,
        &ctx,
        &PostForm::blank(Utc::now()),
        &FieldErrors::new(),
        None,
    )
    .await
}

pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let submission = PostSubmission::read(multipart).await;

    let (input, stored) = match prepare(&state, &submission, None).await? {
        Prepared::Ready { input, stored } => (input, stored),
        Prepared::Invalid(errors) => {
            return render_post_form(&state, &ctx, &submission.form, &errors, None).await
        }
    };

    match state.post_service.create(&user, input).await {
        Ok(_) => Ok(redirect(&profile_url(&user.username))),
        Err(e) => {
            discard(&state, stored).await;
            match e {
                PostServiceError::ValidationError(errors) => {
                    render_post_form(&state, &ctx, &submission.form, &errors, None).await
                }
                other => Err(other.into()),
            }
        }
    }
}

pub async fn edit_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Response, PageError> {
    let id = parse_id(&id)?;
    let post = match owned_post(&state, id, &user).await {
        Ok(post) => post,
        Err(response) => return Ok(response),
    };

    render_post_form(
        &state,
        &ctx,
        &PostForm::from_post(&post.post),
        &FieldErrors::new(),
        Some(&post),
    )
    .await
}

pub async fn edit(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let id = parse_id(&id)?;
    let post = match owned_post(&state, id, &user).await {
        Ok(post) => post,
        Err(response) => return Ok(response),
    };

    let submission = PostSubmission::read(multipart).await;
    let mut form = submission.form.clone();
    form.current_image = post.post.image.clone();

    let (input, stored) = match prepare(&state, &submission, post.post.image.as_deref()).await? {
        Prepared::Ready { input, stored } => (input, stored),
        Prepared::Invalid(errors) => {
            return render_post_form(&state, &ctx, &form, &errors, Some(&post)).await
        }
    };

    match state.post_service.update(id, &user, input).await {
        Ok(updated) => {
            if let Some(old) = &post.post.image {
                if updated.image.as_ref() != Some(old) {
                    state.media.delete(old).await;
                }
            }
            Ok(redirect(&post_url(id)))
        }
        Err(e) => {
            discard(&state, stored).await;
            match e {
                PostServiceError::ValidationError(errors) => {
                    render_post_form(&state, &ctx, &form, &errors, Some(&post)).await
                }
                PostServiceError::Forbidden => Ok(redirect(&post_url(id))),
                other => Err(other.into()),
            }
        }
    }
}

pub async fn delete_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Response, PageError> {
    let id = parse_id(&id)?;
    let post = match owned_post(&state, id, &user).await {
        Ok(post) => post,
        Err(response) => return Ok(response),
    };

    let mut context = TeraContext::new();
    context.insert("post", &post);
    context.insert("is_delete", &true);
    context.insert("form", &PostForm::from_post(&post.post));
    render(&state, &ctx, "blog/create.html", context)
}

pub async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Response, PageError> {
    let id = parse_id(&id)?;
    match state.post_service.delete(id, &user).await {
        Ok(post) => {
            if let Some(image) = &post.image {
                state.media.delete(image).await;
            }
            Ok(redirect("/"))
        }
        Err(PostServiceError::Forbidden) => Ok(redirect(&post_url(id))),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// The post if `user` wrote it; otherwise the response to send instead.
async fn owned_post(state: &AppState, id: i64, user: &User) -> Result<PostWithMeta, Response> {
    match state.post_service.get_for_owner(id, user).await {
        Ok(post) => Ok(post),
        Err(PostServiceError::Forbidden) => Err(redirect(&post_url(id))),
        Err(e) => Err(PageError::from(e).into_response()),
    }
}

async fn render_post_form(
    state: &AppState,
    ctx: &RequestContext,
    form: &PostForm,
    errors: &FieldErrors,
    post: Option<&PostWithMeta>,
) -> Result<Response, PageError> {
    let (categories, locations) = state.post_service.form_choices().await?;

    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("categories", &categories);
    context.insert("locations", &locations);
    context.insert("is_edit", &post.is_some());
    if let Some(post) = post {
        context.insert("post", post);
    }
    render(state, ctx, "blog/create.html", context)
}

enum Prepared {
    /// Ready to save; `stored` is a newly written image to drop on failure
    Ready {
        input: PostInput,
        stored: Option<String>,
    },
    Invalid(FieldErrors),
}

/// Check the form and the upload, then store the upload.
///
/// The resulting image is the new upload, nothing if the clear box was
/// ticked, or `current` otherwise.
async fn prepare(
    state: &AppState,
    submission: &PostSubmission,
    current: Option<&str>,
) -> Result<Prepared, PageError> {
    let mut errors = submission.errors.clone();
    if let Some(upload) = &submission.image {
        if let Err(e) = state.media.check(upload) {
            errors.add("image", e.to_string());
        }
    }
    if !errors.is_empty() {
        return Ok(Prepared::Invalid(errors));
    }

    let mut input = match submission.input(None) {
        Ok(input) => input,
        Err(errors) => return Ok(Prepared::Invalid(errors)),
    };

    let stored = match &submission.image {
        Some(upload) => Some(
            state
                .media
                .save(upload)
                .await
                .map_err(|e| PageError::Internal(anyhow::Error::new(e)))?,
        ),
        None => None,
    };

    input.image = match &stored {
        Some(path) => Some(path.clone()),
        None if submission.clear_image => None,
        None => current.map(str::to_string),
    };

    Ok(Prepared::Ready { input, stored })
}

async fn discard(state: &AppState, stored: Option<String>) {
    if let Some(path) = stored {
        state.media.delete(&path).await;
    }
}
