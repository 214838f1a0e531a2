//! Comment pages (all login required)
//!
//! - POST /posts/{id}/comment/
//! - GET|POST /posts/{id}/edit_comment/{cid}/
//! - GET|POST /posts/{id}/delete_comment/{cid}/

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use tera::Context as TeraContext;

use crate::api::common::parse_id;
use crate::api::forms::CommentForm;
use crate::api::middleware::{AppState, AuthenticatedUser, RequestContext};
use crate::api::posts::render_detail;
use crate::api::responses::{post_url, redirect, render, PageError};
use crate::models::{Comment, User};
use crate::services::{CommentServiceError, FieldErrors};

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/comment/", post(add_comment))
        .route(
            "/posts/{id}/edit_comment/{comment_id}/",
            get(edit_comment_form).post(edit_comment),
        )
        .route(
            "/posts/{id}/delete_comment/{comment_id}/",
            get(delete_comment_form).post(delete_comment),
        )
}

pub async fn add_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let id = parse_id(&id)?;
    match state.comment_service.add(id, &user, &form.text).await {
        Ok(_) => Ok(redirect(&post_url(id))),
        Err(CommentServiceError::ValidationError(errors)) => {
            let post = state.post_service.detail(id, Some(user.id)).await?;
            render_detail(&state, &ctx, &post, &form, &errors, StatusCode::OK).await
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn edit_comment_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<Response, PageError> {
    let (id, comment_id) = (parse_id(&id)?, parse_id(&comment_id)?);
    let comment = match owned_comment(&state, id, comment_id, &user).await {
        Ok(comment) => comment,
        Err(response) => return Ok(response),
    };

    let form = CommentForm {
        text: comment.text.clone(),
    };
    render_comment_page(&state, &ctx, &comment, &form, &FieldErrors::new(), false)
}

pub async fn edit_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, comment_id)): Path<(String, String)>,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let (id, comment_id) = (parse_id(&id)?, parse_id(&comment_id)?);
    match state
        .comment_service
        .update(id, comment_id, &user, &form.text)
        .await
    {
        Ok(_) => Ok(redirect(&post_url(id))),
        Err(CommentServiceError::ValidationError(errors)) => {
            let comment = match owned_comment(&state, id, comment_id, &user).await {
                Ok(comment) => comment,
                Err(response) => return Ok(response),
            };
            render_comment_page(&state, &ctx, &comment, &form, &errors, false)
        }
        Err(CommentServiceError::Forbidden) => Ok(redirect(&post_url(id))),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_comment_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<Response, PageError> {
    let (id, comment_id) = (parse_id(&id)?, parse_id(&comment_id)?);
    let comment = match owned_comment(&state, id, comment_id, &user).await {
        Ok(comment) => comment,
        Err(response) => return Ok(response),
    };

    let form = CommentForm {
        text: comment.text.clone(),
    };
    render_comment_page(&state, &ctx, &comment, &form, &FieldErrors::new(), true)
}

pub async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, comment_id)): Path<(String, String)>,
) -> Result<Response, PageError> {
    let (id, comment_id) = (parse_id(&id)?, parse_id(&comment_id)?);
    match state.comment_service.delete(id, comment_id, &user).await {
        Ok(()) => Ok(redirect(&post_url(id))),
        Err(CommentServiceError::Forbidden) => Ok(redirect(&post_url(id))),
        Err(e) => Err(e.into()),
    }
}

/// The comment if `user` wrote it; otherwise the response to send instead.
async fn owned_comment(
    state: &AppState,
    post_id: i64,
    comment_id: i64,
    user: &User,
) -> Result<Comment, Response> {
    match state
        .comment_service
        .get_for_owner(post_id, comment_id, user)
        .await
    {
        Ok(comment) => Ok(comment),
        Err(CommentServiceError::Forbidden) => Err(redirect(&post_url(post_id))),
        Err(e) => Err(PageError::from(e).into_response()),
    }
}

fn render_comment_page(
    state: &AppState,
    ctx: &RequestContext,
    comment: &Comment,
    form: &CommentForm,
    errors: &FieldErrors,
    is_delete: bool,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("comment", comment);
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("is_delete", &is_delete);
    render(state, ctx, "blog/comment.html", context)
}
