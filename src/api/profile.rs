//! Profile pages
//!
//! - GET /profile/{username}/   public profile with the user's posts
//! - GET|POST /edit_profile/    edit own profile (login required)

use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Form, Router,
};
use tera::Context as TeraContext;

use crate::api::common::PageQuery;
use crate::api::forms::ProfileForm;
use crate::api::middleware::{AppState, AuthenticatedUser, RequestContext};
use crate::api::responses::{profile_url, redirect, render, PageError};
use crate::models::UpdateProfileInput;
use crate::services::{FieldErrors, UserServiceError};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/profile/{username}/", get(profile))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/edit_profile/", get(edit_profile_form).post(edit_profile))
}

pub async fn profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let (profile, page) = state
        .post_service
        .profile_page(&username, ctx.user_id(), query.page.as_deref())
        .await?;

    let mut context = TeraContext::new();
    context.insert("profile", &profile);
    context.insert("page_obj", &page);
    render(&state, &ctx, "blog/profile.html", context)
}

pub async fn edit_profile_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    let form = ProfileForm::from(UpdateProfileInput::from_user(&user));
    render_profile_form(&state, &ctx, &form, &FieldErrors::new())
}

pub async fn edit_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response, PageError> {
    match state
        .user_service
        .update_profile(&user, form.clone().into())
        .await
    {
        Ok(updated) => Ok(redirect(&profile_url(&updated.username))),
        Err(UserServiceError::ValidationError(errors)) => {
            render_profile_form(&state, &ctx, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

fn render_profile_form(
    state: &AppState,
    ctx: &RequestContext,
    form: &ProfileForm,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    render(state, ctx, "blog/user.html", context)
}
