//! Authentication pages
//!
//! Handles HTTP requests for user authentication:
//! - GET|POST /auth/registration/ - Sign up
//! - GET|POST /auth/login/ - Sign in, honoring `next`
//! - POST /auth/logout/ - Sign out
//! - GET|POST /auth/password_change/ - Change password (login required)
//! - GET /auth/password_change/done/ - Confirmation (login required)

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use tera::Context as TeraContext;

use crate::api::common::{safe_next, NextQuery};
use crate::api::forms::{LoginForm, PasswordChangeForm, RegistrationForm};
use crate::api::middleware::{
    clear_session_cookie, session_cookie, AppState, AuthenticatedUser, RequestContext,
};
use crate::api::responses::{redirect, render, render_with_status, PageError};
use crate::services::{FieldErrors, UserServiceError};

const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const TOO_MANY_ATTEMPTS: &str = "Too many failed login attempts. Try again in 15 minutes.";

/// Build public auth routes (no login required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/registration/", get(registration_form).post(register))
        .route("/auth/login/", get(login_form).post(login))
        .route("/auth/logout/", post(logout))
}

/// Build protected auth routes (login required)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/password_change/",
            get(password_change_form).post(password_change),
        )
        .route("/auth/password_change/done/", get(password_change_done))
}

pub async fn registration_form(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    render_registration(&state, &ctx, &RegistrationForm::default(), &FieldErrors::new())
}

/// POST /auth/registration/ - creates the account without logging in
pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<RegistrationForm>,
) -> Result<Response, PageError> {
    match state.user_service.register(form.clone().into()).await {
        Ok(_) => Ok(redirect("/")),
        Err(UserServiceError::ValidationError(errors)) => {
            render_registration(&state, &ctx, &form, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

fn render_registration(
    state: &AppState,
    ctx: &RequestContext,
    form: &RegistrationForm,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    render(state, ctx, "registration/registration_form.html", context)
}

pub async fn login_form(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<NextQuery>,
) -> Result<Response, PageError> {
    let form = LoginForm {
        next: safe_next(query.next.as_deref()),
        ..LoginForm::default()
    };
    render_login(&state, &ctx, StatusCode::OK, &form, &FieldErrors::new())
}

/// POST /auth/login/
///
/// Failed attempts are counted per username; once the limit is reached
/// the form is refused without checking the password.
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let input = form.to_input();

    if state.rate_limiter.is_limited(&input.username).await {
        tracing::warn!("Login rate limit reached for {}", input.username);
        return render_login(
            &state,
            &ctx,
            StatusCode::TOO_MANY_REQUESTS,
            &form,
            &FieldErrors::single("__all__", TOO_MANY_ATTEMPTS),
        );
    }

    let session = match state.user_service.login(input.clone()).await {
        Ok(session) => session,
        Err(UserServiceError::AuthenticationError(reason)) => {
            tracing::debug!("Login failed for {}: {}", input.username, reason);
            state.rate_limiter.record_failure(&input.username).await;
            return render_login(
                &state,
                &ctx,
                StatusCode::OK,
                &form,
                &FieldErrors::single("__all__", INVALID_LOGIN),
            );
        }
        Err(e) => return Err(e.into()),
    };

    state.rate_limiter.clear(&input.username).await;

    let target = safe_next(form.next.as_deref()).unwrap_or_else(|| "/".to_string());
    let mut response = redirect(&target);
    set_cookie(&mut response, &session_cookie(&session.id, session.max_age()));
    Ok(response)
}

fn render_login(
    state: &AppState,
    ctx: &RequestContext,
    status: StatusCode,
    form: &LoginForm,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("errors", errors);
    context.insert("next", form.next.as_deref().unwrap_or(""));
    render_with_status(state, ctx, status, "registration/login.html", context)
}

/// POST /auth/logout/ - ends the session and shows the logged-out page
pub async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    if let Some(session_id) = &ctx.session_id {
        state.user_service.logout(session_id).await?;
    }

    let anonymous = RequestContext {
        user: None,
        session_id: None,
        ..ctx
    };
    let mut response = render(
        &state,
        &anonymous,
        "registration/logged_out.html",
        TeraContext::new(),
    )?;
    set_cookie(&mut response, &clear_session_cookie());
    Ok(response)
}

pub async fn password_change_form(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    render_password_change(&state, &ctx, &FieldErrors::new())
}

/// POST /auth/password_change/
///
/// Other sessions of the user end; this browser gets a fresh one.
pub async fn password_change(
    State(state): State<AppState>,
    ctx: RequestContext,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<PasswordChangeForm>,
) -> Result<Response, PageError> {
    match state.user_service.change_password(&user, form.into()).await {
        Ok(session) => {
            let mut response = redirect("/auth/password_change/done/");
            set_cookie(&mut response, &session_cookie(&session.id, session.max_age()));
            Ok(response)
        }
        Err(UserServiceError::ValidationError(errors)) => {
            render_password_change(&state, &ctx, &errors)
        }
        Err(e) => Err(e.into()),
    }
}

fn render_password_change(
    state: &AppState,
    ctx: &RequestContext,
    errors: &FieldErrors,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", &PasswordChangeForm::default());
    context.insert("errors", errors);
    render(state, ctx, "registration/password_change_form.html", context)
}

pub async fn password_change_done(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    render(
        &state,
        &ctx,
        "registration/password_change_done.html",
        TeraContext::new(),
    )
}

fn set_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}
