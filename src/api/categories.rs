//! Category page
//!
//! - GET /category/{slug}/ posts of a published category

use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use tera::Context as TeraContext;

use crate::api::common::PageQuery;
use crate::api::middleware::{AppState, RequestContext};
use crate::api::responses::{render, PageError};

pub fn router() -> Router<AppState> {
    Router::new().route("/category/{slug}/", get(category_posts))
}

pub async fn category_posts(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, PageError> {
    let (category, page) = state
        .post_service
        .category_page(&slug, ctx.user_id(), query.page.as_deref())
        .await?;

    let mut context = TeraContext::new();
    context.insert("category", &category);
    context.insert("page_obj", &page);
    render(&state, &ctx, "blog/category.html", context)
}
