//! Post service
//!
//! Listing pages, post detail and the author-only create/edit/delete flow.
//! Every read goes through [`PostFilter::visible_to`], so a post a viewer
//! may not see behaves exactly like a post that does not exist.

use crate::db::repositories::{
    CategoryRepository, LocationRepository, PostRepository, UserRepository,
};
use crate::models::{
    Category, Location, Page, Post, PostFilter, PostInput, PostWithMeta, User, MAX_LENGTH,
    PAGE_SIZE,
};
use crate::services::validation::{check_max_length, FieldErrors};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Missing, or not visible to the viewer
    #[error("Post not found")]
    NotFound,

    /// Visible, but the viewer is not the author
    #[error("Only the author can change this post")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Post service
pub struct PostService {
    post_repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    location_repo: Arc<dyn LocationRepository>,
    user_repo: Arc<dyn UserRepository>,
    per_page: usize,
}

impl PostService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        location_repo: Arc<dyn LocationRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            post_repo,
            category_repo,
            location_repo,
            user_repo,
            per_page: PAGE_SIZE,
        }
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// Front page: every post the viewer may see
    pub async fn index_page(
        &self,
        viewer: Option<i64>,
        raw_page: Option<&str>,
    ) -> Result<Page<PostWithMeta>, PostServiceError> {
        self.page(PostFilter::visible_to(viewer, Utc::now()), raw_page)
            .await
    }

    /// Posts of a published category.
    ///
    /// `NotFound` when the category is missing or unpublished, even for
    /// authors with posts in it.
    pub async fn category_page(
        &self,
        slug: &str,
        viewer: Option<i64>,
        raw_page: Option<&str>,
    ) -> Result<(Category, Page<PostWithMeta>), PostServiceError> {
        let category = self
            .category_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category")?
            .filter(|c| c.is_published)
            .ok_or(PostServiceError::NotFound)?;

        let filter = PostFilter::visible_to(viewer, Utc::now()).in_category(category.id);
        let page = self.page(filter, raw_page).await?;
        Ok((category, page))
    }

    /// A user's posts as seen by `viewer`; the owner sees all of them.
    pub async fn profile_page(
        &self,
        username: &str,
        viewer: Option<i64>,
        raw_page: Option<&str>,
    ) -> Result<(User, Page<PostWithMeta>), PostServiceError> {
        let profile = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user")?
            .ok_or(PostServiceError::NotFound)?;

        let filter = PostFilter::visible_to(viewer, Utc::now()).by_author(profile.id);
        let page = self.page(filter, raw_page).await?;
        Ok((profile, page))
    }

    async fn page(
        &self,
        filter: PostFilter,
        raw_page: Option<&str>,
    ) -> Result<Page<PostWithMeta>, PostServiceError> {
        let total = self
            .post_repo
            .count(&filter)
            .await
            .context("Failed to count posts")?;
        let total = usize::try_from(total).unwrap_or(0);

        let (number, offset) = Page::<PostWithMeta>::locate(raw_page, total, self.per_page);
        let items = self
            .post_repo
            .list(&filter, offset as i64, self.per_page as i64)
            .await
            .context("Failed to list posts")?;

        Ok(Page::new(items, number, total, self.per_page))
    }

    // ========================================================================
    // Single posts
    // ========================================================================

    /// A post the viewer may see, with its display metadata
    pub async fn detail(
        &self,
        id: i64,
        viewer: Option<i64>,
    ) -> Result<PostWithMeta, PostServiceError> {
        self.post_repo
            .find(id, &PostFilter::visible_to(viewer, Utc::now()))
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound)
    }

    /// A post `user` may change: `NotFound` if they cannot see it,
    /// `Forbidden` if they see it but did not write it.
    pub async fn get_for_owner(
        &self,
        id: i64,
        user: &User,
    ) -> Result<PostWithMeta, PostServiceError> {
        let post = self.detail(id, Some(user.id)).await?;
        if !post.post.is_owned_by(user.id) {
            return Err(PostServiceError::Forbidden);
        }
        Ok(post)
    }

    pub async fn create(&self, author: &User, input: PostInput) -> Result<Post, PostServiceError> {
        let input = self.validate(input).await?;

        let created = self
            .post_repo
            .create(&Post::new(author.id, input))
            .await
            .context("Failed to create post")?;

        tracing::info!("User {} created post {}", author.username, created.id);
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        user: &User,
        input: PostInput,
    ) -> Result<Post, PostServiceError> {
        let mut post = self.get_for_owner(id, user).await?.post;
        let input = self.validate(input).await?;
        post.apply(input);

        let updated = self
            .post_repo
            .update(&post)
            .await
            .context("Failed to update post")?;

        tracing::debug!("User {} updated post {}", user.username, id);
        Ok(updated)
    }

    /// Delete a post with its comments; returns the removed post.
    pub async fn delete(&self, id: i64, user: &User) -> Result<Post, PostServiceError> {
        let post = self.get_for_owner(id, user).await?.post;

        self.post_repo
            .delete(id)
            .await
            .context("Failed to delete post")?;

        tracing::info!("User {} deleted post {}", user.username, id);
        Ok(post)
    }

    /// Categories and locations offered by the post form
    pub async fn form_choices(&self) -> Result<(Vec<Category>, Vec<Location>), PostServiceError> {
        let categories = self
            .category_repo
            .list()
            .await
            .context("Failed to list categories")?;
        let locations = self
            .location_repo
            .list()
            .await
            .context("Failed to list locations")?;
        Ok((categories, locations))
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn validate(&self, input: PostInput) -> Result<PostInput, PostServiceError> {
        let input = PostInput {
            title: input.title.trim().to_string(),
            ..input
        };

        let mut errors = FieldErrors::new();
        if input.title.is_empty() {
            errors.add("title", "This field is required.");
        }
        check_max_length(&mut errors, "title", &input.title, MAX_LENGTH);
        if input.text.trim().is_empty() {
            errors.add("text", "This field is required.");
        }

        if let Some(category_id) = input.category_id {
            let exists = self
                .category_repo
                .get_by_id(category_id)
                .await
                .context("Failed to get category")?
                .is_some();
            if !exists {
                errors.add(
                    "category",
                    "Select a valid choice. That choice is not one of the available choices.",
                );
            }
        }
        if let Some(location_id) = input.location_id {
            let exists = self
                .location_repo
                .get_by_id(location_id)
                .await
                .context("Failed to get location")?
                .is_some();
            if !exists {
                errors.add(
                    "location",
                    "Select a valid choice. That choice is not one of the available choices.",
                );
            }
        }

        errors.into_result().map_err(PostServiceError::ValidationError)?;
        Ok(input)
    }
}
