//! Comment service
//!
//! Comments hang off a post and are only reachable through it: a comment
//! under a post the viewer cannot see is treated as missing, and so is a
//! comment addressed through the wrong post.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CommentWithAuthor, PostFilter, User};
use crate::services::validation::FieldErrors;

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment not found")]
    NotFound,

    /// Only the author may change a comment
    #[error("Only the author can change this comment")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Comment service
pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    /// Comments of a post, oldest first
    pub async fn list_for_post(
        &self,
        post_id: i64,
    ) -> Result<Vec<CommentWithAuthor>, CommentServiceError> {
        let comments = self
            .repo
            .list_for_post(post_id)
            .await
            .context("Failed to list comments")?;
        Ok(comments)
    }

    /// Add a comment by `author` under a post they can see.
    pub async fn add(
        &self,
        post_id: i64,
        author: &User,
        text: &str,
    ) -> Result<Comment, CommentServiceError> {
        self.ensure_post_visible(post_id, author).await?;
        let text = validate_text(text)?;

        let created = self
            .repo
            .create(&Comment::new(post_id, author.id, text))
            .await
            .context("Failed to create comment")?;

        tracing::debug!("User {} commented on post {}", author.username, post_id);
        Ok(created)
    }

    /// A comment `user` may change, addressed through its post.
    pub async fn get_for_owner(
        &self,
        post_id: i64,
        comment_id: i64,
        user: &User,
    ) -> Result<Comment, CommentServiceError> {
        self.ensure_post_visible(post_id, user).await?;

        let comment = self
            .repo
            .get_by_id(comment_id)
            .await
            .context("Failed to get comment")?
            .filter(|c| c.post_id == post_id)
            .ok_or(CommentServiceError::NotFound)?;

        if !comment.is_owned_by(user.id) {
            return Err(CommentServiceError::Forbidden);
        }
        Ok(comment)
    }

    /// Replace the text of a comment; its creation time stays.
    pub async fn update(
        &self,
        post_id: i64,
        comment_id: i64,
        user: &User,
        text: &str,
    ) -> Result<Comment, CommentServiceError> {
        let mut comment = self.get_for_owner(post_id, comment_id, user).await?;
        let text = validate_text(text)?;

        self.repo
            .update_text(comment.id, &text)
            .await
            .context("Failed to update comment")?;
        comment.text = text;
        Ok(comment)
    }

    pub async fn delete(
        &self,
        post_id: i64,
        comment_id: i64,
        user: &User,
    ) -> Result<(), CommentServiceError> {
        let comment = self.get_for_owner(post_id, comment_id, user).await?;

        self.repo
            .delete(comment.id)
            .await
            .context("Failed to delete comment")?;

        tracing::debug!("User {} deleted comment {}", user.username, comment.id);
        Ok(())
    }

    async fn ensure_post_visible(&self, post_id: i64, user: &User) -> Result<(), CommentServiceError> {
        self.post_repo
            .find(post_id, &PostFilter::visible_to(Some(user.id), Utc::now()))
            .await
            .context("Failed to get post")?
            .map(|_| ())
            .ok_or(CommentServiceError::NotFound)
    }
}

fn validate_text(text: &str) -> Result<String, CommentServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommentServiceError::ValidationError(FieldErrors::single(
            "text",
            "This field is required.",
        )));
    }
    Ok(text.to_string())
}
