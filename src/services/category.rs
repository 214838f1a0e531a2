//! Category service
//!
//! Categories are managed from the admin CLI; the site only reads them.
//! A category page exists only while the category is published.

use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput};
use crate::services::validation::{check_required, FieldErrors};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Latin letters, digits, hyphen and underscore
static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid"));

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// Create a category after checking its fields and slug uniqueness.
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let input = CreateCategoryInput {
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            slug: input.slug.trim().to_string(),
            is_published: input.is_published,
        };

        let mut errors = FieldErrors::new();
        check_required(&mut errors, "title", &input.title);
        if input.description.is_empty() {
            errors.add("description", "This field is required.");
        }
        check_required(&mut errors, "slug", &input.slug);
        if !errors.has("slug") && !SLUG_RE.is_match(&input.slug) {
            errors.add(
                "slug",
                "Identifier may contain only latin letters, digits, hyphens and underscores.",
            );
        }
        if !errors.has("slug")
            && self
                .repo
                .get_by_slug(&input.slug)
                .await
                .context("Failed to check slug uniqueness")?
                .is_some()
        {
            errors.add("slug", "Category with this slug already exists.");
        }
        errors.into_result().map_err(CategoryServiceError::ValidationError)?;

        let mut category = Category::new(input.title, input.description, input.slug);
        category.is_published = input.is_published;
        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        tracing::info!("Created category {} (id {})", created.slug, created.id);
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?;
        Ok(category)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?;
        Ok(category)
    }

    /// The category behind a category page: must exist and be published.
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.get_by_slug(slug)
            .await?
            .filter(|c| c.is_published)
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    /// All categories ordered by title
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        let categories = self.repo.list().await.context("Failed to list categories")?;
        Ok(categories)
    }

    pub async fn set_published(
        &self,
        slug: &str,
        is_published: bool,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))?;

        self.repo
            .set_published(category.id, is_published)
            .await
            .context("Failed to update category")?;
        category.is_published = is_published;

        tracing::info!(
            "Category {} is now {}",
            slug,
            if is_published { "published" } else { "hidden" }
        );
        Ok(category)
    }

    /// Delete a category; its posts lose their category.
    pub async fn delete(&self, slug: &str) -> Result<(), CategoryServiceError> {
        let category = self
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))?;

        self.repo
            .delete(category.id)
            .await
            .context("Failed to delete category")?;

        tracing::info!("Deleted category {}", slug);
        Ok(())
    }
}

/// Generate a slug from a title.
///
/// Keeps ASCII letters and digits, turns everything else into single
/// hyphens. Non-latin titles can produce an empty slug, which `create`
/// rejects.
pub fn generate_slug(title: &str) -> String {
    let mut result = String::new();
    let mut prev_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}
