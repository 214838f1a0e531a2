//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A topic posts can be filed under.
///
/// Unpublishing a category hides every post in it from everyone but the
/// posts' authors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Unique URL identifier
    pub slug: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Create a published category; the id is assigned on insert.
    pub fn new(title: String, description: String, slug: String) -> Self {
        Self {
            id: 0,
            title,
            description,
            slug,
            is_published: true,
            created_at: Utc::now(),
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone)]
pub struct CreateCategoryInput {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
}
