//! Location model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A place a post can be attached to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    /// Unpublished locations are not shown on posts
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a location
#[derive(Debug, Clone)]
pub struct CreateLocationInput {
    pub name: String,
    pub is_published: bool,
}
