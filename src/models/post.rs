//! Post model
//!
//! A post may be scheduled by giving it a `pub_date` in the future; it stays
//! hidden from everyone except its author until then.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    /// Publication time; may lie in the future
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    /// Path of the image relative to the media root
    pub image: Option<String>,
    pub author_id: i64,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Build an unsaved post for `author_id` from validated input.
    pub fn new(author_id: i64, input: PostInput) -> Self {
        Self {
            id: 0,
            title: input.title,
            text: input.text,
            pub_date: input.pub_date,
            is_published: input.is_published,
            image: input.image,
            author_id,
            category_id: input.category_id,
            location_id: input.location_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.author_id == user_id
    }

    /// Apply edited fields, keeping identity, author and creation time.
    pub fn apply(&mut self, input: PostInput) {
        self.title = input.title;
        self.text = input.text;
        self.pub_date = input.pub_date;
        self.is_published = input.is_published;
        self.image = input.image;
        self.category_id = input.category_id;
        self.location_id = input.location_id;
    }
}

/// Validated post fields coming from the create/edit form
#[derive(Debug, Clone, PartialEq)]
pub struct PostInput {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub image: Option<String>,
}

/// The parts of a category shown next to a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRef {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub is_published: bool,
}

/// The parts of a location shown next to a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationRef {
    pub id: i64,
    pub name: String,
    pub is_published: bool,
}

/// Post joined with everything a listing or detail page shows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: String,
    pub category: Option<CategoryRef>,
    pub location: Option<LocationRef>,
    pub comment_count: i64,
}

impl PostWithMeta {
    /// Publication flag of the post's category, if it has one
    pub fn category_published(&self) -> Option<bool> {
        self.category.as_ref().map(|c| c.is_published)
    }
}

/// Which posts a listing query may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityScope {
    /// Every post regardless of flags (admin tooling)
    All,
    /// Posts `viewer` may see at `now`: their own, plus publicly visible ones
    VisibleTo {
        viewer: Option<i64>,
        now: DateTime<Utc>,
    },
}

/// Filter for post listings, rendered into a single `WHERE` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostFilter {
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub scope: VisibilityScope,
}

impl PostFilter {
    /// Posts visible to `viewer` at `now`
    pub fn visible_to(viewer: Option<i64>, now: DateTime<Utc>) -> Self {
        Self {
            author_id: None,
            category_id: None,
            scope: VisibilityScope::VisibleTo { viewer, now },
        }
    }

    /// Every post, unfiltered
    pub fn all() -> Self {
        Self {
            author_id: None,
            category_id: None,
            scope: VisibilityScope::All,
        }
    }

    /// Restrict to one author's posts
    pub fn by_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    /// Restrict to one category's posts
    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input(title: &str) -> PostInput {
        PostInput {
            title: title.to_string(),
            text: "text".to_string(),
            pub_date: Utc::now(),
            is_published: true,
            category_id: Some(1),
            location_id: None,
            image: None,
        }
    }

    #[test]
    fn test_apply_keeps_identity_and_author() {
        let mut post = Post::new(3, input("first"));
        post.id = 10;
        let created = post.created_at;

        let mut edited = input("second");
        edited.pub_date = Utc::now() + Duration::days(1);
        edited.category_id = None;
        post.apply(edited.clone());

        assert_eq!(post.id, 10);
        assert_eq!(post.author_id, 3);
        assert_eq!(post.created_at, created);
        assert_eq!(post.title, "second");
        assert_eq!(post.pub_date, edited.pub_date);
        assert!(post.category_id.is_none());
    }

    #[test]
    fn test_filter_builders() {
        let now = Utc::now();
        let filter = PostFilter::visible_to(Some(1), now).by_author(2).in_category(3);
        assert_eq!(filter.author_id, Some(2));
        assert_eq!(filter.category_id, Some(3));
        assert_eq!(
            filter.scope,
            VisibilityScope::VisibleTo {
                viewer: Some(1),
                now
            }
        );
        assert_eq!(PostFilter::all().scope, VisibilityScope::All);
    }
}
