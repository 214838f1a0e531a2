//! Test fixtures shared by repository, service and handler tests

use chrono::{DateTime, Utc};

use super::{
    CategoryRepository, CommentRepository, LocationRepository, PostRepository,
    SqlxCategoryRepository, SqlxCommentRepository, SqlxLocationRepository, SqlxPostRepository,
    SqlxUserRepository, UserRepository,
};
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{Category, Comment, Location, Post, PostInput, User};

/// Fresh in-memory database with the schema applied
pub(crate) async fn pool() -> DynDatabasePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

pub(crate) async fn user(pool: &DynDatabasePool, username: &str) -> User {
    SqlxUserRepository::new(pool.clone())
        .create(&User::new(username.to_string(), "not-a-real-hash".to_string()))
        .await
        .expect("Failed to create user")
}

pub(crate) async fn category(pool: &DynDatabasePool, slug: &str, is_published: bool) -> Category {
    let mut category = Category::new(slug.to_string(), format!("About {}", slug), slug.to_string());
    category.is_published = is_published;
    SqlxCategoryRepository::new(pool.clone())
        .create(&category)
        .await
        .expect("Failed to create category")
}

pub(crate) async fn location(pool: &DynDatabasePool, name: &str, is_published: bool) -> Location {
    SqlxLocationRepository::new(pool.clone())
        .create(&Location {
            id: 0,
            name: name.to_string(),
            is_published,
            created_at: Utc::now(),
        })
        .await
        .expect("Failed to create location")
}

/// A published post with the given author, category and publication time
pub(crate) async fn post(
    pool: &DynDatabasePool,
    author_id: i64,
    category_id: Option<i64>,
    pub_date: DateTime<Utc>,
) -> Post {
    let input = PostInput {
        title: format!("Post at {}", pub_date.format("%Y-%m-%d %H:%M")),
        text: "Some text".to_string(),
        pub_date,
        is_published: true,
        category_id,
        location_id: None,
        image: None,
    };
    SqlxPostRepository::new(pool.clone())
        .create(&Post::new(author_id, input))
        .await
        .expect("Failed to create post")
}

pub(crate) async fn comment(pool: &DynDatabasePool, post_id: i64, author_id: i64, text: &str) -> Comment {
    SqlxCommentRepository::new(pool.clone())
        .create(&Comment::new(post_id, author_id, text.to_string()))
        .await
        .expect("Failed to create comment")
}
