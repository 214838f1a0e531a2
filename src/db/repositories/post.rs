//! Post repository
//!
//! Listing queries take a [`PostFilter`] which is rendered into a single
//! `WHERE` clause shared by both backends, so a listing and a single-post
//! lookup always agree on which posts a viewer may see.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CategoryRef, LocationRef, Post, PostFilter, PostWithMeta, VisibilityScope};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    /// Raw lookup without any visibility rules
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Single post with display metadata, only if it passes `filter`
    async fn find(&self, id: i64, filter: &PostFilter) -> Result<Option<PostWithMeta>>;

    /// One slice of the posts passing `filter`, newest `pub_date` first
    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64)
        -> Result<Vec<PostWithMeta>>;

    /// Number of posts passing `filter`
    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    async fn update(&self, post: &Post) -> Result<Post>;

    /// Delete a post; its comments go with it
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based post repository for SQLite and MySQL
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_post_sqlite(self.pool.sqlite()?, post).await,
            DatabaseDriver::Mysql => create_post_mysql(self.pool.mysql()?, post).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_post_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_post_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn find(&self, id: i64, filter: &PostFilter) -> Result<Option<PostWithMeta>> {
        let (mut clause, mut values) = render_filter(filter);
        clause.push_str(" AND p.id = ?");
        values.push(BindValue::Int(id));
        let sql = format!("{} WHERE {}", SELECT_WITH_META, clause);

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = bind_sqlite(sqlx::query(&sql), &values)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to find post")?;
                Ok(row.as_ref().map(row_to_post_with_meta_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = bind_mysql(sqlx::query(&sql), &values)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to find post")?;
                Ok(row.as_ref().map(row_to_post_with_meta_mysql))
            }
        }
    }

    async fn list(
        &self,
        filter: &PostFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<PostWithMeta>> {
        let (clause, mut values) = render_filter(filter);
        let sql = format!(
            "{} WHERE {} ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            SELECT_WITH_META, clause
        );
        values.push(BindValue::Int(limit));
        values.push(BindValue::Int(offset));

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_sqlite(sqlx::query(&sql), &values)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list posts")?;
                Ok(rows.iter().map(row_to_post_with_meta_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = bind_mysql(sqlx::query(&sql), &values)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list posts")?;
                Ok(rows.iter().map(row_to_post_with_meta_mysql).collect())
            }
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        let (clause, values) = render_filter(filter);
        let sql = format!(
            "SELECT COUNT(*) AS count FROM posts p LEFT JOIN categories c ON c.id = p.category_id WHERE {}",
            clause
        );

        let row_count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(&sql), &values)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count posts")?
                .get("count"),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(&sql), &values)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count posts")?
                .get("count"),
        };
        Ok(row_count)
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_post_sqlite(self.pool.sqlite()?, post).await,
            DatabaseDriver::Mysql => update_post_mysql(self.pool.mysql()?, post).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_post_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_post_mysql(self.pool.mysql()?, id).await,
        }
    }
}

// ============================================================================
// Filter rendering
// ============================================================================

/// A value bound to one `?` placeholder of a rendered filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BindValue {
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

/// Render a filter as a `WHERE` condition over `posts p` left-joined with
/// `categories c`, plus the values for its placeholders in order.
pub(crate) fn render_filter(filter: &PostFilter) -> (String, Vec<BindValue>) {
    let mut conditions = vec!["1 = 1".to_string()];
    let mut values = Vec::new();

    if let Some(author_id) = filter.author_id {
        conditions.push("p.author_id = ?".to_string());
        values.push(BindValue::Int(author_id));
    }
    if let Some(category_id) = filter.category_id {
        conditions.push("p.category_id = ?".to_string());
        values.push(BindValue::Int(category_id));
    }

    if let VisibilityScope::VisibleTo { viewer, now } = filter.scope {
        let public = "(p.is_published = ? AND p.pub_date <= ? AND (p.category_id IS NULL OR c.is_published = ?))";
        match viewer {
            Some(viewer_id) => {
                conditions.push(format!("(p.author_id = ? OR {})", public));
                values.push(BindValue::Int(viewer_id));
            }
            None => conditions.push(public.to_string()),
        }
        values.push(BindValue::Bool(true));
        values.push(BindValue::Time(now));
        values.push(BindValue::Bool(true));
    }

    (conditions.join(" AND "), values)
}

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[BindValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match *value {
            BindValue::Int(v) => query.bind(v),
            BindValue::Bool(v) => query.bind(v),
            BindValue::Time(v) => query.bind(v),
        };
    }
    query
}

fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &[BindValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match *value {
            BindValue::Int(v) => query.bind(v),
            BindValue::Bool(v) => query.bind(v),
            BindValue::Time(v) => query.bind(v),
        };
    }
    query
}

const POST_COLUMNS: &str = "id, title, text, pub_date, is_published, image, author_id, category_id, location_id, created_at";

const SELECT_WITH_META: &str = r#"
    SELECT p.id, p.title, p.text, p.pub_date, p.is_published, p.image,
           p.author_id, p.category_id, p.location_id, p.created_at,
           u.username AS author_username,
           c.title AS category_title, c.slug AS category_slug,
           c.is_published AS category_is_published,
           l.name AS location_name, l.is_published AS location_is_published,
           (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN categories c ON c.id = p.category_id
    LEFT JOIN locations l ON l.id = p.location_id
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, text, pub_date, is_published, image, author_id, category_id, location_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.text)
    .bind(post.pub_date)
    .bind(post.is_published)
    .bind(&post.image)
    .bind(post.author_id)
    .bind(post.category_id)
    .bind(post.location_id)
    .bind(post.created_at)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_rowid(),
        ..post.clone()
    })
}

async fn get_post_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post")?;

    Ok(row.as_ref().map(row_to_post_sqlite))
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, text = ?, pub_date = ?, is_published = ?, image = ?, category_id = ?, location_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.text)
    .bind(post.pub_date)
    .bind(post.is_published)
    .bind(&post.image)
    .bind(post.category_id)
    .bind(post.location_id)
    .bind(post.id)
    .execute(pool)
    .await
    .context("Failed to update post")?;

    Ok(post.clone())
}

async fn delete_post_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;
    Ok(())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        text: row.get("text"),
        pub_date: row.get("pub_date"),
        is_published: row.get("is_published"),
        image: row.get("image"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        location_id: row.get("location_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_post_with_meta_sqlite(row: &sqlx::sqlite::SqliteRow) -> PostWithMeta {
    let post = row_to_post_sqlite(row);
    let category = post.category_id.map(|id| CategoryRef {
        id,
        title: row.get("category_title"),
        slug: row.get("category_slug"),
        is_published: row.get("category_is_published"),
    });
    let location = post.location_id.map(|id| LocationRef {
        id,
        name: row.get("location_name"),
        is_published: row.get("location_is_published"),
    });

    PostWithMeta {
        post,
        author_username: row.get("author_username"),
        category,
        location,
        comment_count: row.get("comment_count"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    let result = sqlx::query(
        r#"
        INSERT INTO posts (title, text, pub_date, is_published, image, author_id, category_id, location_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.text)
    .bind(post.pub_date)
    .bind(post.is_published)
    .bind(&post.image)
    .bind(post.author_id)
    .bind(post.category_id)
    .bind(post.location_id)
    .bind(post.created_at)
    .execute(pool)
    .await
    .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_id() as i64,
        ..post.clone()
    })
}

async fn get_post_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post")?;

    Ok(row.as_ref().map(row_to_post_mysql))
}

async fn update_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    sqlx::query(
        r#"
        UPDATE posts
        SET title = ?, text = ?, pub_date = ?, is_published = ?, image = ?, category_id = ?, location_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.title)
    .bind(&post.text)
    .bind(post.pub_date)
    .bind(post.is_published)
    .bind(&post.image)
    .bind(post.category_id)
    .bind(post.location_id)
    .bind(post.id)
    .execute(pool)
    .await
    .context("Failed to update post")?;

    Ok(post.clone())
}

async fn delete_post_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;
    Ok(())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        text: row.get("text"),
        pub_date: row.get("pub_date"),
        is_published: row.get("is_published"),
        image: row.get("image"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        location_id: row.get("location_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_post_with_meta_mysql(row: &sqlx::mysql::MySqlRow) -> PostWithMeta {
    let post = row_to_post_mysql(row);
    let category = post.category_id.map(|id| CategoryRef {
        id,
        title: row.get("category_title"),
        slug: row.get("category_slug"),
        is_published: row.get("category_is_published"),
    });
    let location = post.location_id.map(|id| LocationRef {
        id,
        name: row.get("location_name"),
        is_published: row.get("location_is_published"),
    });

    PostWithMeta {
        post,
        author_username: row.get("author_username"),
        category,
        location,
        comment_count: row.get("comment_count"),
    }
}
