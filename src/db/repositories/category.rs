//! Category repository
//!
//! Database operations for categories.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories ordered by title
    async fn list(&self) -> Result<Vec<Category>>;

    /// Returns false when no category has this id
    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    /// Returns false when no category has this id
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based category repository for SQLite and MySQL
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_category_sqlite(self.pool.sqlite()?, category).await,
            DatabaseDriver::Mysql => create_category_mysql(self.pool.mysql()?, category).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_category_sqlite(self.pool.sqlite()?, "id = ?", Key::Id(id)).await
            }
            DatabaseDriver::Mysql => {
                get_category_mysql(self.pool.mysql()?, "id = ?", Key::Id(id)).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_category_sqlite(self.pool.sqlite()?, "slug = ?", Key::Slug(slug)).await
            }
            DatabaseDriver::Mysql => {
                get_category_mysql(self.pool.mysql()?, "slug = ?", Key::Slug(slug)).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_categories_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_categories_mysql(self.pool.mysql()?).await,
        }
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool> {
        let sql = "UPDATE categories SET is_published = ? WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update category")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update category")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM categories WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete category")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete category")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

/// Lookup key for single-category queries
enum Key<'a> {
    Id(i64),
    Slug(&'a str),
}

const CATEGORY_COLUMNS: &str = "id, title, description, slug, is_published, created_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (title, description, slug, is_published, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.title)
    .bind(&category.description)
    .bind(&category.slug)
    .bind(category.is_published)
    .bind(category.created_at)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        ..category.clone()
    })
}

async fn get_category_sqlite(
    pool: &SqlitePool,
    condition: &str,
    key: Key<'_>,
) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE {}", CATEGORY_COLUMNS, condition);
    let query = sqlx::query(&sql);
    let query = match key {
        Key::Id(id) => query.bind(id),
        Key::Slug(slug) => query.bind(slug),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get category")?;

    Ok(row.as_ref().map(row_to_category_sqlite))
}

async fn list_categories_sqlite(pool: &SqlitePool) -> Result<Vec<Category>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM categories ORDER BY title, id",
        CATEGORY_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.iter().map(row_to_category_sqlite).collect())
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let result = sqlx::query(
        r#"
        INSERT INTO categories (title, description, slug, is_published, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.title)
    .bind(&category.description)
    .bind(&category.slug)
    .bind(category.is_published)
    .bind(category.created_at)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        ..category.clone()
    })
}

async fn get_category_mysql(
    pool: &MySqlPool,
    condition: &str,
    key: Key<'_>,
) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE {}", CATEGORY_COLUMNS, condition);
    let query = sqlx::query(&sql);
    let query = match key {
        Key::Id(id) => query.bind(id),
        Key::Slug(slug) => query.bind(slug),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get category")?;

    Ok(row.as_ref().map(row_to_category_mysql))
}

async fn list_categories_mysql(pool: &MySqlPool) -> Result<Vec<Category>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM categories ORDER BY title, id",
        CATEGORY_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.iter().map(row_to_category_mysql).collect())
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}
