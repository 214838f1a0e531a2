//! Location repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Location;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Location repository trait
#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn create(&self, location: &Location) -> Result<Location>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>>;

    /// All locations ordered by name
    async fn list(&self) -> Result<Vec<Location>>;

    /// Returns false when no location has this id
    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool>;

    /// Returns false when no location has this id
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based location repository for SQLite and MySQL
pub struct SqlxLocationRepository {
    pool: DynDatabasePool,
}

impl SqlxLocationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LocationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LocationRepository for SqlxLocationRepository {
    async fn create(&self, location: &Location) -> Result<Location> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_location_sqlite(self.pool.sqlite()?, location).await,
            DatabaseDriver::Mysql => create_location_mysql(self.pool.mysql()?, location).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Location>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_location_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_location_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self) -> Result<Vec<Location>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_locations_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_locations_mysql(self.pool.mysql()?).await,
        }
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<bool> {
        let sql = "UPDATE locations SET is_published = ? WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update location")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(is_published)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update location")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM locations WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete location")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete location")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_location_sqlite(pool: &SqlitePool, location: &Location) -> Result<Location> {
    let result = sqlx::query("INSERT INTO locations (name, is_published, created_at) VALUES (?, ?, ?)")
        .bind(&location.name)
        .bind(location.is_published)
        .bind(location.created_at)
        .execute(pool)
        .await
        .context("Failed to create location")?;

    Ok(Location {
        id: result.last_insert_rowid(),
        ..location.clone()
    })
}

async fn get_location_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Location>> {
    let row = sqlx::query("SELECT id, name, is_published, created_at FROM locations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get location")?;

    Ok(row.map(|row| Location {
        id: row.get("id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }))
}

async fn list_locations_sqlite(pool: &SqlitePool) -> Result<Vec<Location>> {
    let rows = sqlx::query("SELECT id, name, is_published, created_at FROM locations ORDER BY name, id")
        .fetch_all(pool)
        .await
        .context("Failed to list locations")?;

    Ok(rows
        .into_iter()
        .map(|row| Location {
            id: row.get("id"),
            name: row.get("name"),
            is_published: row.get("is_published"),
            created_at: row.get("created_at"),
        })
        .collect())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_location_mysql(pool: &MySqlPool, location: &Location) -> Result<Location> {
    let result = sqlx::query("INSERT INTO locations (name, is_published, created_at) VALUES (?, ?, ?)")
        .bind(&location.name)
        .bind(location.is_published)
        .bind(location.created_at)
        .execute(pool)
        .await
        .context("Failed to create location")?;

    Ok(Location {
        id: result.last_insert_id() as i64,
        ..location.clone()
    })
}

async fn get_location_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Location>> {
    let row = sqlx::query("SELECT id, name, is_published, created_at FROM locations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get location")?;

    Ok(row.map(|row| Location {
        id: row.get("id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }))
}

async fn list_locations_mysql(pool: &MySqlPool) -> Result<Vec<Location>> {
    let rows = sqlx::query("SELECT id, name, is_published, created_at FROM locations ORDER BY name, id")
        .fetch_all(pool)
        .await
        .context("Failed to list locations")?;

    Ok(rows
        .into_iter()
        .map(|row| Location {
            id: row.get("id"),
            name: row.get("name"),
            is_published: row.get("is_published"),
            created_at: row.get("created_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures;

    #[tokio::test]
    async fn test_location_lifecycle() {
        let pool = fixtures::pool().await;
        let repo = SqlxLocationRepository::new(pool.clone());

        let moscow = fixtures::location(&pool, "Moscow", true).await;
        fixtures::location(&pool, "Kazan", false).await;

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Kazan", "Moscow"]);

        assert!(repo.set_published(moscow.id, false).await.unwrap());
        assert!(!repo.get_by_id(moscow.id).await.unwrap().unwrap().is_published);

        assert!(repo.delete(moscow.id).await.unwrap());
        assert!(repo.get_by_id(moscow.id).await.unwrap().is_none());
        assert!(!repo.delete(moscow.id).await.unwrap());
    }
}
