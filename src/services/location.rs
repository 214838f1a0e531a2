//! Location service

use crate::db::repositories::LocationRepository;
use crate::models::{CreateLocationInput, Location};
use crate::services::validation::{check_required, FieldErrors};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for location service operations
#[derive(Debug, thiserror::Error)]
pub enum LocationServiceError {
    #[error("Location not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Location service
pub struct LocationService {
    repo: Arc<dyn LocationRepository>,
}

impl LocationService {
    pub fn new(repo: Arc<dyn LocationRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, input: CreateLocationInput) -> Result<Location, LocationServiceError> {
        let name = input.name.trim().to_string();

        let mut errors = FieldErrors::new();
        check_required(&mut errors, "name", &name);
        errors.into_result().map_err(LocationServiceError::ValidationError)?;

        let created = self
            .repo
            .create(&Location {
                id: 0,
                name,
                is_published: input.is_published,
                created_at: Utc::now(),
            })
            .await
            .context("Failed to create location")?;

        tracing::info!("Created location {} (id {})", created.name, created.id);
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Location>, LocationServiceError> {
        let location = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get location")?;
        Ok(location)
    }

    /// All locations ordered by name
    pub async fn list(&self) -> Result<Vec<Location>, LocationServiceError> {
        let locations = self.repo.list().await.context("Failed to list locations")?;
        Ok(locations)
    }

    pub async fn set_published(&self, id: i64, is_published: bool) -> Result<(), LocationServiceError> {
        let found = self
            .repo
            .set_published(id, is_published)
            .await
            .context("Failed to update location")?;
        if !found {
            return Err(LocationServiceError::NotFound(id));
        }
        Ok(())
    }

    /// Delete a location; its posts lose their location.
    pub async fn delete(&self, id: i64) -> Result<(), LocationServiceError> {
        let found = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete location")?;
        if !found {
            return Err(LocationServiceError::NotFound(id));
        }
        tracing::info!("Deleted location {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{fixtures, SqlxLocationRepository};

    async fn setup_test_service() -> LocationService {
        let pool = fixtures::pool().await;
        LocationService::new(SqlxLocationRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_create_and_manage_location() {
        let service = setup_test_service().await;

        let created = service
            .create(CreateLocationInput {
                name: "  Kazan ".to_string(),
                is_published: true,
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Kazan");

        service.set_published(created.id, false).await.unwrap();
        assert!(!service.get_by_id(created.id).await.unwrap().unwrap().is_published);

        service.delete(created.id).await.unwrap();
        assert!(matches!(
            service.delete(created.id).await,
            Err(LocationServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.set_published(created.id, true).await,
            Err(LocationServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let service = setup_test_service().await;

        let result = service
            .create(CreateLocationInput {
                name: "   ".to_string(),
                is_published: true,
            })
            .await;
        assert!(matches!(result, Err(LocationServiceError::ValidationError(_))));
        assert!(service.list().await.unwrap().is_empty());
    }
}
