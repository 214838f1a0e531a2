//! Management tool for categories and locations.
//!
//! Usage: `blogicum-admin category add "Путешествия" --slug travel`

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use blogicum::{
    config::Config,
    db::{
        self,
        repositories::{SqlxCategoryRepository, SqlxLocationRepository},
        DynDatabasePool,
    },
    models::{short_label, CreateCategoryInput, CreateLocationInput},
    services::{
        generate_slug, CategoryService, CategoryServiceError, LocationService,
        LocationServiceError,
    },
};

#[derive(Debug, Parser)]
#[command(name = "blogicum-admin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Manage Blogicum categories and locations")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Manage locations
    Location {
        #[command(subcommand)]
        action: LocationAction,
    },
    /// Check the database connection and pending migrations
    Status,
}

#[derive(Debug, Subcommand)]
enum CategoryAction {
    /// Create a category
    Add {
        title: String,
        /// Defaults to one derived from the title
        #[arg(long)]
        slug: Option<String>,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Create it unpublished
        #[arg(long)]
        hidden: bool,
    },
    /// Make a category visible
    Publish { slug: String },
    /// Hide a category and every post in it
    Unpublish { slug: String },
    /// Delete a category; its posts keep existing without one
    Delete { slug: String },
    /// List all categories
    List {},
}

#[derive(Debug, Subcommand)]
enum LocationAction {
    /// Create a location
    Add {
        name: String,
        #[arg(long)]
        hidden: bool,
    },
    Publish { id: i64 },
    Unpublish { id: i64 },
    Delete { id: i64 },
    /// List all locations
    List {},
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogicum=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_with_env(&cli.config)?;

    let pool = db::create_pool(&config.database).await?;

    if let Commands::Status = cli.command {
        let result = status(&pool).await;
        pool.close().await;
        return result;
    }

    db::migrations::run_migrations(&pool).await?;

    let result = match cli.command {
        Commands::Category { action } => {
            let service = CategoryService::new(SqlxCategoryRepository::boxed(pool.clone()));
            run_category(&service, action).await
        }
        Commands::Location { action } => {
            let service = LocationService::new(SqlxLocationRepository::boxed(pool.clone()));
            run_location(&service, action).await
        }
        Commands::Status => Ok(()),
    };

    pool.close().await;
    result
}

async fn run_category(service: &CategoryService, action: CategoryAction) -> Result<()> {
    match action {
        CategoryAction::Add {
            title,
            slug,
            description,
            hidden,
        } => {
            let slug = slug.unwrap_or_else(|| generate_slug(&title));
            let input = CreateCategoryInput {
                description: if description.trim().is_empty() {
                    title.clone()
                } else {
                    description
                },
                title,
                slug,
                is_published: !hidden,
            };
            let category = service.create(input).await.map_err(category_error)?;
            println!("Created category {} ({})", category.slug, short_label(&category.title));
        }
        CategoryAction::Publish { slug } => {
            service.set_published(&slug, true).await.map_err(category_error)?;
            println!("Published category {}", slug);
        }
        CategoryAction::Unpublish { slug } => {
            service.set_published(&slug, false).await.map_err(category_error)?;
            println!("Unpublished category {}", slug);
        }
        CategoryAction::Delete { slug } => {
            service.delete(&slug).await.map_err(category_error)?;
            println!("Deleted category {}", slug);
        }
        CategoryAction::List {} => {
            let categories = service.list().await.map_err(category_error)?;
            if categories.is_empty() {
                println!("No categories");
            }
            for category in categories {
                println!(
                    "{:<24} {:<30} {}",
                    category.slug,
                    short_label(&category.title),
                    published_label(category.is_published)
                );
            }
        }
    }
    Ok(())
}

async fn run_location(service: &LocationService, action: LocationAction) -> Result<()> {
    match action {
        LocationAction::Add { name, hidden } => {
            let input = CreateLocationInput {
                name,
                is_published: !hidden,
            };
            let location = service.create(input).await.map_err(location_error)?;
            println!("Created location {} ({})", location.id, short_label(&location.name));
        }
        LocationAction::Publish { id } => {
            service.set_published(id, true).await.map_err(location_error)?;
            println!("Published location {}", id);
        }
        LocationAction::Unpublish { id } => {
            service.set_published(id, false).await.map_err(location_error)?;
            println!("Unpublished location {}", id);
        }
        LocationAction::Delete { id } => {
            service.delete(id).await.map_err(location_error)?;
            println!("Deleted location {}", id);
        }
        LocationAction::List {} => {
            let locations = service.list().await.map_err(location_error)?;
            if locations.is_empty() {
                println!("No locations");
            }
            for location in locations {
                println!(
                    "{:>6} {:<30} {}",
                    location.id,
                    short_label(&location.name),
                    published_label(location.is_published)
                );
            }
        }
    }
    Ok(())
}

async fn status(pool: &DynDatabasePool) -> Result<()> {
    pool.ping().await?;
    println!("database: {:?} reachable", pool.driver());
    match db::migrations::pending_count(pool).await? {
        0 => println!("migrations: up to date"),
        n => println!("migrations: {} pending", n),
    }
    Ok(())
}

fn published_label(is_published: bool) -> &'static str {
    if is_published {
        "published"
    } else {
        "hidden"
    }
}

fn category_error(e: CategoryServiceError) -> anyhow::Error {
    match e {
        CategoryServiceError::ValidationError(errors) => anyhow::anyhow!("Invalid category: {}", errors),
        CategoryServiceError::NotFound(slug) => anyhow::anyhow!("No category with slug {}", slug),
        CategoryServiceError::InternalError(e) => e,
    }
}

fn location_error(e: LocationServiceError) -> anyhow::Error {
    match e {
        LocationServiceError::ValidationError(errors) => anyhow::anyhow!("Invalid location: {}", errors),
        LocationServiceError::NotFound(id) => anyhow::anyhow!("No location with id {}", id),
        LocationServiceError::InternalError(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_category_add() {
        let cli = Cli::try_parse_from([
            "blogicum-admin",
            "category",
            "add",
            "Путешествия",
            "--slug",
            "travel",
            "--hidden",
        ])
        .unwrap();
        match cli.command {
            Commands::Category {
                action: CategoryAction::Add { title, slug, hidden, .. },
            } => {
                assert_eq!(title, "Путешествия");
                assert_eq!(slug.as_deref(), Some("travel"));
                assert!(hidden);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_location_publish() {
        let cli = Cli::try_parse_from(["blogicum-admin", "location", "publish", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Location {
                action: LocationAction::Publish { id: 7 }
            }
        ));
    }

    #[tokio::test]
    async fn test_status_on_fresh_database() {
        let cli = Cli::try_parse_from(["blogicum-admin", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));

        let pool = db::create_test_pool().await.unwrap();
        status(&pool).await.unwrap();
        assert!(db::migrations::pending_count(&pool).await.unwrap() > 0);
    }
}
