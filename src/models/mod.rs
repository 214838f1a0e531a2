//! Data models
//!
//! Database entities (User, Session, Category, Location, Post, Comment),
//! the inputs used to create and change them, and pagination types.

mod category;
mod comment;
mod location;
mod pagination;
mod post;
mod session;
mod user;

pub use category::{Category, CreateCategoryInput};
pub use comment::{Comment, CommentWithAuthor};
pub use location::{CreateLocationInput, Location};
pub use pagination::{paginate, Page, PAGE_SIZE};
pub use post::{
    CategoryRef, LocationRef, Post, PostFilter, PostInput, PostWithMeta, VisibilityScope,
};
pub use session::Session;
pub use user::{CreateUserInput, UpdateProfileInput, User};

/// Maximum length of titles, names and slugs
pub const MAX_LENGTH: usize = 256;

/// Length of the short labels used in listings and the admin CLI
pub const SLICE: usize = 30;

/// Cut `s` down to at most `SLICE` characters.
pub fn short_label(s: &str) -> String {
    s.chars().take(SLICE).collect()
}
