//! Services layer - Business logic
//!
//! Services sit between the web handlers and the repositories. They own
//! validation, ownership checks and the visibility policy, and report
//! failures through one `thiserror` enum per service.

pub mod category;
pub mod comment;
pub mod location;
pub mod media;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod user;
pub mod validation;
pub mod visibility;

pub use category::{generate_slug, CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use location::{LocationService, LocationServiceError};
pub use media::{ImageUpload, MediaError, MediaStore};
pub use password::{hash_password, validate_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use user::{ChangePasswordInput, LoginInput, RegisterInput, UserService, UserServiceError};
pub use validation::FieldErrors;
pub use visibility::{is_publicly_visible, is_visible, is_visible_with_meta};
