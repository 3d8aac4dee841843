//! Core domain model, validation, and the storage trait.
//! No async and no IO within this crate.

pub mod errors;
pub mod model;
pub mod traits;
pub mod validate;

pub use crate::errors::{CoreError, ValidationError};
pub use crate::model::{Snippet, SnippetId, DEFAULT_HEADER};
pub use crate::traits::Storage;
pub use crate::validate::{delete_at_after_minutes, validate_code, MAX_CODE_CHARS};
