use crate::errors::ValidationError;
use chrono::{DateTime, Duration, Utc};

/// Practical cap on the stored text body.
pub const MAX_CODE_CHARS: usize = 65_536;

pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    if code.chars().count() > MAX_CODE_CHARS {
        return Err(ValidationError::CodeTooLong(MAX_CODE_CHARS));
    }
    Ok(())
}

/// Convert the wire's relative minutes limit into the absolute
/// deletion instant. Zero minutes means expired on arrival.
pub fn delete_at_after_minutes(created_at: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    created_at + Duration::minutes(minutes)
}
