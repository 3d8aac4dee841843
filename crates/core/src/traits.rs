use crate::model::Snippet;

/// Keyed snippet storage, to be implemented by storage adapters.
/// No async in core; callers should use spawn_blocking when invoking
/// from async contexts.
pub trait Storage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Upsert keyed by `snippet.id`. Idempotent per identifier.
    fn put(&self, snippet: &Snippet) -> Result<(), Self::Error>;

    /// A missing identifier is `Ok(None)`, never an error.
    fn get(&self, id: &str) -> Result<Option<Snippet>, Self::Error>;

    /// Returns whether an entry was actually removed; removing an
    /// absent identifier is `Ok(false)`.
    fn remove(&self, id: &str) -> Result<bool, Self::Error>;

    /// A fresh snapshot of everything currently stored. Finite, no
    /// ordering guarantee.
    fn list_all(&self) -> Result<Vec<Snippet>, Self::Error>;
}
