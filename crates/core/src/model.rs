use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SnippetId = String;

/// Title assigned when the submitter does not supply one.
pub const DEFAULT_HEADER: &str = "Untitled";

/// A stored unit of text content, subject to optional time- and
/// view-count-based expiry. Fields other than `views` are final once
/// construction-time configuration is done.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: SnippetId,
    pub code: String,
    pub header: String,
    pub created_at: DateTime<Utc>,
    pub views: u32,
    /// Expired once the current time is at or after this instant.
    pub delete_at: Option<DateTime<Utc>>,
    /// View-exhausted once `views >= views_limit`.
    pub views_limit: Option<u32>,
}

impl Snippet {
    pub fn new(code: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: code.to_owned(),
            header: DEFAULT_HEADER.to_owned(),
            created_at: Utc::now(),
            views: 0,
            delete_at: None,
            views_limit: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, header: &str) -> Self {
        self.header = header.to_owned();
        self
    }

    pub fn set_views_limit(&mut self, limit: Option<u32>) {
        self.views_limit = limit;
    }

    pub fn set_delete_at(&mut self, at: Option<DateTime<Utc>>) {
        self.delete_at = at;
    }

    /// Whether the snippet may still be served at `now`. The caller
    /// supplies a single `now` so one evaluation cannot straddle a
    /// clock read.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if let Some(delete_at) = self.delete_at {
            if now >= delete_at {
                return false;
            }
        }
        match self.views_limit {
            Some(limit) => self.views < limit,
            None => true,
        }
    }

    /// Both a deletion time and a view limit are configured. Purely
    /// informational; either limit alone is sufficient to expire.
    pub fn is_restricted(&self) -> bool {
        self.delete_at.is_some() && self.views_limit.is_some()
    }

    /// Count one serving read. Only call after `is_available` said yes.
    pub fn record_view(&mut self) {
        self.views = self.views.saturating_add(1);
    }
}
