//! DI "Interfaces"

use crate::core::auth::Principal;
use crate::core::errors::ActionError;
use crate::infrastructure::entities;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Library search parameters. Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionQuery {
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub subject: Option<String>,
    pub topic: Option<String>,
}

impl CompanionQuery {
    /// Zero-based inclusive row range for the requested page.
    ///
    /// Pages past the last addressable row are clamped so both bounds fit
    /// the store's signed 64-bit offsets.
    pub fn range(&self) -> (u64, u64) {
        let limit = u64::from(self.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1));
        let page = u64::from(self.page.unwrap_or(1).max(1)).min(i64::MAX as u64 / limit);
        ((page - 1) * limit, page * limit - 1)
    }
}

/// Companion actions available to page handlers and the JSON API.
///
/// Reads take the viewer only to forward its data-tier token. Every action
/// returns a typed result: failures are never reported as empty data.
#[async_trait]
pub trait CompanionService: Send + Sync {
    /// Creates a companion authored by `principal`.
    ///
    /// Returns `Unauthorized` without a principal; nothing is inserted then.
    async fn create_companion(
        &self,
        principal: Option<&Principal>,
        fields: entities::NewCompanion,
    ) -> Result<entities::Companion, ActionError>;

    /// Filtered, paginated library listing.
    async fn get_all_companions(
        &self,
        viewer: Option<&Principal>,
        query: &CompanionQuery,
    ) -> Result<Vec<entities::Companion>, ActionError>;

    /// `Ok(None)` when no companion has this id.
    async fn get_companion(
        &self,
        viewer: Option<&Principal>,
        id: Uuid,
    ) -> Result<Option<entities::Companion>, ActionError>;

    async fn add_to_session_history(
        &self,
        principal: Option<&Principal>,
        companion_id: Uuid,
    ) -> Result<(), ActionError>;

    /// Companions of the newest sessions across all users.
    async fn get_recent_sessions(
        &self,
        viewer: Option<&Principal>,
        limit: u32,
    ) -> Result<Vec<entities::Companion>, ActionError>;

    async fn get_user_sessions(
        &self,
        viewer: Option<&Principal>,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<entities::Companion>, ActionError>;

    async fn get_user_companions(
        &self,
        viewer: Option<&Principal>,
        user_id: &str,
    ) -> Result<Vec<entities::Companion>, ActionError>;

    /// Whether `principal` may create another companion.
    async fn new_companion_permissions(
        &self,
        principal: Option<&Principal>,
    ) -> Result<bool, ActionError>;

    /// Bookmarks a companion and revalidates `path`.
    async fn add_bookmark(
        &self,
        principal: Option<&Principal>,
        companion_id: Uuid,
        path: &str,
    ) -> Result<(), ActionError>;

    /// Removes a bookmark and revalidates `path`.
    async fn remove_bookmark(
        &self,
        principal: Option<&Principal>,
        companion_id: Uuid,
        path: &str,
    ) -> Result<(), ActionError>;

    async fn get_bookmarked_companions(
        &self,
        viewer: Option<&Principal>,
        user_id: &str,
    ) -> Result<Vec<entities::Companion>, ActionError>;
}

/// Rendered-page cache, invalidated per logical path.
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, path: &str, variant: &str) -> Option<String>;

    async fn put(&self, path: &str, variant: &str, html: String);

    /// Drops every cached variant of `path`.
    async fn revalidate(&self, path: &str);
}
