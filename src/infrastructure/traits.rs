//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::database::StoreError;
use crate::infrastructure::entities;
use async_trait::async_trait;
use uuid::Uuid;

/// Library search: optional partial matches plus a zero-based inclusive row range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanionFilter {
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub from: u64,
    pub to: u64,
}

/// Every method takes the caller's data-tier token, if any; it is attached to
/// that request only.
#[async_trait]
pub trait CompanionRepository: Send + Sync {
    async fn insert_companion(
        &self,
        token: Option<&str>,
        author: &str,
        fields: entities::NewCompanion,
    ) -> Result<entities::Companion, StoreError>;

    async fn list_companions(
        &self,
        token: Option<&str>,
        filter: &CompanionFilter,
    ) -> Result<Vec<entities::Companion>, StoreError>;

    async fn find_companion(
        &self,
        token: Option<&str>,
        id: Uuid,
    ) -> Result<Option<entities::Companion>, StoreError>;

    async fn list_companions_by_author(
        &self,
        token: Option<&str>,
        author: &str,
    ) -> Result<Vec<entities::Companion>, StoreError>;

    async fn count_companions_by_author(
        &self,
        token: Option<&str>,
        author: &str,
    ) -> Result<usize, StoreError>;

    async fn insert_session(
        &self,
        token: Option<&str>,
        user_id: &str,
        companion_id: Uuid,
    ) -> Result<(), StoreError>;

    /// Companions of the newest session rows, optionally for one user.
    async fn list_session_companions(
        &self,
        token: Option<&str>,
        user_id: Option<&str>,
        limit: u64,
    ) -> Result<Vec<entities::Companion>, StoreError>;

    /// Returns `false` when the bookmark already existed.
    async fn insert_bookmark(
        &self,
        token: Option<&str>,
        user_id: &str,
        companion_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn delete_bookmark(
        &self,
        token: Option<&str>,
        user_id: &str,
        companion_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn list_bookmarked_companions(
        &self,
        token: Option<&str>,
        user_id: &str,
    ) -> Result<Vec<entities::Companion>, StoreError>;
}
