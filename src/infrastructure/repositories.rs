//! DB Repository abstractions

use crate::infrastructure::database::{DatabaseConnection, StoreError};
use crate::infrastructure::entities::{
    Bookmark, Companion, CompanionRow, EmbeddedCompanion, NewCompanion, SessionHistoryEntry,
};
use crate::infrastructure::query::{Embed, Filter, Query, Selection, Table};
use crate::infrastructure::traits::{CompanionFilter, CompanionRepository};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

const COMPANION_EMBED: Embed = Embed {
    alias: "companions",
    foreign_key: "companion_id",
    table: Table::Companions,
};

#[injectable(CompanionRepository)]
pub struct DbCompanionRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbCompanionRepository {
    pub fn new(connection: Ref<DatabaseConnection>) -> DbCompanionRepository {
        DbCompanionRepository { connection }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        query: Query,
        token: Option<&str>,
    ) -> Result<Vec<T>, StoreError> {
        self.connection
            .execute(&query, token)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    /// Joined rows projected to their companion, keeping row order.
    async fn fetch_embedded(
        &self,
        query: Query,
        token: Option<&str>,
    ) -> Result<Vec<Companion>, StoreError> {
        let rows: Vec<EmbeddedCompanion> = self.fetch(query, token).await?;
        let total = rows.len();
        let companions: Vec<Companion> = rows.into_iter().filter_map(|r| r.companions).collect();
        if companions.len() != total {
            warn!(
                "{} linked rows point at missing companions",
                total - companions.len()
            );
        }
        Ok(companions)
    }
}

fn to_row<T: Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        _ => Err(StoreError::InvalidQuery("row must serialize to an object".into())),
    }
}

/// `subject ILIKE %s%` and/or `(topic ILIKE %t% OR name ILIKE %t%)`.
fn library_query(filter: &CompanionFilter) -> Query {
    let mut query = Query::table(Table::Companions);

    if let Some(subject) = &filter.subject {
        query = query.ilike("subject", format!("%{subject}%"));
    }
    if let Some(topic) = &filter.topic {
        query = query.or(vec![
            Filter::contains("topic", topic),
            Filter::contains("name", topic),
        ]);
    }

    query.range(filter.from, filter.to)
}

#[async_trait]
impl CompanionRepository for DbCompanionRepository {
    async fn insert_companion(
        &self,
        token: Option<&str>,
        author: &str,
        fields: NewCompanion,
    ) -> Result<Companion, StoreError> {
        let row = to_row(&CompanionRow {
            id: Uuid::new_v4(),
            author: author.to_owned(),
            created_at: Utc::now(),
            fields,
        })?;

        let inserted: Vec<Companion> = self
            .fetch(Query::table(Table::Companions).insert(vec![row], true), token)
            .await?;

        inserted.into_iter().next().ok_or_else(|| StoreError::Remote {
            status: 200,
            code: None,
            message: "insert returned no rows".into(),
        })
    }

    async fn list_companions(
        &self,
        token: Option<&str>,
        filter: &CompanionFilter,
    ) -> Result<Vec<Companion>, StoreError> {
        self.fetch(library_query(filter), token).await
    }

    async fn find_companion(
        &self,
        token: Option<&str>,
        id: Uuid,
    ) -> Result<Option<Companion>, StoreError> {
        let query = Query::table(Table::Companions)
            .eq("id", id.to_string())
            .limit(1);
        let companions: Vec<Companion> = self.fetch(query, token).await?;
        Ok(companions.into_iter().next())
    }

    async fn list_companions_by_author(
        &self,
        token: Option<&str>,
        author: &str,
    ) -> Result<Vec<Companion>, StoreError> {
        self.fetch(Query::table(Table::Companions).eq("author", author), token)
            .await
    }

    async fn count_companions_by_author(
        &self,
        token: Option<&str>,
        author: &str,
    ) -> Result<usize, StoreError> {
        let query = Query::table(Table::Companions)
            .select(Selection::Columns(vec!["id"]))
            .eq("author", author);
        Ok(self.connection.execute(&query, token).await?.len())
    }

    async fn insert_session(
        &self,
        token: Option<&str>,
        user_id: &str,
        companion_id: Uuid,
    ) -> Result<(), StoreError> {
        let row = to_row(&SessionHistoryEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            companion_id,
            created_at: Utc::now(),
        })?;

        self.connection
            .execute(
                &Query::table(Table::SessionHistory).insert(vec![row], false),
                token,
            )
            .await?;
        Ok(())
    }

    async fn list_session_companions(
        &self,
        token: Option<&str>,
        user_id: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Companion>, StoreError> {
        let mut query =
            Query::table(Table::SessionHistory).select(Selection::Embed(COMPANION_EMBED));
        if let Some(user_id) = user_id {
            query = query.eq("user_id", user_id);
        }

        self.fetch_embedded(query.order("created_at", false).limit(limit), token)
            .await
    }

    async fn insert_bookmark(
        &self,
        token: Option<&str>,
        user_id: &str,
        companion_id: Uuid,
    ) -> Result<bool, StoreError> {
        let existing = Query::table(Table::Bookmarks)
            .select(Selection::Columns(vec!["id"]))
            .eq("companion_id", companion_id.to_string())
            .eq("user_id", user_id)
            .limit(1);
        if !self.connection.execute(&existing, token).await?.is_empty() {
            return Ok(false);
        }

        let row = to_row(&Bookmark {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            companion_id,
            created_at: Utc::now(),
        })?;

        // a concurrent insert may still win the race; the unique constraint settles it
        match self
            .connection
            .execute(&Query::table(Table::Bookmarks).insert(vec![row], false), token)
            .await
        {
            Ok(_) => Ok(true),
            Err(StoreError::Conflict) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_bookmark(
        &self,
        token: Option<&str>,
        user_id: &str,
        companion_id: Uuid,
    ) -> Result<(), StoreError> {
        let query = Query::table(Table::Bookmarks)
            .delete()
            .eq("companion_id", companion_id.to_string())
            .eq("user_id", user_id);
        self.connection.execute(&query, token).await?;
        Ok(())
    }

    async fn list_bookmarked_companions(
        &self,
        token: Option<&str>,
        user_id: &str,
    ) -> Result<Vec<Companion>, StoreError> {
        let query = Query::table(Table::Bookmarks)
            .select(Selection::Embed(COMPANION_EMBED))
            .eq("user_id", user_id);
        self.fetch_embedded(query, token).await
    }
}
