//! Implementations for the service the app needs.
//!

use crate::core::auth::{CompanionQuota, Principal, token_of};
use crate::core::errors::ActionError;
use crate::core::traits::{CompanionQuery, CompanionService, PageCache};
use crate::infrastructure::entities::{Companion, NewCompanion};
use crate::infrastructure::traits::{CompanionFilter, CompanionRepository};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{debug, error, warn};
use uuid::Uuid;

pub const HOME_PATH: &str = "/";
pub const LIBRARY_PATH: &str = "/companions";
pub const JOURNEY_PATH: &str = "/my-journey";

#[injectable(CompanionService)]
pub struct MyCompanionService {
    repo: Ref<dyn CompanionRepository>,
    cache: Ref<dyn PageCache>,
}

impl MyCompanionService {
    pub fn new(repo: Ref<dyn CompanionRepository>, cache: Ref<dyn PageCache>) -> Self {
        MyCompanionService { repo, cache }
    }
}

fn require<'a>(
    principal: Option<&'a Principal>,
    action: &str,
) -> Result<&'a Principal, ActionError> {
    principal.ok_or_else(|| {
        warn!("{action}: user not authenticated");
        ActionError::Unauthorized
    })
}

fn validate(fields: &NewCompanion) -> Result<(), ActionError> {
    for (name, value) in [
        ("name", &fields.name),
        ("subject", &fields.subject),
        ("topic", &fields.topic),
    ] {
        if value.trim().is_empty() {
            return Err(ActionError::InvalidInput(format!("{name} must not be empty")));
        }
    }
    if fields.duration <= 0 {
        return Err(ActionError::InvalidInput(
            "duration must be a positive number of minutes".into(),
        ));
    }
    Ok(())
}

/// Treats blank search terms as absent.
fn term(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl From<&CompanionQuery> for CompanionFilter {
    fn from(query: &CompanionQuery) -> Self {
        let (from, to) = query.range();
        CompanionFilter {
            subject: term(&query.subject),
            topic: term(&query.topic),
            from,
            to,
        }
    }
}

fn logged<T>(action: &str, result: Result<T, impl Into<ActionError>>) -> Result<T, ActionError> {
    result.map_err(|e| {
        let e: ActionError = e.into();
        error!("{action} error: {e}");
        e
    })
}

#[async_trait]
impl CompanionService for MyCompanionService {
    async fn create_companion(
        &self,
        principal: Option<&Principal>,
        fields: NewCompanion,
    ) -> Result<Companion, ActionError> {
        let principal = require(principal, "create_companion")?;
        validate(&fields)?;

        let companion = logged(
            "create_companion",
            self.repo
                .insert_companion(principal.token.as_deref(), &principal.id, fields)
                .await,
        )?;

        self.cache.revalidate(HOME_PATH).await;
        self.cache.revalidate(LIBRARY_PATH).await;
        self.cache.revalidate(JOURNEY_PATH).await;
        Ok(companion)
    }

    async fn get_all_companions(
        &self,
        viewer: Option<&Principal>,
        query: &CompanionQuery,
    ) -> Result<Vec<Companion>, ActionError> {
        let filter = CompanionFilter::from(query);
        debug!("get_all_companions {filter:?}");
        logged(
            "get_all_companions",
            self.repo.list_companions(token_of(viewer), &filter).await,
        )
    }

    async fn get_companion(
        &self,
        viewer: Option<&Principal>,
        id: Uuid,
    ) -> Result<Option<Companion>, ActionError> {
        logged(
            "get_companion",
            self.repo.find_companion(token_of(viewer), id).await,
        )
    }

    async fn add_to_session_history(
        &self,
        principal: Option<&Principal>,
        companion_id: Uuid,
    ) -> Result<(), ActionError> {
        let principal = require(principal, "add_to_session_history")?;

        logged(
            "add_to_session_history",
            self.repo
                .insert_session(principal.token.as_deref(), &principal.id, companion_id)
                .await,
        )?;

        self.cache.revalidate(HOME_PATH).await;
        self.cache.revalidate(JOURNEY_PATH).await;
        Ok(())
    }

    async fn get_recent_sessions(
        &self,
        viewer: Option<&Principal>,
        limit: u32,
    ) -> Result<Vec<Companion>, ActionError> {
        logged(
            "get_recent_sessions",
            self.repo
                .list_session_companions(token_of(viewer), None, u64::from(limit))
                .await,
        )
    }

    async fn get_user_sessions(
        &self,
        viewer: Option<&Principal>,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Companion>, ActionError> {
        logged(
            "get_user_sessions",
            self.repo
                .list_session_companions(token_of(viewer), Some(user_id), u64::from(limit))
                .await,
        )
    }

    async fn get_user_companions(
        &self,
        viewer: Option<&Principal>,
        user_id: &str,
    ) -> Result<Vec<Companion>, ActionError> {
        logged(
            "get_user_companions",
            self.repo
                .list_companions_by_author(token_of(viewer), user_id)
                .await,
        )
    }

    async fn new_companion_permissions(
        &self,
        principal: Option<&Principal>,
    ) -> Result<bool, ActionError> {
        let principal = require(principal, "new_companion_permissions")?;

        let limit = match principal.quota() {
            CompanionQuota::Unlimited => return Ok(true),
            CompanionQuota::Limited(limit) => limit,
        };

        let count = logged(
            "new_companion_permissions",
            self.repo
                .count_companions_by_author(principal.token.as_deref(), &principal.id)
                .await,
        )?;

        debug!("{} has {count} of {limit} companions", principal.id);
        Ok(count < limit)
    }

    async fn add_bookmark(
        &self,
        principal: Option<&Principal>,
        companion_id: Uuid,
        path: &str,
    ) -> Result<(), ActionError> {
        let principal = require(principal, "add_bookmark")?;

        let created = logged(
            "add_bookmark",
            self.repo
                .insert_bookmark(principal.token.as_deref(), &principal.id, companion_id)
                .await,
        )?;
        if !created {
            debug!("{} already bookmarked {companion_id}", principal.id);
        }

        self.cache.revalidate(path).await;
        Ok(())
    }

    async fn remove_bookmark(
        &self,
        principal: Option<&Principal>,
        companion_id: Uuid,
        path: &str,
    ) -> Result<(), ActionError> {
        let principal = require(principal, "remove_bookmark")?;

        logged(
            "remove_bookmark",
            self.repo
                .delete_bookmark(principal.token.as_deref(), &principal.id, companion_id)
                .await,
        )?;

        self.cache.revalidate(path).await;
        Ok(())
    }

    async fn get_bookmarked_companions(
        &self,
        viewer: Option<&Principal>,
        user_id: &str,
    ) -> Result<Vec<Companion>, ActionError> {
        logged(
            "get_bookmarked_companions",
            self.repo
                .list_bookmarked_companions(token_of(viewer), user_id)
                .await,
        )
    }
}
