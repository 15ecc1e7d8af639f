//! Companion JSON endpoints

use crate::api::{ErrorBody, ExtractPrincipal};
use crate::api::companions::schemas::{
    BookmarkParams, CompanionList, LimitParams, Permissions,
};
use crate::core::errors::ActionError;
use crate::core::traits::{CompanionQuery, CompanionService, DEFAULT_PAGE_SIZE};
use crate::infrastructure::entities::NewCompanion;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use uuid::Uuid;

pub fn router() -> Router {
    Router::new()
        .route("/companions", get(list_companions).post(create_companion))
        .route("/companions/:id", get(get_companion))
        .route("/companions/:id/sessions", post(add_session))
        .route(
            "/companions/:id/bookmark",
            post(add_bookmark).delete(remove_bookmark),
        )
        .route("/sessions/recent", get(recent_sessions))
        .route("/users/:user_id/sessions", get(user_sessions))
        .route("/users/:user_id/companions", get(user_companions))
        .route("/users/:user_id/bookmarks", get(user_bookmarks))
        .route("/permissions/companions", get(companion_permissions))
}

async fn list_companions(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Query(query): Query<CompanionQuery>,
) -> Result<Json<CompanionList>, ActionError> {
    let companions = companion_service
        .get_all_companions(principal.principal(), &query)
        .await?;
    Ok(Json(CompanionList::from(companions)))
}

async fn create_companion(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Json(fields): Json<NewCompanion>,
) -> Result<(StatusCode, Json<schemas::Companion>), ActionError> {
    if !companion_service
        .new_companion_permissions(principal.principal())
        .await?
    {
        return Err(ActionError::QuotaExceeded);
    }

    let companion = companion_service
        .create_companion(principal.principal(), fields)
        .await?;
    Ok((StatusCode::CREATED, Json(companion.into())))
}

async fn get_companion(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Response, ActionError> {
    let companion = companion_service
        .get_companion(principal.principal(), id)
        .await?;

    Ok(match companion {
        Some(companion) => Json(schemas::Companion::from(companion)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "not_found",
                message: format!("companion {id} not found"),
            }),
        )
            .into_response(),
    })
}

async fn add_session(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ActionError> {
    companion_service
        .add_to_session_history(principal.principal(), id)
        .await?;
    Ok(StatusCode::CREATED)
}

async fn add_bookmark(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(id): Path<Uuid>,
    Query(params): Query<BookmarkParams>,
) -> Result<StatusCode, ActionError> {
    companion_service
        .add_bookmark(principal.principal(), id, params.path())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_bookmark(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(id): Path<Uuid>,
    Query(params): Query<BookmarkParams>,
) -> Result<StatusCode, ActionError> {
    companion_service
        .remove_bookmark(principal.principal(), id, params.path())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn recent_sessions(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Query(params): Query<LimitParams>,
) -> Result<Json<CompanionList>, ActionError> {
    let companions = companion_service
        .get_recent_sessions(principal.principal(), params.limit())
        .await?;
    Ok(Json(companions.into()))
}

async fn user_sessions(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(user_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<CompanionList>, ActionError> {
    let companions = companion_service
        .get_user_sessions(principal.principal(), &user_id, params.limit())
        .await?;
    Ok(Json(companions.into()))
}

async fn user_companions(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(user_id): Path<String>,
) -> Result<Json<CompanionList>, ActionError> {
    let companions = companion_service
        .get_user_companions(principal.principal(), &user_id)
        .await?;
    Ok(Json(companions.into()))
}

async fn user_bookmarks(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(user_id): Path<String>,
) -> Result<Json<CompanionList>, ActionError> {
    let companions = companion_service
        .get_bookmarked_companions(principal.principal(), &user_id)
        .await?;
    Ok(Json(companions.into()))
}

async fn companion_permissions(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
) -> Result<Json<Permissions>, ActionError> {
    let allowed = companion_service
        .new_companion_permissions(principal.principal())
        .await?;
    Ok(Json(Permissions { allowed }))
}

pub mod schemas {
    use super::DEFAULT_PAGE_SIZE;
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Serialize, Debug)]
    pub struct Companion {
        pub id: Uuid,
        pub name: String,
        pub subject: String,
        pub topic: String,
        pub voice: Option<String>,
        pub style: Option<String>,
        pub duration: i64,
        pub author: String,
        pub created_at: Option<DateTime<Utc>>,
    }

    impl From<entities::Companion> for Companion {
        fn from(companion: entities::Companion) -> Self {
            Companion {
                id: companion.id,
                name: companion.name,
                subject: companion.subject,
                topic: companion.topic,
                voice: companion.voice,
                style: companion.style,
                duration: companion.duration,
                author: companion.author,
                created_at: companion.created_at,
            }
        }
    }

    #[derive(Serialize, Debug, Default)]
    pub struct CompanionList {
        pub companions: Vec<Companion>,
    }

    impl From<Vec<entities::Companion>> for CompanionList {
        fn from(companions: Vec<entities::Companion>) -> Self {
            CompanionList {
                companions: companions.into_iter().map(Companion::from).collect(),
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct Permissions {
        pub allowed: bool,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct LimitParams {
        pub limit: Option<u32>,
    }

    impl LimitParams {
        pub fn limit(&self) -> u32 {
            self.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
        }
    }

    /// Page to revalidate after a bookmark change.
    #[derive(Deserialize, Debug, Default)]
    pub struct BookmarkParams {
        pub path: Option<String>,
    }

    impl BookmarkParams {
        pub fn path(&self) -> &str {
            self.path.as_deref().unwrap_or("/")
        }
    }
}
