//! Server-rendered pages

use crate::api::ExtractPrincipal;
use crate::core::auth::Principal;
use crate::core::errors::ActionError;
use crate::core::services::{HOME_PATH, LIBRARY_PATH};
use crate::core::traits::{CompanionQuery, CompanionService, DEFAULT_PAGE_SIZE, PageCache};
use crate::views::{self, LibraryPage, Viewer};
use axum::extract::{Path, Query, RawQuery};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use di_axum::Inject;
use log::error;
use serde::Deserialize;
use uuid::Uuid;

const POPULAR_COUNT: u32 = 3;
const RECENT_COUNT: u32 = 10;

pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/companions", get(library))
        .route("/companions/:id", get(companion))
        .route("/companions/:id/bookmark", post(toggle_bookmark))
        .route("/my-journey", get(my_journey))
}

#[derive(Debug)]
enum PageError {
    Action(ActionError),
    Render(minijinja::Error),
    NotFound,
}

impl From<ActionError> for PageError {
    fn from(e: ActionError) -> Self {
        PageError::Action(e)
    }
}

impl From<minijinja::Error> for PageError {
    fn from(e: minijinja::Error) -> Self {
        PageError::Render(e)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PageError::Action(ActionError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Sign in to see this page.")
            }
            PageError::Action(e @ ActionError::Store(_)) => {
                (e.status(), "Companions could not be loaded right now. Please try again.")
            }
            PageError::Action(e) => (e.status(), "That request could not be completed."),
            PageError::Render(e) => {
                error!("failed to render page: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.")
            }
            PageError::NotFound => (StatusCode::NOT_FOUND, "That companion does not exist."),
        };

        match views::error_page(status.as_u16(), message) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                error!("failed to render error page: {e}");
                (status, message).into_response()
            }
        }
    }
}

/// Template-facing viewer with the bookmark ids that decide card buttons.
async fn viewer(
    companion_service: &dyn CompanionService,
    principal: Option<&Principal>,
) -> Result<Option<Viewer>, PageError> {
    let Some(principal) = principal else {
        return Ok(None);
    };
    let bookmarked = companion_service
        .get_bookmarked_companions(Some(principal), &principal.id)
        .await?;
    Ok(Some(Viewer::new(principal.id.clone(), &bookmarked)))
}

/// Serves `path` from the page cache, rendering and storing it on a miss.
///
/// Only anonymous renderings are cached. A signed-in page carries the
/// viewer's bookmarks, which change without touching the page's own path.
async fn cached<F>(
    cache: &dyn PageCache,
    principal: Option<&Principal>,
    path: &str,
    query: Option<&str>,
    render: F,
) -> Response
where
    F: Future<Output = Result<String, PageError>>,
{
    if principal.is_some() {
        return match render.await {
            Ok(html) => Html(html).into_response(),
            Err(e) => e.into_response(),
        };
    }

    let variant = query.unwrap_or_default();
    if let Some(html) = cache.get(path, variant).await {
        return Html(html).into_response();
    }

    match render.await {
        Ok(html) => {
            cache.put(path, variant, html.clone()).await;
            Html(html).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn home(
    Inject(companion_service): Inject<dyn CompanionService>,
    Inject(cache): Inject<dyn PageCache>,
    principal: ExtractPrincipal,
) -> Response {
    let principal = principal.principal();

    cached(&*cache, principal, HOME_PATH, None, async {
        let viewer = viewer(&*companion_service, principal).await?;
        let popular = companion_service
            .get_all_companions(
                principal,
                &CompanionQuery {
                    limit: Some(POPULAR_COUNT),
                    ..CompanionQuery::default()
                },
            )
            .await?;
        let recent = companion_service
            .get_recent_sessions(principal, RECENT_COUNT)
            .await?;

        Ok::<_, PageError>(views::home(viewer.as_ref(), &popular, &recent)?)
    })
    .await
}

/// Library search parameters as sent by the search form.
#[derive(Deserialize, Debug, Default)]
struct LibraryParams {
    subject: Option<String>,
    topic: Option<String>,
    page: Option<String>,
}

async fn library(
    Inject(companion_service): Inject<dyn CompanionService>,
    Inject(cache): Inject<dyn PageCache>,
    principal: ExtractPrincipal,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<LibraryParams>,
) -> Response {
    let principal = principal.principal();

    cached(&*cache, principal, LIBRARY_PATH, raw_query.as_deref(), async {
        let page = params
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        let query = CompanionQuery {
            limit: Some(DEFAULT_PAGE_SIZE),
            page: Some(page),
            subject: params.subject.clone(),
            topic: params.topic.clone(),
        };

        let viewer = viewer(&*companion_service, principal).await?;
        let companions = companion_service
            .get_all_companions(principal, &query)
            .await?;
        let has_next = companions.len() == DEFAULT_PAGE_SIZE as usize;

        Ok::<_, PageError>(views::library(
            viewer.as_ref(),
            &LibraryPage {
                companions,
                subject: params.subject.clone().unwrap_or_default(),
                topic: params.topic.clone().unwrap_or_default(),
                page,
                has_next,
            },
        )?)
    })
    .await
}

async fn companion(
    Inject(companion_service): Inject<dyn CompanionService>,
    Inject(cache): Inject<dyn PageCache>,
    principal: ExtractPrincipal,
    Path(id): Path<String>,
) -> Response {
    let principal = principal.principal();
    let path = format!("{LIBRARY_PATH}/{id}");

    cached(&*cache, principal, &path, None, async {
        let id = Uuid::parse_str(&id).map_err(|_| PageError::NotFound)?;
        let companion = companion_service
            .get_companion(principal, id)
            .await?
            .ok_or(PageError::NotFound)?;
        let viewer = viewer(&*companion_service, principal).await?;

        Ok::<_, PageError>(views::companion(viewer.as_ref(), &companion)?)
    })
    .await
}

async fn my_journey(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
) -> Response {
    let Some(principal) = principal.principal() else {
        return PageError::Action(ActionError::Unauthorized).into_response();
    };

    let render = async {
        let user_id = principal.id.as_str();
        let companions = companion_service
            .get_user_companions(Some(principal), user_id)
            .await?;
        let sessions = companion_service
            .get_user_sessions(Some(principal), user_id, RECENT_COUNT)
            .await?;
        let bookmarked = companion_service
            .get_bookmarked_companions(Some(principal), user_id)
            .await?;
        let viewer = Viewer::new(user_id, &bookmarked);

        Ok::<_, PageError>(views::my_journey(&viewer, &companions, &sessions, &bookmarked)?)
    };

    match render.await {
        Ok(html) => Html(html).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct BookmarkForm {
    action: String,
    path: Option<String>,
}

/// Only same-site paths are followed after a form post.
fn local_path(path: Option<&str>) -> &str {
    match path {
        Some(p) if p.starts_with('/') && !p.starts_with("//") => p,
        _ => HOME_PATH,
    }
}

async fn toggle_bookmark(
    Inject(companion_service): Inject<dyn CompanionService>,
    principal: ExtractPrincipal,
    Path(id): Path<Uuid>,
    Form(form): Form<BookmarkForm>,
) -> Response {
    let path = local_path(form.path.as_deref());

    let result = match form.action.as_str() {
        "add" => {
            companion_service
                .add_bookmark(principal.principal(), id, path)
                .await
        }
        "remove" => {
            companion_service
                .remove_bookmark(principal.principal(), id, path)
                .await
        }
        other => Err(ActionError::InvalidInput(format!(
            "unknown bookmark action `{other}`"
        ))),
    };

    match result {
        Ok(()) => Redirect::to(path).into_response(),
        Err(e) => PageError::from(e).into_response(),
    }
}
