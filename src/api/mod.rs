use crate::core::auth::Principal;
use crate::core::errors::ActionError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub mod companions;
pub mod pages;

const X_USER_ID: &str = "X-User-ID";
const X_USER_PLAN: &str = "X-User-Plan";
const X_USER_FEATURES: &str = "X-User-Features";

/// The principal forwarded by the identity edge, if the request is signed in.
#[derive(Debug)]
pub struct ExtractPrincipal(pub Option<Principal>);

impl ExtractPrincipal {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

fn header<'a>(
    headers: &'a HeaderMap,
    name: &str,
) -> Result<Option<&'a str>, (StatusCode, &'static str)> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid identity header")),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ExtractPrincipal
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        let Some(user_id) = parts.headers.get(X_USER_ID) else {
            return Ok(ExtractPrincipal(None));
        };
        let user_id = user_id
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?
            .trim();
        if user_id.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "invalid user id"));
        }

        let mut principal = Principal::new(user_id);

        if let Some(plan) = header(&parts.headers, X_USER_PLAN)?.filter(|p| !p.is_empty()) {
            principal = principal.with_plan(plan);
        }
        if let Some(features) = header(&parts.headers, X_USER_FEATURES)? {
            for feature in features.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                principal = principal.with_feature(feature);
            }
        }
        if let Some(authorization) = header(&parts.headers, AUTHORIZATION.as_str())? {
            if let Some(token) = authorization
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
            {
                principal = principal.with_token(token);
            }
        }

        Ok(ExtractPrincipal(Some(principal)))
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ActionError {
    pub fn status(&self) -> StatusCode {
        match self {
            ActionError::Unauthorized => StatusCode::UNAUTHORIZED,
            ActionError::QuotaExceeded => StatusCode::FORBIDDEN,
            ActionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ActionError::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let message = match &self {
            // store details stay in the logs
            ActionError::Store(_) => "the data store could not complete the request".to_owned(),
            other => other.to_string(),
        };
        (
            self.status(),
            Json(ErrorBody {
                error: self.code(),
                message,
            }),
        )
            .into_response()
    }
}
