//! Unit tests for the principal extractor

use axum::extract::FromRequestParts;
use axum::http::{HeaderValue, Request, StatusCode};
use converso::api::ExtractPrincipal;
use converso::core::auth::{Capability, CompanionQuota};

async fn extract(req: Request<()>) -> Result<ExtractPrincipal, (StatusCode, &'static str)> {
    let (mut parts, _) = req.into_parts();
    ExtractPrincipal::from_request_parts(&mut parts, &()).await
}

#[tokio::test]
async fn test_missing_user_is_anonymous() {
    let req = Request::builder().body(()).unwrap();

    let result = extract(req).await.unwrap();

    assert!(result.principal().is_none());
}

#[tokio::test]
async fn test_extract_full_principal() {
    let req = Request::builder()
        .header("X-User-ID", "user_2abc")
        .header("X-User-Plan", "pro")
        .header("X-User-Features", "3_companion_limit, 10_companion_limit,")
        .header("Authorization", "Bearer data-tier-token")
        .body(())
        .unwrap();

    let result = extract(req).await.unwrap();
    let principal = result.principal().unwrap();

    assert_eq!(principal.id, "user_2abc");
    assert!(principal.has(Capability::Plan("pro")));
    assert!(principal.has(Capability::Feature("3_companion_limit")));
    assert!(principal.has(Capability::Feature("10_companion_limit")));
    assert_eq!(principal.features.len(), 2);
    assert_eq!(principal.token.as_deref(), Some("data-tier-token"));
    assert_eq!(principal.quota(), CompanionQuota::Unlimited);
}

#[tokio::test]
async fn test_plain_user_has_no_quota() {
    let req = Request::builder()
        .header("X-User-ID", "user_2abc")
        .body(())
        .unwrap();

    let result = extract(req).await.unwrap();
    let principal = result.principal().unwrap();

    assert!(principal.plan.is_none());
    assert!(principal.token.is_none());
    assert_eq!(principal.quota(), CompanionQuota::Limited(0));
}

#[tokio::test]
async fn test_non_bearer_authorization_is_ignored() {
    let req = Request::builder()
        .header("X-User-ID", "user_2abc")
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .body(())
        .unwrap();

    let result = extract(req).await.unwrap();

    assert!(result.principal().unwrap().token.is_none());
}

#[tokio::test]
async fn test_empty_user_id_is_rejected() {
    let req = Request::builder()
        .header("X-User-ID", "  ")
        .body(())
        .unwrap();

    let (status, message) = extract(req).await.unwrap_err();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.contains("invalid"));
}

#[tokio::test]
async fn test_invalid_utf8_user_id_is_rejected() {
    let mut req = Request::builder().body(()).unwrap();
    req.headers_mut()
        .insert("X-User-ID", HeaderValue::from_bytes(&[0xFF, 0xFE]).unwrap());

    let result = extract(req).await;

    assert_eq!(result.unwrap_err().0, StatusCode::BAD_REQUEST);
}
