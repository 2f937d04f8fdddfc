// Handler-level tests: error mapping and request parsing
use actix_web::{body::to_bytes, http::StatusCode, test, web, App};
use serde_json::{json, Value};

use super::{configure_services, error_to_response, SharedService};
use crate::store::StoreError;
use crate::testing::TestFixtures;
use crate::webauthn::CeremonyError;

async fn status_and_body(error: &CeremonyError) -> (StatusCode, Value) {
    let response = error_to_response(error);
    let status = response.status();
    let bytes = to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[actix_web::test]
async fn test_policy_errors_are_bad_requests() {
    let (status, body) = status_and_body(&CeremonyError::UnsupportedAlgorithm(-999)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "policy_violation");
    assert_eq!(body["message"], "Unsupported key algorithm. Got \"-999\"");
}

#[actix_web::test]
async fn test_authentication_failures_are_unauthorized() {
    let (status, _) = status_and_body(&CeremonyError::ChallengeMismatch).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = status_and_body(&CeremonyError::UnknownCredential("abc".into())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = status_and_body(&CeremonyError::UnknownCeremony).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_aborted_ceremonies_are_timeouts() {
    let (status, body) = status_and_body(&CeremonyError::TimedOut(60)).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body["error"], "ceremony_aborted");
}

#[actix_web::test]
async fn test_fatal_errors_hide_details() {
    let error = CeremonyError::Store(StoreError::Corrupt("/var/lib/secret/path".into()));
    let (status, body) = status_and_body(&error).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "An internal error occurred");
}

#[actix_web::test]
async fn test_health() {
    let app = test::init_service(App::new().configure(configure_services)).await;
    let req = test::TestRequest::get().uri("/ping").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_start_authentication_rejects_bad_credential_ids() {
    let (service, _store) = TestFixtures::shared_service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::<SharedService>::from(service))
            .configure(configure_services),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/auth/passkey/auth/start")
        .set_json(json!({ "allow_credentials": ["not base64!"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_start_authentication_without_body() {
    let (service, _store) = TestFixtures::shared_service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::<SharedService>::from(service))
            .configure(configure_services),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/auth/passkey/auth/start")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["ceremony_id"].is_string());
    assert!(body["request_options"]["publicKey"]["challenge"].is_string());
    assert!(body["request_options"]["publicKey"]
        .get("allowCredentials")
        .is_none());
}

#[actix_web::test]
async fn test_complete_with_unknown_ceremony() {
    let (service, _store) = TestFixtures::shared_service();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::<SharedService>::from(service))
            .configure(configure_services),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/auth/passkey/register/complete")
        .set_json(json!({
            "ceremony_id": uuid::Uuid::new_v4(),
            "credential": {
                "id": "AAAA",
                "type": "public-key",
                "response": {
                    "clientDataJSON": "e30",
                    "authenticatorData": "AAAA",
                    "publicKey": "AAAA",
                    "publicKeyAlgorithm": -7
                }
            }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
