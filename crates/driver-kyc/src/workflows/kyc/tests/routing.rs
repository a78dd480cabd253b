use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::kyc::domain::DocumentType;
use crate::workflows::kyc::router::{kyc_router, REVIEWER_HEADER};

fn router(harness: &Harness) -> Router {
    kyc_router(harness.service.clone())
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

fn upload_request(uri: &str, content_type: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .expect("request builds")
}

fn review_request(driver: &str, reviewer: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/admin/kyc/{driver}/review"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(REVIEWER_HEADER, reviewer)
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn status_of_unknown_driver_is_not_started() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(empty_request(Method::GET, "/api/v1/drivers/drv-http/kyc"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "not_started");
    assert_eq!(body["next_step"], 1);
}

#[tokio::test]
async fn step_submission_returns_snapshot() {
    let harness = harness();
    let body = serde_json::to_value(personal_info_draft()).expect("draft serializes");

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/drivers/drv-http/kyc/steps/1",
            body,
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["step"], 1);
    assert_eq!(body["outcome"], "advanced");
    assert_eq!(body["kyc"]["status"], "step_1");
    assert_eq!(body["kyc"]["next_step"], 2);
}

#[tokio::test]
async fn validation_failure_is_unprocessable_with_issues() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/drivers/drv-http/kyc/steps/1",
            json!({ "first_name": "Chidi" }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "validation_failed");
    let fields: Vec<_> = body["issues"]
        .as_array()
        .expect("issues listed")
        .iter()
        .filter_map(|issue| issue["field"].as_str())
        .collect();
    assert!(fields.contains(&"last_name"));
    assert!(!fields.contains(&"first_name"));
}

#[tokio::test]
async fn out_of_order_step_conflicts() {
    let harness = harness();
    let body = serde_json::to_value(address_license_banking_draft()).expect("draft serializes");

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/drivers/drv-http/kyc/steps/2",
            body,
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "invalid_step_order");
}

#[tokio::test]
async fn unknown_step_is_not_found() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/drivers/drv-http/kyc/steps/7",
            json!({}),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_upload_is_created() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(upload_request(
            "/api/v1/drivers/drv-http/documents/license_front?file_name=front.jpg",
            "image/jpeg",
            jpeg_bytes(4096),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["document_type"], "license_front");
    assert_eq!(body["verification_status"], "pending");
    assert_eq!(body["size_bytes"], 4096);
    assert_eq!(harness.blobs.len(), 1);
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(upload_request(
            "/api/v1/drivers/drv-http/documents/license_front",
            "image/jpeg",
            jpeg_bytes(2 * 1024 * 1024 + 1),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "file_too_large");
}

#[tokio::test]
async fn text_upload_is_unsupported_media_type() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(upload_request(
            "/api/v1/drivers/drv-http/documents/license_back?file_name=license.txt",
            "text/plain",
            b"not an image".to_vec(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn unknown_document_type_is_not_found() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(upload_request(
            "/api/v1/drivers/drv-http/documents/selfie",
            "image/jpeg",
            jpeg_bytes(1024),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(harness.blobs.is_empty());
}

#[tokio::test]
async fn review_requires_an_allowed_reviewer() {
    let harness = harness();
    submitted_driver(&harness, "drv-http-review");

    let response = router(&harness)
        .oneshot(review_request(
            "drv-http-review",
            "mallory",
            json!({ "decision": "approve" }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn rejection_and_retry_over_http() {
    let harness = harness();
    submitted_driver(&harness, "drv-http-retry");

    let response = router(&harness)
        .oneshot(review_request(
            "drv-http-retry",
            REVIEWER,
            json!({ "decision": "reject", "reason": "blurry license" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["rejection_reason"], "blurry license");

    let response = router(&harness)
        .oneshot(empty_request(
            Method::POST,
            "/api/v1/drivers/drv-http-retry/kyc/retry",
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "step_1");
    assert_eq!(body["retry_count"], 1);
}

#[tokio::test]
async fn locked_driver_retry_is_locked() {
    let harness = harness();
    let driver_id = submitted_driver(&harness, "drv-http-locked");
    for round in 1..=3 {
        reject(&harness, &driver_id);
        if round < 3 {
            harness.service.retry(&driver_id).expect("retry allowed");
            for step in 1..=3 {
                harness
                    .service
                    .submit_step(&driver_id, step_draft(step))
                    .expect("step accepted");
            }
            harness
                .service
                .finalize_submission(&driver_id)
                .expect("resubmitted");
        }
    }

    let response = router(&harness)
        .oneshot(empty_request(
            Method::POST,
            "/api/v1/drivers/drv-http-locked/kyc/retry",
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::LOCKED);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "retry_limit_exceeded");
}

#[tokio::test]
async fn finalize_is_accepted_and_listed_for_review() {
    let harness = harness();
    let driver_id = driver("drv-http-final");
    complete_steps(&harness, &driver_id);

    let response = router(&harness)
        .oneshot(empty_request(
            Method::POST,
            "/api/v1/drivers/drv-http-final/kyc/submit",
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = router(&harness)
        .oneshot(empty_request(Method::GET, "/api/v1/admin/kyc/pending?limit=5"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let pending = body.as_array().expect("list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["driver_id"], "drv-http-final");

    let response = router(&harness)
        .oneshot(empty_request(Method::GET, "/api/v1/admin/kyc/drv-http-final"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["documents"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["steps"]["2"]["step"], "address_license_banking");
}

#[tokio::test]
async fn facial_session_flow_and_late_webhook() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(empty_request(
            Method::POST,
            "/api/v1/drivers/drv-http-face/facial-sessions",
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    let session_id = body["session_id"].as_str().expect("session id").to_string();

    let response = router(&harness)
        .oneshot(upload_request(
            &format!("/api/v1/facial-sessions/{session_id}/capture"),
            "image/jpeg",
            jpeg_bytes(2048),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.queue.jobs().len(), 1);

    harness.clock.advance(chrono::Duration::minutes(30));
    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/webhooks/verification/facial-sessions/{session_id}"),
            json!({ "similarity_score": 95.0, "is_match": true }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::GONE);
    let body = read_json_body(response).await;
    assert_eq!(body["code"], "session_expired");
}

#[tokio::test]
async fn document_webhook_records_verdict() {
    let harness = harness();
    let document = harness
        .service
        .upload_document(
            &driver("drv-http-webhook"),
            DocumentType::LicenseBack,
            jpeg_upload(),
        )
        .expect("upload");

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            &format!(
                "/api/v1/webhooks/verification/documents/{}",
                document.document_id
            ),
            json!({ "match_score": 82.0, "passed": true }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["verification_status"], "approved");
    assert_eq!(body["ocr_match_score"], 82.0);
}
