use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::documents::{DocumentError, UploadedFile};
use super::domain::{DocumentId, DocumentType, DriverId, ReviewDecision, SessionId};
use super::facial::SessionError;
use super::machine::TransitionError;
use super::repository::{KycStore, NotificationPublisher};
use super::service::{KycService, KycServiceError};
use super::verification::{DocumentVerdict, FaceVerdict};

/// Header carrying the caller's reviewer identity on admin routes.
pub const REVIEWER_HEADER: &str = "x-reviewer-id";

const DEFAULT_PENDING_LIMIT: usize = 50;
/// Headroom above the upload limit so slightly oversized files reach the size check.
const UPLOAD_BODY_SLACK: usize = 64 * 1024;

/// Router builder exposing the driver, webhook, and admin KYC endpoints.
pub fn kyc_router<S, N>(service: Arc<KycService<S, N>>) -> Router
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    let body_limit = service.config().max_upload_bytes + UPLOAD_BODY_SLACK;

    Router::new()
        .route("/api/v1/drivers/:driver_id/kyc", get(status_handler::<S, N>))
        .route(
            "/api/v1/drivers/:driver_id/kyc/steps/:step",
            post(submit_step_handler::<S, N>),
        )
        .route(
            "/api/v1/drivers/:driver_id/kyc/submit",
            post(finalize_handler::<S, N>),
        )
        .route(
            "/api/v1/drivers/:driver_id/kyc/retry",
            post(retry_handler::<S, N>),
        )
        .route(
            "/api/v1/drivers/:driver_id/documents",
            get(documents_handler::<S, N>),
        )
        .route(
            "/api/v1/drivers/:driver_id/documents/:document_type",
            post(upload_handler::<S, N>),
        )
        .route(
            "/api/v1/drivers/:driver_id/facial-sessions",
            post(begin_session_handler::<S, N>),
        )
        .route(
            "/api/v1/facial-sessions/:session_id/capture",
            post(capture_handler::<S, N>),
        )
        .route(
            "/api/v1/webhooks/verification/documents/:document_id",
            post(document_webhook_handler::<S, N>),
        )
        .route(
            "/api/v1/webhooks/verification/facial-sessions/:session_id",
            post(face_webhook_handler::<S, N>),
        )
        .route("/api/v1/admin/kyc/pending", get(pending_handler::<S, N>))
        .route(
            "/api/v1/admin/kyc/:driver_id",
            get(review_package_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/kyc/:driver_id/review",
            post(review_handler::<S, N>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// HTTP status for a service error.
pub fn status_for(error: &KycServiceError) -> StatusCode {
    match error {
        KycServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        KycServiceError::Transition(TransitionError::RetryLimitExceeded { .. }) => {
            StatusCode::LOCKED
        }
        KycServiceError::Transition(_) | KycServiceError::ConcurrentModification => {
            StatusCode::CONFLICT
        }
        KycServiceError::Document(DocumentError::FileTooLarge { .. }) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        KycServiceError::Document(DocumentError::UnsupportedFormat { .. }) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        KycServiceError::Session(SessionError::Expired(_)) => StatusCode::GONE,
        KycServiceError::Session(_) => StatusCode::CONFLICT,
        KycServiceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        KycServiceError::NotFound(_) | KycServiceError::UnknownStep(_) => StatusCode::NOT_FOUND,
        KycServiceError::Repository(_) | KycServiceError::Queue(_) | KycServiceError::Blob(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Stable machine-readable code for a service error.
pub fn error_code(error: &KycServiceError) -> &'static str {
    match error {
        KycServiceError::Validation(_) => "validation_failed",
        KycServiceError::Transition(TransitionError::InvalidStepOrder { .. }) => {
            "invalid_step_order"
        }
        KycServiceError::Transition(TransitionError::InvalidTransition { .. }) => {
            "invalid_transition"
        }
        KycServiceError::Transition(TransitionError::RetryLimitExceeded { .. }) => {
            "retry_limit_exceeded"
        }
        KycServiceError::Document(DocumentError::FileTooLarge { .. }) => "file_too_large",
        KycServiceError::Document(DocumentError::UnsupportedFormat { .. }) => "unsupported_format",
        KycServiceError::Session(SessionError::Expired(_)) => "session_expired",
        KycServiceError::Session(_) => "session_closed",
        KycServiceError::ConcurrentModification => "concurrent_modification",
        KycServiceError::Unauthorized(_) => "unauthorized",
        KycServiceError::NotFound(_) | KycServiceError::UnknownStep(_) => "not_found",
        KycServiceError::Repository(_) | KycServiceError::Queue(_) | KycServiceError::Blob(_) => {
            "internal"
        }
    }
}

pub(crate) fn error_response(error: KycServiceError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "kyc request failed");
    }

    let mut payload = json!({
        "error": error.to_string(),
        "code": error_code(&error),
    });
    if let KycServiceError::Validation(validation) = &error {
        payload["issues"] = json!(validation.issues);
    }
    (status, axum::Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, KycServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

fn uploaded_file(headers: &HeaderMap, file_name: Option<String>, body: Bytes) -> UploadedFile {
    UploadedFile {
        file_name,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        bytes: body.to_vec(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadQuery {
    #[serde(default)]
    pub(crate) file_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PendingQuery {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) decision: ReviewDecision,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

pub(crate) async fn status_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.status(&DriverId(driver_id)))
}

pub(crate) async fn submit_step_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path((driver_id, step)): Path<(String, u8)>,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.submit_step_json(&DriverId(driver_id), step, body),
    )
}

pub(crate) async fn finalize_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::ACCEPTED,
        service.finalize_submission(&DriverId(driver_id)),
    )
}

pub(crate) async fn retry_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.retry(&DriverId(driver_id)))
}

pub(crate) async fn documents_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.documents(&DriverId(driver_id)))
}

pub(crate) async fn upload_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path((driver_id, document_type)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    let Some(document_type) = DocumentType::from_label(&document_type) else {
        let payload = json!({
            "error": format!("unknown document type '{document_type}'"),
            "code": "not_found",
        });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    };

    let file = uploaded_file(&headers, query.file_name, body);
    respond(
        StatusCode::CREATED,
        service.upload_document(&DriverId(driver_id), document_type, file),
    )
}

pub(crate) async fn begin_session_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.begin_facial_session(&DriverId(driver_id)),
    )
}

pub(crate) async fn capture_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    let file = uploaded_file(&headers, query.file_name, body);
    respond(
        StatusCode::ACCEPTED,
        service.submit_face_capture(SessionId(session_id), file),
    )
}

pub(crate) async fn document_webhook_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(document_id): Path<Uuid>,
    axum::Json(verdict): axum::Json<DocumentVerdict>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.record_document_result(DocumentId(document_id), verdict),
    )
}

pub(crate) async fn face_webhook_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(session_id): Path<Uuid>,
    axum::Json(verdict): axum::Json<FaceVerdict>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.record_face_result(SessionId(session_id), verdict),
    )
}

pub(crate) async fn pending_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Query(query): Query<PendingQuery>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    respond(StatusCode::OK, service.pending_reviews(limit))
}

pub(crate) async fn review_package_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.review_package(&DriverId(driver_id)))
}

pub(crate) async fn review_handler<S, N>(
    State(service): State<Arc<KycService<S, N>>>,
    Path(driver_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    let reviewer_id = headers
        .get(REVIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    respond(
        StatusCode::OK,
        service.apply_review(
            reviewer_id,
            &DriverId(driver_id),
            request.decision,
            request.reason,
        ),
    )
}
