//! End-to-end onboarding scenarios driven through the public service facade and HTTP router,
//! with the verification worker draining a real channel queue.

mod common {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use driver_kyc::config::KycConfig;
    use driver_kyc::workflows::kyc::{
        AdapterError, AllowListAuthority, DocumentRecord, DocumentVerdict, FaceVerdict,
        FacialVerificationSession, KycNotification, KycService, MemoryBlobStore, MemoryKycStore,
        NotificationError, NotificationPublisher, VerificationAdapter, VerificationQueue,
    };

    pub(super) const REVIEWER: &str = "reviewer-kemi";

    #[derive(Default)]
    pub(super) struct InboxNotifications {
        sent: Mutex<Vec<KycNotification>>,
    }

    impl InboxNotifications {
        pub(super) fn sent(&self) -> Vec<KycNotification> {
            self.sent.lock().expect("inbox mutex poisoned").clone()
        }
    }

    impl NotificationPublisher for InboxNotifications {
        fn publish(&self, notification: KycNotification) -> Result<(), NotificationError> {
            self.sent
                .lock()
                .expect("inbox mutex poisoned")
                .push(notification);
            Ok(())
        }
    }

    /// Provider that approves every document and matches every face.
    pub(super) struct ApprovingAdapter;

    #[async_trait]
    impl VerificationAdapter for ApprovingAdapter {
        async fn verify_document(
            &self,
            _document: &DocumentRecord,
        ) -> Result<DocumentVerdict, AdapterError> {
            Ok(DocumentVerdict {
                match_score: 90.0,
                passed: true,
            })
        }

        async fn verify_face(
            &self,
            _session: &FacialVerificationSession,
        ) -> Result<FaceVerdict, AdapterError> {
            Ok(FaceVerdict {
                similarity_score: 96.0,
                is_match: true,
            })
        }
    }

    pub(super) type Service = KycService<MemoryKycStore, InboxNotifications>;

    pub(super) fn service(
        store: Arc<MemoryKycStore>,
        notifications: Arc<InboxNotifications>,
        queue: Arc<dyn VerificationQueue>,
    ) -> Service {
        let config = KycConfig {
            reviewers: vec![REVIEWER.to_string()],
            ..KycConfig::default()
        };
        KycService::new(
            store,
            notifications,
            Arc::new(MemoryBlobStore::default()),
            Arc::new(AllowListAuthority::new(config.reviewers.clone())),
            queue,
            config,
        )
    }

    pub(super) fn step_body(step: u8) -> Value {
        match step {
            1 => json!({
                "first_name": "Amaka",
                "last_name": "Eze",
                "date_of_birth": "1988-11-02",
                "phone": "0803 555 0101",
                "email": "amaka.eze@example.com",
                "nin": "98765432109",
                "emergency_contact": {
                    "name": "Obinna Eze",
                    "phone": "0805 555 0202",
                    "relationship": "Brother"
                }
            }),
            2 => json!({
                "address": {
                    "street": "3 Awolowo Road",
                    "city": "Ikoyi",
                    "state": "Lagos",
                    "lga": "Eti-Osa"
                },
                "license": {
                    "number": "abc-98765-xy",
                    "class": "B",
                    "expires_on": "2040-06-30"
                },
                "banking": {
                    "bank_name": "GTBank",
                    "account_number": "0987654321",
                    "account_name": "Amaka Eze"
                }
            }),
            _ => json!({
                "employment": {
                    "status": "employed",
                    "years_driving": 10,
                    "previous_employer": "Metro Logistics"
                },
                "consent": {
                    "terms_accepted": true,
                    "background_check": true,
                    "data_processing": true
                }
            }),
        }
    }

    pub(super) fn jpeg(len: usize) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len, 0x33);
        bytes
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use tokio::sync::watch;
use tower::ServiceExt;

use common::*;
use driver_kyc::workflows::kyc::{
    kyc_router, verification_channel, DocumentVerificationStatus, DriverId, KycStatus,
    MemoryKycStore, RetryPolicy, ReviewDecision, SystemClock, UploadedFile, VerificationWorker,
    REQUIRED_DOCUMENTS,
};

#[tokio::test(start_paused = true)]
async fn driver_is_verified_end_to_end() {
    let store = Arc::new(MemoryKycStore::default());
    let notifications = Arc::new(InboxNotifications::default());
    let (queue, jobs) = verification_channel();
    let service = Arc::new(service(store.clone(), notifications.clone(), Arc::new(queue)));

    let worker = VerificationWorker::new(
        store.clone(),
        Arc::new(ApprovingAdapter),
        RetryPolicy::default(),
        Arc::new(SystemClock),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_task = tokio::spawn(worker.run(jobs, shutdown_rx));

    let driver_id = DriverId("drv-amaka".to_string());
    let app = kyc_router(service.clone());

    for document_type in REQUIRED_DOCUMENTS {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!(
                        "/api/v1/drivers/drv-amaka/documents/{}",
                        document_type.label()
                    ))
                    .header(header::CONTENT_TYPE, "image/jpeg")
                    .body(Body::from(jpeg(8 * 1024)))
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    for step in 1..=3u8 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/api/v1/drivers/drv-amaka/kyc/steps/{step}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(step_body(step).to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK, "step {step}");
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/drivers/drv-amaka/kyc/submit")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    for _ in 0..200 {
        let documents = service.documents(&driver_id).expect("documents");
        if documents
            .iter()
            .all(|doc| doc.verification_status != DocumentVerificationStatus::Pending)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let documents = service.documents(&driver_id).expect("documents");
    assert_eq!(documents.len(), 3);
    assert!(documents
        .iter()
        .all(|doc| doc.verification_status == DocumentVerificationStatus::Approved));

    let approved = service
        .apply_review(REVIEWER, &driver_id, ReviewDecision::Approve, None)
        .expect("approved");
    assert_eq!(approved.status, KycStatus::Completed);

    let sent = notifications.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, "kyc_approved");

    shutdown_tx.send(true).expect("worker listening");
    worker_task.await.expect("worker joins");
}

#[tokio::test]
async fn rejected_driver_can_retry_with_kept_documents() {
    let store = Arc::new(MemoryKycStore::default());
    let notifications = Arc::new(InboxNotifications::default());
    let (queue, _jobs) = verification_channel();
    let service = service(store, notifications.clone(), Arc::new(queue));
    let driver_id = DriverId("drv-retry".to_string());

    for document_type in REQUIRED_DOCUMENTS {
        service
            .upload_document(
                &driver_id,
                document_type,
                UploadedFile::new(jpeg(4096)).with_content_type("image/jpeg"),
            )
            .expect("upload");
    }
    for step in 1..=3u8 {
        service
            .submit_step_json(&driver_id, step, step_body(step))
            .expect("step accepted");
    }
    service.finalize_submission(&driver_id).expect("submitted");

    let rejected = service
        .apply_review(
            REVIEWER,
            &driver_id,
            ReviewDecision::Reject,
            Some("blurry license".to_string()),
        )
        .expect("rejected");
    assert_eq!(rejected.status, KycStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("blurry license"));

    let retried = service.retry(&driver_id).expect("retry");
    assert_eq!(retried.status, KycStatus::Step1);
    assert_eq!(retried.retry_count, 1);

    for step in 1..=3u8 {
        service
            .submit_step_json(&driver_id, step, step_body(step))
            .expect("step accepted again");
    }
    let resubmitted = service.finalize_submission(&driver_id).expect("resubmitted");
    assert_eq!(resubmitted.status, KycStatus::Submitted);

    let sent = notifications.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, "kyc_rejected");
    assert_eq!(
        sent[0].details.get("retries_remaining").map(String::as_str),
        Some("2")
    );
}
