use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::KycConfig;
use crate::workflows::kyc::documents::UploadedFile;
use crate::workflows::kyc::domain::{DocumentType, DriverId, REQUIRED_DOCUMENTS};
use crate::workflows::kyc::memory::{MemoryBlobStore, MemoryKycStore};
use crate::workflows::kyc::repository::{
    AllowListAuthority, Clock, KycNotification, NotificationError, NotificationPublisher,
};
use crate::workflows::kyc::service::KycService;
use crate::workflows::kyc::steps::{
    AddressDraft, AddressLicenseBankingDraft, BankingDraft, ConsentDraft, EmergencyContactDraft,
    EmploymentConsentDraft, EmploymentDraft, EmploymentStatus, LicenseDraft, PersonalInfoDraft,
    StepDraft,
};
use crate::workflows::kyc::verification::{QueueError, VerificationJob, VerificationQueue};

pub(super) const REVIEWER: &str = "reviewer-ada";

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid start time")
}

pub(super) fn today() -> NaiveDate {
    start_time().date_naive()
}

pub(super) fn driver(id: &str) -> DriverId {
    DriverId(id.to_string())
}

/// Clock that only moves when a test advances it.
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default)]
pub(super) struct RecordingQueue {
    jobs: Mutex<Vec<VerificationJob>>,
}

impl RecordingQueue {
    pub(super) fn jobs(&self) -> Vec<VerificationJob> {
        self.jobs.lock().expect("queue mutex poisoned").clone()
    }
}

impl VerificationQueue for RecordingQueue {
    fn enqueue(&self, job: VerificationJob) -> Result<(), QueueError> {
        self.jobs.lock().expect("queue mutex poisoned").push(job);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifications {
    events: Mutex<Vec<KycNotification>>,
}

impl RecordingNotifications {
    pub(super) fn events(&self) -> Vec<KycNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }
}

impl NotificationPublisher for RecordingNotifications {
    fn publish(&self, notification: KycNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationPublisher for FailingNotifications {
    fn publish(&self, _notification: KycNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay down".to_string()))
    }
}

pub(super) fn kyc_config() -> KycConfig {
    KycConfig {
        reviewers: vec![REVIEWER.to_string()],
        ..KycConfig::default()
    }
}

pub(super) type TestService = KycService<MemoryKycStore, RecordingNotifications>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<MemoryKycStore>,
    pub(super) blobs: Arc<MemoryBlobStore>,
    pub(super) queue: Arc<RecordingQueue>,
    pub(super) notifications: Arc<RecordingNotifications>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn harness() -> Harness {
    harness_with(kyc_config())
}

pub(super) fn harness_with(config: KycConfig) -> Harness {
    let store = Arc::new(MemoryKycStore::default());
    let blobs = Arc::new(MemoryBlobStore::default());
    let queue = Arc::new(RecordingQueue::default());
    let notifications = Arc::new(RecordingNotifications::default());
    let clock = Arc::new(FixedClock::new(start_time()));
    let reviewers = Arc::new(AllowListAuthority::new(config.reviewers.clone()));

    let service = KycService::new(
        store.clone(),
        notifications.clone(),
        blobs.clone(),
        reviewers,
        queue.clone(),
        config,
    )
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        store,
        blobs,
        queue,
        notifications,
        clock,
    }
}

pub(super) fn personal_info_draft() -> PersonalInfoDraft {
    PersonalInfoDraft {
        first_name: Some("Chidi".to_string()),
        middle_name: None,
        last_name: Some("Okafor".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 20),
        phone: Some("+234 803 123 4567".to_string()),
        email: Some("Chidi.Okafor@example.com".to_string()),
        nin: Some("12345678901".to_string()),
        emergency_contact: Some(EmergencyContactDraft {
            name: Some("Ngozi Okafor".to_string()),
            phone: Some("+234 805 987 6543".to_string()),
            relationship: Some("Sister".to_string()),
        }),
    }
}

pub(super) fn address_license_banking_draft() -> AddressLicenseBankingDraft {
    AddressLicenseBankingDraft {
        address: Some(AddressDraft {
            street: Some("14 Adeola Odeku Street".to_string()),
            city: Some("Lagos".to_string()),
            state: Some("Lagos".to_string()),
            lga: Some("Eti-Osa".to_string()),
        }),
        license: Some(LicenseDraft {
            number: Some("lag-123456ab".to_string()),
            class: Some("E".to_string()),
            expires_on: NaiveDate::from_ymd_opt(2029, 1, 31),
        }),
        banking: Some(BankingDraft {
            bank_name: Some("First Bank".to_string()),
            account_number: Some("0123456789".to_string()),
            account_name: Some("Chidi Okafor".to_string()),
        }),
    }
}

pub(super) fn employment_consent_draft() -> EmploymentConsentDraft {
    EmploymentConsentDraft {
        employment: Some(EmploymentDraft {
            status: Some(EmploymentStatus::SelfEmployed),
            years_driving: Some(7),
            previous_employer: Some("Lagos Cabs".to_string()),
        }),
        consent: Some(ConsentDraft {
            terms_accepted: Some(true),
            background_check: Some(true),
            data_processing: Some(true),
        }),
    }
}

pub(super) fn step_draft(step: u8) -> StepDraft {
    match step {
        1 => StepDraft::PersonalInfo(personal_info_draft()),
        2 => StepDraft::AddressLicenseBanking(address_license_banking_draft()),
        3 => StepDraft::EmploymentConsent(employment_consent_draft()),
        other => panic!("no draft for step {other}"),
    }
}

pub(super) fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(len.max(4), 0x11);
    bytes
}

pub(super) fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(len.max(8), 0x22);
    bytes
}

pub(super) fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(len.max(9), b' ');
    bytes
}

pub(super) fn jpeg_upload() -> UploadedFile {
    UploadedFile::new(jpeg_bytes(2048)).with_content_type("image/jpeg")
}

pub(super) fn upload_required_documents(harness: &Harness, driver_id: &DriverId) {
    for document_type in REQUIRED_DOCUMENTS {
        harness
            .service
            .upload_document(driver_id, document_type, jpeg_upload())
            .expect("upload succeeds");
    }
}

/// Upload documents and submit all three steps.
pub(super) fn complete_steps(harness: &Harness, driver_id: &DriverId) {
    upload_required_documents(harness, driver_id);
    for step in 1..=3 {
        harness
            .service
            .submit_step(driver_id, step_draft(step))
            .expect("step accepted");
    }
}

/// Drive a record all the way to `submitted`.
pub(super) fn submitted_driver(harness: &Harness, id: &str) -> DriverId {
    let driver_id = driver(id);
    complete_steps(harness, &driver_id);
    harness
        .service
        .finalize_submission(&driver_id)
        .expect("submission finalized");
    driver_id
}

pub(super) fn reject(harness: &Harness, driver_id: &DriverId) {
    harness
        .service
        .apply_review(
            REVIEWER,
            driver_id,
            crate::workflows::kyc::domain::ReviewDecision::Reject,
            Some("license photo unreadable".to_string()),
        )
        .expect("rejection recorded");
}

pub(super) fn fast_policy() -> crate::workflows::kyc::verification::RetryPolicy {
    crate::workflows::kyc::verification::RetryPolicy {
        timeout: Duration::from_secs(30),
        backoff: vec![Duration::from_secs(5), Duration::from_secs(20)],
    }
}

pub(super) fn document_type_labels(types: &[DocumentType]) -> Vec<&'static str> {
    types.iter().map(|document_type| document_type.label()).collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json body")
}
