use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::documents::{
    inspect_capture, inspect_upload, storage_key, BlobError, BlobStore, DocumentError,
    DocumentRecord, DocumentVerificationStatus, StorageRef, UploadedFile,
};
use super::domain::{
    DocumentId, DocumentType, DriverId, KycStatus, KycStep, ReviewDecision, SessionId,
};
use super::facial::{FacialVerificationSession, SessionError};
use super::machine::{
    KycSnapshot, StepOutcome, TransitionError, TransitionRecord, VerificationRecord,
};
use super::repository::{
    Clock, KycNotification, KycStore, NotificationPublisher, RepositoryError, ReviewAuthority,
    SystemClock,
};
use super::steps::{StepDraft, StepPayload};
use super::validation::{missing_documents, StepValidationError, StepValidator};
use super::verification::{
    apply_document_verdict, apply_face_verdict, escalate_document, update_session_with,
    DocumentVerdict, FaceVerdict, OutcomeError, QueueError, VerificationJob, VerificationQueue,
};
use crate::config::KycConfig;

/// Fallback when the configured session TTL does not fit a chrono duration.
const FALLBACK_SESSION_TTL_MINUTES: i64 = 15;
const QUEUE_UNAVAILABLE_REASON: &str = "verification queue unavailable";

/// Error raised by the KYC service.
#[derive(Debug, thiserror::Error)]
pub enum KycServiceError {
    #[error(transparent)]
    Validation(#[from] StepValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("the KYC record was modified concurrently; reload and try again")]
    ConcurrentModification,
    #[error("{0} is not authorized to review KYC submissions")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unknown KYC step {0}; steps are numbered 1 to 3")]
    UnknownStep(u8),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl From<RepositoryError> for KycServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionMismatch { .. } | RepositoryError::Conflict => {
                Self::ConcurrentModification
            }
            RepositoryError::NotFound => Self::NotFound("record".to_string()),
            other => Self::Repository(other),
        }
    }
}

impl From<OutcomeError> for KycServiceError {
    fn from(value: OutcomeError) -> Self {
        match value {
            OutcomeError::DocumentNotFound(id) => Self::NotFound(format!("document {id}")),
            OutcomeError::SessionNotFound(id) => {
                Self::NotFound(format!("facial verification session {id}"))
            }
            OutcomeError::Contended => Self::ConcurrentModification,
            OutcomeError::Session(err) => Self::Session(err),
            OutcomeError::Repository(err) => err.into(),
        }
    }
}

/// Result of an accepted step submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReceipt {
    pub step: u8,
    pub outcome: StepOutcome,
    pub kyc: KycSnapshot,
}

/// Everything an admin reviewer needs to decide on a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPackage {
    pub kyc: KycSnapshot,
    pub steps: BTreeMap<u8, StepPayload>,
    pub history: Vec<TransitionRecord>,
    pub documents: Vec<DocumentRecord>,
    pub missing_documents: Vec<DocumentType>,
    pub facial_sessions: Vec<FacialVerificationSession>,
}

/// Service composing the state machine, document store, verification queue, and review gate.
pub struct KycService<S, N> {
    store: Arc<S>,
    notifications: Arc<N>,
    blobs: Arc<dyn BlobStore>,
    reviewers: Arc<dyn ReviewAuthority>,
    queue: Arc<dyn VerificationQueue>,
    clock: Arc<dyn Clock>,
    validator: StepValidator,
    config: KycConfig,
}

impl<S, N> KycService<S, N>
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifications: Arc<N>,
        blobs: Arc<dyn BlobStore>,
        reviewers: Arc<dyn ReviewAuthority>,
        queue: Arc<dyn VerificationQueue>,
        config: KycConfig,
    ) -> Self {
        Self {
            store,
            notifications,
            blobs,
            reviewers,
            queue,
            clock: Arc::new(SystemClock),
            validator: StepValidator::default(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &KycConfig {
        &self.config
    }

    /// Decode a JSON body for step `step` and submit it.
    pub fn submit_step_json(
        &self,
        driver_id: &DriverId,
        step: u8,
        body: serde_json::Value,
    ) -> Result<StepReceipt, KycServiceError> {
        let step = KycStep::from_number(step).ok_or(KycServiceError::UnknownStep(step))?;
        let draft = StepDraft::from_json(step, body)
            .map_err(|err| StepValidationError::malformed(step, err.to_string()))?;
        self.submit_step(driver_id, draft)
    }

    /// Validate and persist one onboarding step.
    ///
    /// The record is created lazily on the first step. Resubmitting the most recently completed
    /// step corrects it in place; any other out-of-order step fails with `InvalidStepOrder`.
    pub fn submit_step(
        &self,
        driver_id: &DriverId,
        draft: StepDraft,
    ) -> Result<StepReceipt, KycServiceError> {
        let now = self.clock.now();
        let step = draft.step();
        let existing = self.store.fetch_record(driver_id)?;
        let is_new = existing.is_none();
        let mut record = match existing {
            Some(record) => self.expire_lazily(record, now)?,
            None => VerificationRecord::new(driver_id.clone(), now),
        };

        record.check_step(step)?;

        let on_file = if step == KycStep::EmploymentConsent {
            self.primary_document_types(driver_id)?
        } else {
            Vec::new()
        };
        let payload = self
            .validator
            .validate(draft, now.date_naive(), &on_file)?;
        let outcome = record.submit_step(payload, now)?;

        let stored = if is_new {
            self.store.insert_record(record)?
        } else {
            self.store.update_record(record)?
        };

        tracing::info!(
            driver_id = %driver_id,
            step = step.number(),
            ?outcome,
            status = %stored.status(),
            "kyc step accepted"
        );

        Ok(StepReceipt {
            step: step.number(),
            outcome,
            kyc: stored.snapshot(self.config.max_rejections),
        })
    }

    /// Move a fully collected record to `submitted` and queue verification of its documents.
    pub fn finalize_submission(
        &self,
        driver_id: &DriverId,
    ) -> Result<KycSnapshot, KycServiceError> {
        let now = self.clock.now();
        let mut record = self.store.fetch_record(driver_id)?.ok_or(
            TransitionError::InvalidTransition {
                status: KycStatus::NotStarted,
                action: "finalize submission",
            },
        )?;

        record.finalize(now)?;

        let documents = self.primary_documents(driver_id)?;
        let on_file: Vec<_> = documents.iter().map(|doc| doc.document_type).collect();
        let missing = missing_documents(&on_file);
        if !missing.is_empty() {
            return Err(
                StepValidationError::missing_documents(KycStep::EmploymentConsent, &missing)
                    .into(),
            );
        }

        let stored = self.store.update_record(record)?;

        let queued = documents
            .iter()
            .filter(|doc| doc.verification_status == DocumentVerificationStatus::Pending)
            .filter(|doc| self.queue_document_verification(doc))
            .count();

        tracing::info!(driver_id = %driver_id, queued, "kyc submission finalized");
        Ok(stored.snapshot(self.config.max_rejections))
    }

    /// Record an admin decision on a submitted record and notify the driver.
    pub fn apply_review(
        &self,
        reviewer_id: &str,
        driver_id: &DriverId,
        decision: ReviewDecision,
        reason: Option<String>,
    ) -> Result<KycSnapshot, KycServiceError> {
        if !self.reviewers.can_review(reviewer_id) {
            tracing::warn!(reviewer_id, driver_id = %driver_id, "unauthorized review attempt");
            return Err(KycServiceError::Unauthorized(reviewer_id.to_string()));
        }

        let now = self.clock.now();
        let mut record = self.fetch_existing(driver_id)?;
        record.apply_review(decision, reason, reviewer_id, now)?;
        let stored = self.store.update_record(record)?;

        tracing::info!(
            driver_id = %driver_id,
            reviewer_id,
            ?decision,
            rejection_count = stored.rejection_count(),
            "kyc review recorded"
        );
        self.notify(&stored, reviewer_id);

        Ok(stored.snapshot(self.config.max_rejections))
    }

    /// Reopen a rejected record at step 1 while retries remain.
    pub fn retry(&self, driver_id: &DriverId) -> Result<KycSnapshot, KycServiceError> {
        let now = self.clock.now();
        let mut record = self.fetch_existing(driver_id)?;
        record.retry(self.config.max_rejections, now)?;
        let stored = self.store.update_record(record)?;

        tracing::info!(
            driver_id = %driver_id,
            retry_count = stored.retry_count(),
            "kyc verification restarted"
        );
        Ok(stored.snapshot(self.config.max_rejections))
    }

    /// Current status; drivers without a record report `not_started`.
    pub fn status(&self, driver_id: &DriverId) -> Result<KycSnapshot, KycServiceError> {
        Ok(match self.store.fetch_record(driver_id)? {
            Some(record) => record.snapshot(self.config.max_rejections),
            None => KycSnapshot::not_started(driver_id.clone(), self.config.max_rejections),
        })
    }

    pub fn review_package(&self, driver_id: &DriverId) -> Result<ReviewPackage, KycServiceError> {
        let record = self.fetch_existing(driver_id)?;
        let documents = self.primary_documents(driver_id)?;
        let on_file: Vec<_> = documents.iter().map(|doc| doc.document_type).collect();
        let facial_sessions = self.store.sessions_for(driver_id)?;

        Ok(ReviewPackage {
            kyc: record.snapshot(self.config.max_rejections),
            steps: record.step_data().clone(),
            history: record.history().to_vec(),
            missing_documents: missing_documents(&on_file),
            documents,
            facial_sessions,
        })
    }

    /// Submissions awaiting a decision, oldest first.
    pub fn pending_reviews(&self, limit: usize) -> Result<Vec<KycSnapshot>, KycServiceError> {
        Ok(self
            .store
            .records_with_status(&[KycStatus::Submitted], limit)?
            .iter()
            .map(|record| record.snapshot(self.config.max_rejections))
            .collect())
    }

    /// Store an upload as the driver's primary document of its type.
    pub fn upload_document(
        &self,
        driver_id: &DriverId,
        document_type: DocumentType,
        file: UploadedFile,
    ) -> Result<DocumentRecord, KycServiceError> {
        let content_type = inspect_upload(document_type, &file, self.config.max_upload_bytes)?;
        let now = self.clock.now();
        let document_id = DocumentId::new();
        let storage_ref = self.blobs.put(
            &storage_key(driver_id, document_type, document_id),
            &content_type,
            &file.bytes,
        )?;

        let document = DocumentRecord {
            document_id,
            driver_id: driver_id.clone(),
            document_type,
            storage_ref,
            content_type: content_type.essence_str().to_string(),
            size_bytes: file.bytes.len(),
            verification_status: DocumentVerificationStatus::Pending,
            ocr_match_score: None,
            verified_at: None,
            rejection_reason: None,
            uploaded_at: now,
            superseded_at: None,
            version: 0,
        };

        let superseded = self.store.replace_primary_document(document, now)?;
        tracing::info!(
            driver_id = %driver_id,
            document_id = %document_id,
            %document_type,
            size_bytes = file.bytes.len(),
            superseded = ?superseded.as_ref().map(|doc| doc.document_id),
            "kyc document uploaded"
        );

        let stored = self.fetch_document(document_id)?;
        let under_review = self
            .store
            .fetch_record(driver_id)?
            .is_some_and(|record| {
                matches!(record.status(), KycStatus::Submitted | KycStatus::Completed)
            });
        if under_review && !self.queue_document_verification(&stored) {
            return self.fetch_document(document_id);
        }
        Ok(stored)
    }

    /// Queue OCR for a document. A queue that refuses the job sends the document to manual
    /// review instead.
    fn queue_document_verification(&self, document: &DocumentRecord) -> bool {
        let Err(err) = self
            .queue
            .enqueue(VerificationJob::Document(document.document_id))
        else {
            return true;
        };

        tracing::warn!(
            driver_id = %document.driver_id,
            document_id = %document.document_id,
            error = %err,
            "failed to queue document verification, escalating to manual review"
        );
        if let Err(err) = escalate_document(
            self.store.as_ref(),
            document.document_id,
            QUEUE_UNAVAILABLE_REASON,
        ) {
            tracing::error!(
                document_id = %document.document_id,
                error = %err,
                "failed to escalate unqueued document"
            );
        }
        false
    }

    fn fetch_document(&self, document_id: DocumentId) -> Result<DocumentRecord, KycServiceError> {
        self.store
            .fetch_document(&document_id)?
            .ok_or_else(|| KycServiceError::NotFound(format!("document {document_id}")))
    }

    /// Every upload for the driver, superseded history included.
    pub fn documents(&self, driver_id: &DriverId) -> Result<Vec<DocumentRecord>, KycServiceError> {
        Ok(self.store.documents_for(driver_id)?)
    }

    pub fn begin_facial_session(
        &self,
        driver_id: &DriverId,
    ) -> Result<FacialVerificationSession, KycServiceError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.config.facial_session_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(FALLBACK_SESSION_TTL_MINUTES));
        let session = self
            .store
            .insert_session(FacialVerificationSession::open(driver_id.clone(), now, ttl))?;

        tracing::info!(
            driver_id = %driver_id,
            session_id = %session.session_id,
            expires_at = %session.expires_at,
            "facial verification session opened"
        );
        Ok(session)
    }

    /// Store the selfie for a pending session and queue the face match.
    pub fn submit_face_capture(
        &self,
        session_id: SessionId,
        file: UploadedFile,
    ) -> Result<FacialVerificationSession, KycServiceError> {
        let content_type = inspect_capture(&file, self.config.max_upload_bytes)?;
        let now = self.clock.now();
        let session = self
            .store
            .fetch_session(&session_id)?
            .ok_or_else(|| {
                KycServiceError::NotFound(format!("facial verification session {session_id}"))
            })?;

        if session.clone().ensure_capturable(now).is_err() {
            // Persists the expiry of a lapsed session before reporting it.
            update_session_with(self.store.as_ref(), session_id, |session| {
                session.ensure_capturable(now)
            })?;
        }

        let key = format!("kyc/{}/facial/{}", session.driver_id, session_id);
        let capture_ref: StorageRef = self.blobs.put(&key, &content_type, &file.bytes)?;
        let stored = update_session_with(self.store.as_ref(), session_id, |session| {
            session.attach_capture(capture_ref.clone(), now)
        })?;

        self.queue.enqueue(VerificationJob::Face(session_id))?;
        tracing::info!(
            driver_id = %stored.driver_id,
            session_id = %session_id,
            "face capture received, match queued"
        );
        Ok(stored)
    }

    /// Webhook entry for an OCR verdict. Documents already resolved are returned unchanged.
    pub fn record_document_result(
        &self,
        document_id: DocumentId,
        verdict: DocumentVerdict,
    ) -> Result<DocumentRecord, KycServiceError> {
        let now = self.clock.now();
        match apply_document_verdict(self.store.as_ref(), document_id, &verdict, now)? {
            Some(document) => {
                tracing::info!(
                    document_id = %document_id,
                    status = document.verification_status.label(),
                    "document verdict recorded"
                );
                Ok(document)
            }
            None => {
                tracing::debug!(
                    document_id = %document_id,
                    "ignoring verdict for resolved document"
                );
                self.fetch_document(document_id)
            }
        }
    }

    /// Webhook entry for a face-match verdict. Late results for lapsed sessions fail with
    /// `SessionError::Expired` and leave the session expired.
    pub fn record_face_result(
        &self,
        session_id: SessionId,
        verdict: FaceVerdict,
    ) -> Result<FacialVerificationSession, KycServiceError> {
        let now = self.clock.now();
        let session = apply_face_verdict(self.store.as_ref(), session_id, &verdict, now)?;
        tracing::info!(
            session_id = %session_id,
            status = session.status.label(),
            "face verdict recorded"
        );
        Ok(session)
    }

    /// Expire every open session past its TTL. Returns how many were expired.
    pub fn expire_stale_sessions(&self) -> Result<usize, KycServiceError> {
        let now = self.clock.now();
        let mut expired = 0;
        for session in self.store.open_sessions()? {
            if !session.is_past_ttl(now) {
                continue;
            }
            let result = update_session_with(self.store.as_ref(), session.session_id, |session| {
                if session.expire_if_stale(now) {
                    Ok(())
                } else {
                    Err(SessionError::Closed {
                        session_id: session.session_id,
                        status: session.status,
                    })
                }
            });
            match result {
                Ok(_) => expired += 1,
                Err(OutcomeError::Session(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(expired)
    }

    /// Expire records abandoned at step 1 or 2. Returns how many were expired.
    pub fn expire_inactive_records(&self) -> Result<usize, KycServiceError> {
        let now = self.clock.now();
        let candidates = self
            .store
            .records_with_status(&[KycStatus::Step1, KycStatus::Step2], usize::MAX)?;

        let mut expired = 0;
        for mut record in candidates {
            if !record.expire_if_inactive(self.config.inactivity_expiry_days, now) {
                continue;
            }
            match self.store.update_record(record) {
                Ok(stored) => {
                    expired += 1;
                    tracing::info!(driver_id = %stored.driver_id(), "inactive kyc record expired");
                }
                Err(RepositoryError::VersionMismatch { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(expired)
    }

    fn fetch_existing(&self, driver_id: &DriverId) -> Result<VerificationRecord, KycServiceError> {
        self.store
            .fetch_record(driver_id)?
            .ok_or_else(|| KycServiceError::NotFound(format!("kyc record for driver {driver_id}")))
    }

    /// Expire an abandoned record on access so the caller sees the terminal state.
    fn expire_lazily(
        &self,
        mut record: VerificationRecord,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, KycServiceError> {
        if record.expire_if_inactive(self.config.inactivity_expiry_days, now) {
            tracing::info!(
                driver_id = %record.driver_id(),
                "inactive kyc record expired on access"
            );
            return Ok(self.store.update_record(record)?);
        }
        Ok(record)
    }

    fn primary_documents(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<DocumentRecord>, KycServiceError> {
        Ok(self
            .store
            .documents_for(driver_id)?
            .into_iter()
            .filter(DocumentRecord::is_primary)
            .collect())
    }

    fn primary_document_types(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<DocumentType>, KycServiceError> {
        Ok(self
            .primary_documents(driver_id)?
            .iter()
            .map(|document| document.document_type)
            .collect())
    }

    fn notify(&self, record: &VerificationRecord, reviewer_id: &str) {
        let template = match record.status() {
            KycStatus::Completed => "kyc_approved",
            KycStatus::Rejected => "kyc_rejected",
            _ => return,
        };

        let mut details = BTreeMap::new();
        details.insert("reviewer_id".to_string(), reviewer_id.to_string());
        if let Some(reason) = record.rejection_reason() {
            details.insert("reason".to_string(), reason.to_string());
        }
        if record.status() == KycStatus::Rejected {
            let remaining = self
                .config
                .max_rejections
                .saturating_sub(record.rejection_count());
            details.insert("retries_remaining".to_string(), remaining.to_string());
        }

        let notification = KycNotification {
            template: template.to_string(),
            driver_id: record.driver_id().clone(),
            status: record.status(),
            details,
        };
        if let Err(err) = self.notifications.publish(notification) {
            tracing::warn!(
                driver_id = %record.driver_id(),
                template,
                error = %err,
                "kyc notification not delivered"
            );
        }
    }
}
