use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::documents::DocumentRecord;
use super::domain::{DocumentId, DriverId, KycStatus, SessionId};
use super::facial::FacialVerificationSession;
use super::machine::VerificationRecord;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Per-driver verification records. Writes are compare-and-swap on `version`.
pub trait VerificationRepository: Send + Sync {
    /// Insert a new record; fails with `Conflict` if the driver already has one.
    fn insert_record(
        &self,
        record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError>;
    /// Replace the stored record if its version still equals `record.version()`.
    fn update_record(
        &self,
        record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError>;
    fn fetch_record(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<VerificationRecord>, RepositoryError>;
    fn records_with_status(
        &self,
        statuses: &[KycStatus],
        limit: usize,
    ) -> Result<Vec<VerificationRecord>, RepositoryError>;
}

/// Uploaded documents, including superseded history.
pub trait DocumentRepository: Send + Sync {
    /// Insert `document` as the primary of its type, superseding the previous primary.
    fn replace_primary_document(
        &self,
        document: DocumentRecord,
        superseded_at: DateTime<Utc>,
    ) -> Result<Option<DocumentRecord>, RepositoryError>;
    fn update_document(&self, document: DocumentRecord)
        -> Result<DocumentRecord, RepositoryError>;
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError>;
    fn documents_for(&self, driver_id: &DriverId) -> Result<Vec<DocumentRecord>, RepositoryError>;
}

pub trait FacialSessionRepository: Send + Sync {
    fn insert_session(
        &self,
        session: FacialVerificationSession,
    ) -> Result<FacialVerificationSession, RepositoryError>;
    fn update_session(
        &self,
        session: FacialVerificationSession,
    ) -> Result<FacialVerificationSession, RepositoryError>;
    fn fetch_session(
        &self,
        id: &SessionId,
    ) -> Result<Option<FacialVerificationSession>, RepositoryError>;
    fn sessions_for(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<FacialVerificationSession>, RepositoryError>;
    /// Sessions still pending or in progress.
    fn open_sessions(&self) -> Result<Vec<FacialVerificationSession>, RepositoryError>;
}

/// Everything the KYC service persists.
pub trait KycStore: VerificationRepository + DocumentRepository + FacialSessionRepository {}

impl<T> KycStore for T where
    T: VerificationRepository + DocumentRepository + FacialSessionRepository
{
}

/// Outbound notification hook (e-mail/SMS service, message bus, ...).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: KycNotification) -> Result<(), NotificationError>;
}

/// Event emitted on every terminal review outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycNotification {
    pub template: String,
    pub driver_id: DriverId,
    pub status: KycStatus,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Authorization collaborator answering whether a caller may review KYC packages.
pub trait ReviewAuthority: Send + Sync {
    fn can_review(&self, reviewer_id: &str) -> bool;
}

/// Reviewers named in configuration.
#[derive(Debug, Clone, Default)]
pub struct AllowListAuthority {
    reviewers: Vec<String>,
}

impl AllowListAuthority {
    pub fn new(reviewers: impl IntoIterator<Item = String>) -> Self {
        Self {
            reviewers: reviewers.into_iter().collect(),
        }
    }
}

impl ReviewAuthority for AllowListAuthority {
    fn can_review(&self, reviewer_id: &str) -> bool {
        self.reviewers.iter().any(|reviewer| reviewer == reviewer_id)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
