//! Driver KYC onboarding: the three-step data collection state machine, document uploads,
//! facial verification sessions, asynchronous OCR/face matching, and the admin review gate.

pub mod audit;
pub mod documents;
pub mod domain;
pub mod facial;
pub mod machine;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod steps;
pub mod sweeper;
pub mod validation;
pub mod verification;

#[cfg(test)]
mod tests;

pub use audit::write_transitions_csv;
pub use documents::{
    BlobError, BlobStore, DocumentError, DocumentRecord, DocumentVerificationStatus, StorageRef,
    UploadedFile,
};
pub use domain::{
    Actor, DocumentId, DocumentType, DriverId, KycStatus, KycStep, ReviewDecision, SessionId,
    REQUIRED_DOCUMENTS,
};
pub use facial::{FacialSessionStatus, FacialVerificationSession, SessionError};
pub use machine::{KycSnapshot, StepOutcome, TransitionError, TransitionRecord, VerificationRecord};
pub use memory::{MemoryBlobStore, MemoryKycStore};
pub use repository::{
    AllowListAuthority, Clock, DocumentRepository, FacialSessionRepository, KycNotification,
    KycStore, NotificationError, NotificationPublisher, RepositoryError, ReviewAuthority,
    SystemClock, VerificationRepository,
};
pub use router::{kyc_router, status_for, REVIEWER_HEADER};
pub use service::{KycService, KycServiceError, ReviewPackage, StepReceipt};
pub use steps::{StepDraft, StepPayload};
pub use sweeper::MaintenanceSweeper;
pub use validation::{FieldIssue, FieldProblem, StepValidationError, StepValidator};
pub use verification::{
    verification_channel, AdapterError, ChannelQueue, DocumentVerdict, FaceVerdict, QueueError,
    RetryPolicy, VerificationAdapter, VerificationJob, VerificationQueue, VerificationWorker,
};
