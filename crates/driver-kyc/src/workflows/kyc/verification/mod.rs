//! OCR and facial-match verification: the adapter contract, the job queue feeding the
//! background worker, and the code that records results against documents and sessions.

mod outcome;
mod retry;
mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::documents::DocumentRecord;
use super::domain::{DocumentId, SessionId};
use super::facial::FacialVerificationSession;

pub use outcome::{
    apply_document_verdict, apply_face_verdict, escalate_document, escalate_session,
    OutcomeError,
};
pub(crate) use outcome::update_session_with;
pub use retry::{run_with_retry, RetryPolicy};
pub use worker::VerificationWorker;

/// OCR result for a single document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentVerdict {
    pub match_score: f32,
    pub passed: bool,
}

/// Face-match result for a facial verification session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceVerdict {
    pub similarity_score: f32,
    pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("verification provider did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("verification provider error: {0}")]
    Provider(String),
}

/// Remote OCR / facial-matching provider.
#[async_trait]
pub trait VerificationAdapter: Send + Sync {
    async fn verify_document(&self, document: &DocumentRecord)
        -> Result<DocumentVerdict, AdapterError>;
    async fn verify_face(
        &self,
        session: &FacialVerificationSession,
    ) -> Result<FaceVerdict, AdapterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationJob {
    Document(DocumentId),
    Face(SessionId),
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("verification queue is closed")]
    Closed,
}

/// Hand-off point between request handlers and the verification worker.
pub trait VerificationQueue: Send + Sync {
    fn enqueue(&self, job: VerificationJob) -> Result<(), QueueError>;
}

/// Queue backed by an unbounded tokio channel drained by [`VerificationWorker::run`].
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<VerificationJob>,
}

impl VerificationQueue for ChannelQueue {
    fn enqueue(&self, job: VerificationJob) -> Result<(), QueueError> {
        self.sender.send(job).map_err(|_| QueueError::Closed)
    }
}

pub fn verification_channel() -> (ChannelQueue, mpsc::UnboundedReceiver<VerificationJob>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelQueue { sender }, receiver)
}
