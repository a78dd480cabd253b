use chrono::{DateTime, Utc};

use super::{DocumentVerdict, FaceVerdict};
use crate::workflows::kyc::documents::DocumentRecord;
use crate::workflows::kyc::domain::{DocumentId, SessionId};
use crate::workflows::kyc::facial::{FacialVerificationSession, SessionError};
use crate::workflows::kyc::repository::{
    DocumentRepository, FacialSessionRepository, RepositoryError,
};

/// Re-read attempts when a concurrent writer bumped the version first.
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("facial verification session {0} not found")]
    SessionNotFound(SessionId),
    #[error("gave up after repeated conflicting writes")]
    Contended,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Record an OCR verdict. Returns `None` when the document had already left `pending`.
pub fn apply_document_verdict<S>(
    store: &S,
    id: DocumentId,
    verdict: &DocumentVerdict,
    now: DateTime<Utc>,
) -> Result<Option<DocumentRecord>, OutcomeError>
where
    S: DocumentRepository + ?Sized,
{
    update_document_with(store, id, |document| document.apply_verdict(verdict, now))
}

/// Hand a pending document to manual review with the reason automation gave up.
pub fn escalate_document<S>(
    store: &S,
    id: DocumentId,
    reason: &str,
) -> Result<Option<DocumentRecord>, OutcomeError>
where
    S: DocumentRepository + ?Sized,
{
    update_document_with(store, id, |document| document.require_manual_review(reason))
}

pub fn apply_face_verdict<S>(
    store: &S,
    id: SessionId,
    verdict: &FaceVerdict,
    now: DateTime<Utc>,
) -> Result<FacialVerificationSession, OutcomeError>
where
    S: FacialSessionRepository + ?Sized,
{
    update_session_with(store, id, |session| session.apply_verdict(verdict, now))
}

pub fn escalate_session<S>(
    store: &S,
    id: SessionId,
    now: DateTime<Utc>,
) -> Result<FacialVerificationSession, OutcomeError>
where
    S: FacialSessionRepository + ?Sized,
{
    update_session_with(store, id, |session| session.require_manual_review(now))
}

fn update_document_with<S, F>(
    store: &S,
    id: DocumentId,
    mut change: F,
) -> Result<Option<DocumentRecord>, OutcomeError>
where
    S: DocumentRepository + ?Sized,
    F: FnMut(&mut DocumentRecord) -> bool,
{
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let mut document = store
            .fetch_document(&id)?
            .ok_or(OutcomeError::DocumentNotFound(id))?;
        if !change(&mut document) {
            return Ok(None);
        }
        match store.update_document(document) {
            Ok(stored) => return Ok(Some(stored)),
            Err(RepositoryError::VersionMismatch { .. }) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(OutcomeError::Contended)
}

/// Apply `change` and persist. A change that fails after expiring the session still
/// writes the expired state before reporting the error.
pub(crate) fn update_session_with<S, F>(
    store: &S,
    id: SessionId,
    mut change: F,
) -> Result<FacialVerificationSession, OutcomeError>
where
    S: FacialSessionRepository + ?Sized,
    F: FnMut(&mut FacialVerificationSession) -> Result<(), SessionError>,
{
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let mut session = store
            .fetch_session(&id)?
            .ok_or(OutcomeError::SessionNotFound(id))?;
        let before = session.status;
        let result = change(&mut session);
        if let Err(err) = &result {
            if session.status == before {
                return Err(err.clone().into());
            }
        }

        let stored = match store.update_session(session) {
            Ok(stored) => stored,
            Err(RepositoryError::VersionMismatch { .. }) => continue,
            Err(err) => return Err(err.into()),
        };
        return match result {
            Ok(()) => Ok(stored),
            Err(err) => Err(err.into()),
        };
    }
    Err(OutcomeError::Contended)
}
