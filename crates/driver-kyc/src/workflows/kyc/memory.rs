//! In-process store implementations used by the API binary and the test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use mime::Mime;

use super::documents::{BlobError, BlobStore, DocumentRecord, StorageRef};
use super::domain::{DocumentId, DriverId, KycStatus, SessionId};
use super::facial::FacialVerificationSession;
use super::machine::VerificationRecord;
use super::repository::{
    DocumentRepository, FacialSessionRepository, RepositoryError, VerificationRepository,
};

#[derive(Default, Clone)]
pub struct MemoryKycStore {
    records: Arc<Mutex<HashMap<DriverId, VerificationRecord>>>,
    documents: Arc<Mutex<HashMap<DocumentId, DocumentRecord>>>,
    sessions: Arc<Mutex<HashMap<SessionId, FacialVerificationSession>>>,
}

impl MemoryKycStore {
    /// Every record currently held, ordered by driver id.
    pub fn all_records(&self) -> Vec<VerificationRecord> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<_> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.driver_id().cmp(b.driver_id()));
        records
    }
}

impl VerificationRepository for MemoryKycStore {
    fn insert_record(
        &self,
        mut record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(record.driver_id()) {
            return Err(RepositoryError::Conflict);
        }
        record.set_version(1);
        guard.insert(record.driver_id().clone(), record.clone());
        Ok(record)
    }

    fn update_record(
        &self,
        mut record: VerificationRecord,
    ) -> Result<VerificationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard
            .get(record.driver_id())
            .ok_or(RepositoryError::NotFound)?;
        if stored.version() != record.version() {
            return Err(RepositoryError::VersionMismatch {
                expected: record.version(),
                found: stored.version(),
            });
        }
        record.set_version(record.version() + 1);
        guard.insert(record.driver_id().clone(), record.clone());
        Ok(record)
    }

    fn fetch_record(
        &self,
        driver_id: &DriverId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(driver_id).cloned())
    }

    fn records_with_status(
        &self,
        statuses: &[KycStatus],
        limit: usize,
    ) -> Result<Vec<VerificationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut matching: Vec<_> = guard
            .values()
            .filter(|record| statuses.contains(&record.status()))
            .cloned()
            .collect();
        matching.sort_by_key(|record| (record.submitted_at(), record.created_at()));
        matching.truncate(limit);
        Ok(matching)
    }
}

impl DocumentRepository for MemoryKycStore {
    fn replace_primary_document(
        &self,
        mut document: DocumentRecord,
        superseded_at: DateTime<Utc>,
    ) -> Result<Option<DocumentRecord>, RepositoryError> {
        let mut guard = self.documents.lock().expect("document mutex poisoned");
        if guard.contains_key(&document.document_id) {
            return Err(RepositoryError::Conflict);
        }

        let previous = guard.values_mut().find(|existing| {
            existing.driver_id == document.driver_id
                && existing.document_type == document.document_type
                && existing.is_primary()
        });
        let superseded = previous.map(|existing| {
            existing.superseded_at = Some(superseded_at);
            existing.version += 1;
            existing.clone()
        });

        document.version = 1;
        guard.insert(document.document_id, document);
        Ok(superseded)
    }

    fn update_document(
        &self,
        mut document: DocumentRecord,
    ) -> Result<DocumentRecord, RepositoryError> {
        let mut guard = self.documents.lock().expect("document mutex poisoned");
        let stored = guard
            .get(&document.document_id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != document.version {
            return Err(RepositoryError::VersionMismatch {
                expected: document.version,
                found: stored.version,
            });
        }
        document.version += 1;
        guard.insert(document.document_id, document.clone());
        Ok(document)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        let guard = self.documents.lock().expect("document mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn documents_for(&self, driver_id: &DriverId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let guard = self.documents.lock().expect("document mutex poisoned");
        let mut documents: Vec<_> = guard
            .values()
            .filter(|document| &document.driver_id == driver_id)
            .cloned()
            .collect();
        documents.sort_by_key(|document| (document.document_type, document.uploaded_at));
        Ok(documents)
    }
}

impl FacialSessionRepository for MemoryKycStore {
    fn insert_session(
        &self,
        mut session: FacialVerificationSession,
    ) -> Result<FacialVerificationSession, RepositoryError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        if guard.contains_key(&session.session_id) {
            return Err(RepositoryError::Conflict);
        }
        session.version = 1;
        guard.insert(session.session_id, session.clone());
        Ok(session)
    }

    fn update_session(
        &self,
        mut session: FacialVerificationSession,
    ) -> Result<FacialVerificationSession, RepositoryError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        let stored = guard
            .get(&session.session_id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != session.version {
            return Err(RepositoryError::VersionMismatch {
                expected: session.version,
                found: stored.version,
            });
        }
        session.version += 1;
        guard.insert(session.session_id, session.clone());
        Ok(session)
    }

    fn fetch_session(
        &self,
        id: &SessionId,
    ) -> Result<Option<FacialVerificationSession>, RepositoryError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn sessions_for(
        &self,
        driver_id: &DriverId,
    ) -> Result<Vec<FacialVerificationSession>, RepositoryError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        let mut sessions: Vec<_> = guard
            .values()
            .filter(|session| &session.driver_id == driver_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        Ok(sessions)
    }

    fn open_sessions(&self) -> Result<Vec<FacialVerificationSession>, RepositoryError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        Ok(guard
            .values()
            .filter(|session| !session.status.is_terminal())
            .cloned()
            .collect())
    }
}

/// Blob store keeping uploads in memory under `memory://` references.
#[derive(Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, (Mime, Vec<u8>)>>>,
}

impl MemoryBlobStore {
    pub fn get(&self, storage_ref: &StorageRef) -> Option<(Mime, Vec<u8>)> {
        let guard = self.blobs.lock().expect("blob mutex poisoned");
        guard.get(&storage_ref.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().expect("blob mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, content_type: &Mime, bytes: &[u8]) -> Result<StorageRef, BlobError> {
        let storage_ref = StorageRef(format!("memory://{key}"));
        let mut guard = self.blobs.lock().expect("blob mutex poisoned");
        guard.insert(storage_ref.0.clone(), (content_type.clone(), bytes.to_vec()));
        Ok(storage_ref)
    }
}
