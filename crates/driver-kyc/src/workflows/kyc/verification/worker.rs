use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};

use super::outcome::{
    apply_document_verdict, apply_face_verdict, escalate_document, escalate_session,
    OutcomeError,
};
use super::retry::{run_with_retry, RetryPolicy};
use super::{VerificationAdapter, VerificationJob};
use crate::workflows::kyc::domain::{DocumentId, SessionId};
use crate::workflows::kyc::facial::{FacialSessionStatus, SessionError};
use crate::workflows::kyc::repository::{Clock, KycStore};

/// Background consumer of [`VerificationJob`]s.
///
/// Each job runs on its own task so a slow provider never holds up the queue. Failures are
/// retried on the [`RetryPolicy`] schedule; once it is exhausted the document or session is
/// handed to manual review.
pub struct VerificationWorker<S> {
    store: Arc<S>,
    adapter: Arc<dyn VerificationAdapter>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<S> VerificationWorker<S>
where
    S: KycStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        adapter: Arc<dyn VerificationAdapter>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            adapter,
            policy,
            clock,
        }
    }

    /// Drain `jobs` until the channel closes or `shutdown` flips. Jobs already running are
    /// awaited before returning, so no document is dropped part-way through its backoff.
    pub async fn run(
        self,
        mut jobs: mpsc::UnboundedReceiver<VerificationJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let worker = Arc::new(self);
        let mut in_flight = JoinSet::new();
        tracing::info!("verification worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => {
                        let worker = worker.clone();
                        in_flight.spawn(async move { worker.process(job).await });
                    }
                    None => break,
                },
                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_finished(finished);
                }
                _ = shutdown.changed() => break,
            }
        }

        if !in_flight.is_empty() {
            tracing::info!(
                in_flight = in_flight.len(),
                "waiting for in-flight verification jobs"
            );
        }
        while let Some(finished) = in_flight.join_next().await {
            log_finished(finished);
        }

        tracing::info!("verification worker stopped");
    }

    pub async fn process(&self, job: VerificationJob) {
        match job {
            VerificationJob::Document(id) => self.verify_document(id).await,
            VerificationJob::Face(id) => self.verify_face(id).await,
        }
    }

    async fn verify_document(&self, id: DocumentId) {
        let document = match self.store.fetch_document(&id) {
            Ok(Some(document)) if document.awaits_verification() => document,
            Ok(Some(_)) => {
                tracing::debug!(document_id = %id, "document already resolved, skipping");
                return;
            }
            Ok(None) => {
                tracing::warn!(document_id = %id, "queued document no longer exists");
                return;
            }
            Err(err) => {
                tracing::error!(document_id = %id, error = %err, "failed to load queued document");
                return;
            }
        };

        let adapter = self.adapter.as_ref();
        let mut attempts = 0;
        let result = run_with_retry(&self.policy, |attempt| {
            attempts = attempt + 1;
            adapter.verify_document(&document)
        })
        .await;

        let recorded = match result {
            Ok(verdict) => {
                apply_document_verdict(self.store.as_ref(), id, &verdict, self.clock.now())
            }
            Err(err) => {
                tracing::warn!(
                    document_id = %id,
                    attempts,
                    error = %err,
                    "document verification exhausted retries, escalating to manual review"
                );
                let reason =
                    format!("automated verification unavailable after {attempts} attempts");
                escalate_document(self.store.as_ref(), id, &reason)
            }
        };

        match recorded {
            Ok(Some(document)) => tracing::info!(
                document_id = %id,
                driver_id = %document.driver_id,
                document_type = %document.document_type,
                status = document.verification_status.label(),
                "document verification recorded"
            ),
            Ok(None) => {
                tracing::debug!(
                    document_id = %id,
                    "document resolved elsewhere during verification"
                )
            }
            Err(err) => {
                tracing::error!(
                    document_id = %id,
                    error = %err,
                    "failed to record document verification"
                )
            }
        }
    }

    async fn verify_face(&self, id: SessionId) {
        let session = match self.store.fetch_session(&id) {
            Ok(Some(session)) if session.status == FacialSessionStatus::InProgress => session,
            Ok(Some(session)) => {
                tracing::debug!(
                    session_id = %id,
                    status = session.status.label(),
                    "facial session not awaiting a match, skipping"
                );
                return;
            }
            Ok(None) => {
                tracing::warn!(session_id = %id, "queued facial session no longer exists");
                return;
            }
            Err(err) => {
                tracing::error!(
                    session_id = %id,
                    error = %err,
                    "failed to load queued facial session"
                );
                return;
            }
        };

        let adapter = self.adapter.as_ref();
        let result = run_with_retry(&self.policy, |_| adapter.verify_face(&session)).await;

        let now = self.clock.now();
        let recorded = match result {
            Ok(verdict) => apply_face_verdict(self.store.as_ref(), id, &verdict, now),
            Err(err) => {
                tracing::warn!(
                    session_id = %id,
                    error = %err,
                    "face verification exhausted retries, escalating to manual review"
                );
                escalate_session(self.store.as_ref(), id, now)
            }
        };

        match recorded {
            Ok(session) => tracing::info!(
                session_id = %id,
                driver_id = %session.driver_id,
                status = session.status.label(),
                "facial verification recorded"
            ),
            Err(OutcomeError::Session(SessionError::Expired(_))) => {
                tracing::info!(session_id = %id, "facial session expired before the match arrived")
            }
            Err(OutcomeError::Session(err)) => {
                tracing::debug!(session_id = %id, error = %err, "facial session resolved elsewhere")
            }
            Err(err) => {
                tracing::error!(
                    session_id = %id,
                    error = %err,
                    "failed to record facial verification"
                )
            }
        }
    }
}

fn log_finished(finished: Result<(), JoinError>) {
    if let Err(err) = finished {
        tracing::error!(error = %err, "verification job panicked");
    }
}
