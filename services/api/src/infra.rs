use async_trait::async_trait;
use driver_kyc::workflows::kyc::{
    AdapterError, DocumentRecord, DocumentVerdict, FaceVerdict, FacialVerificationSession,
    KycNotification, NotificationError, NotificationPublisher, VerificationAdapter,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Files smaller than this are treated as too low-resolution to read.
const LEGIBLE_MIN_BYTES: usize = 16 * 1024;
const PASSING_SCORE: f32 = 70.0;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stand-in for the OCR and face-matching provider until a vendor is wired in.
///
/// Scores are deterministic: uploads of at least 16 KiB read cleanly, smaller ones fail OCR,
/// and any stored selfie matches.
#[derive(Debug, Clone)]
pub(crate) struct SimulatedVerificationAdapter {
    latency: Duration,
}

impl SimulatedVerificationAdapter {
    pub(crate) fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn document_score(document: &DocumentRecord) -> f32 {
        if document.size_bytes >= LEGIBLE_MIN_BYTES {
            92.0
        } else {
            48.0
        }
    }
}

impl Default for SimulatedVerificationAdapter {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl VerificationAdapter for SimulatedVerificationAdapter {
    async fn verify_document(
        &self,
        document: &DocumentRecord,
    ) -> Result<DocumentVerdict, AdapterError> {
        tokio::time::sleep(self.latency).await;
        let match_score = Self::document_score(document);
        Ok(DocumentVerdict {
            match_score,
            passed: match_score >= PASSING_SCORE,
        })
    }

    async fn verify_face(
        &self,
        session: &FacialVerificationSession,
    ) -> Result<FaceVerdict, AdapterError> {
        tokio::time::sleep(self.latency).await;
        if session.capture_ref.is_none() {
            return Err(AdapterError::Provider("no capture to compare".to_string()));
        }
        Ok(FaceVerdict {
            similarity_score: 94.0,
            is_match: true,
        })
    }
}

/// Publishes notifications to the log and keeps them for inspection.
#[derive(Default, Clone)]
pub(crate) struct OutboxNotificationPublisher {
    events: Arc<Mutex<Vec<KycNotification>>>,
}

impl NotificationPublisher for OutboxNotificationPublisher {
    fn publish(&self, notification: KycNotification) -> Result<(), NotificationError> {
        tracing::info!(
            template = %notification.template,
            driver_id = %notification.driver_id,
            status = %notification.status,
            "kyc notification published"
        );
        let mut guard = self.events.lock().expect("outbox mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl OutboxNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<KycNotification> {
        self.events.lock().expect("outbox mutex poisoned").clone()
    }
}
