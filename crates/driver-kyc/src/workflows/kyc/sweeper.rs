use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::repository::{KycStore, NotificationPublisher};
use super::service::KycService;

/// Periodic housekeeping: expires lapsed facial sessions and abandoned early-step records.
pub struct MaintenanceSweeper<S, N> {
    service: Arc<KycService<S, N>>,
    interval: Duration,
}

impl<S, N> MaintenanceSweeper<S, N>
where
    S: KycStore + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(service: Arc<KycService<S, N>>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run sweeps until the shutdown signal is received.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "maintenance sweeper started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.sweep_once();

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("maintenance sweeper stopped");
    }

    /// One pass over sessions and records. Returns `(sessions, records)` expired.
    pub fn sweep_once(&self) -> (usize, usize) {
        let sessions = match self.service.expire_stale_sessions() {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, "facial session sweep failed");
                0
            }
        };
        let records = match self.service.expire_inactive_records() {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, "inactive record sweep failed");
                0
            }
        };

        if sessions > 0 || records > 0 {
            tracing::info!(sessions, records, "maintenance sweep expired stale entries");
        }
        (sessions, records)
    }
}
