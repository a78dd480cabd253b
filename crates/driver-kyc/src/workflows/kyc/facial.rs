use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::documents::StorageRef;
use super::domain::{DriverId, SessionId};
use super::verification::FaceVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacialSessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
    RequiresManualReview,
}

impl FacialSessionStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(
            self,
            FacialSessionStatus::Pending | FacialSessionStatus::InProgress
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            FacialSessionStatus::Pending => "pending",
            FacialSessionStatus::InProgress => "in_progress",
            FacialSessionStatus::Completed => "completed",
            FacialSessionStatus::Failed => "failed",
            FacialSessionStatus::Expired => "expired",
            FacialSessionStatus::RequiresManualReview => "requires_manual_review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("facial verification session {0} has expired")]
    Expired(SessionId),
    #[error("facial verification session {session_id} is already {state}", state = .status.label())]
    Closed {
        session_id: SessionId,
        status: FacialSessionStatus,
    },
    #[error("facial verification session {0} has no capture yet")]
    AwaitingCapture(SessionId),
}

/// Short-lived selfie capture and match attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialVerificationSession {
    pub session_id: SessionId,
    pub driver_id: DriverId,
    pub status: FacialSessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_match: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_ref: Option<StorageRef>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl FacialVerificationSession {
    pub fn open(driver_id: DriverId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            session_id: SessionId::new(),
            driver_id,
            status: FacialSessionStatus::Pending,
            similarity_score: None,
            is_match: None,
            capture_ref: None,
            created_at: now,
            expires_at: now + ttl,
            completed_at: None,
            version: 0,
        }
    }

    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Expire the session if its TTL has lapsed. Terminal sessions are left alone.
    pub fn expire_if_stale(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || !self.is_past_ttl(now) {
            return false;
        }
        self.status = FacialSessionStatus::Expired;
        self.completed_at = Some(now);
        true
    }

    /// Open sessions still inside their TTL; lapsed ones are expired on the way.
    fn ensure_open(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.expire_if_stale(now) {
            return Err(SessionError::Expired(self.session_id));
        }
        match self.status {
            FacialSessionStatus::Expired => Err(SessionError::Expired(self.session_id)),
            status if status.is_terminal() => Err(SessionError::Closed {
                session_id: self.session_id,
                status,
            }),
            _ => Ok(()),
        }
    }

    /// Only pending sessions inside their TTL take a capture.
    pub fn ensure_capturable(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.ensure_open(now)?;
        if self.status != FacialSessionStatus::Pending {
            return Err(SessionError::Closed {
                session_id: self.session_id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// pending → in_progress once the selfie is stored.
    pub fn attach_capture(
        &mut self,
        capture_ref: StorageRef,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_capturable(now)?;
        self.capture_ref = Some(capture_ref);
        self.status = FacialSessionStatus::InProgress;
        Ok(())
    }

    /// in_progress → completed | failed.
    pub fn apply_verdict(
        &mut self,
        verdict: &FaceVerdict,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_open(now)?;
        if self.status != FacialSessionStatus::InProgress {
            return Err(SessionError::AwaitingCapture(self.session_id));
        }
        self.similarity_score = Some(verdict.similarity_score.clamp(0.0, 100.0));
        self.is_match = Some(verdict.is_match);
        self.status = if verdict.is_match {
            FacialSessionStatus::Completed
        } else {
            FacialSessionStatus::Failed
        };
        self.completed_at = Some(now);
        Ok(())
    }

    /// in_progress → requires_manual_review after the adapter gave up.
    pub fn require_manual_review(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.ensure_open(now)?;
        if self.status != FacialSessionStatus::InProgress {
            return Err(SessionError::AwaitingCapture(self.session_id));
        }
        self.status = FacialSessionStatus::RequiresManualReview;
        self.completed_at = Some(now);
        Ok(())
    }
}
