//! The per-driver verification record and the transitions of the onboarding state machine.
//!
//! `status` is private: every change goes through a method here, is checked against
//! [`KycStatus::can_transition_to`], and leaves an entry in the record's history.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Actor, DriverId, KycStatus, KycStep, ReviewDecision};
use super::steps::StepPayload;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error(
        "step {attempted} cannot be submitted while KYC status is {status} (expected {})",
        expected_label(.expected)
    )]
    InvalidStepOrder {
        status: KycStatus,
        expected: Option<u8>,
        attempted: u8,
    },
    #[error("cannot {action} while KYC status is {status}")]
    InvalidTransition {
        status: KycStatus,
        action: &'static str,
    },
    #[error("retry limit reached after {rejections} rejections; please contact support")]
    RetryLimitExceeded { rejections: u32 },
}

fn expected_label(expected: &Option<u8>) -> String {
    match expected {
        Some(step) => format!("step {step}"),
        None => "no further step submissions".to_string(),
    }
}

/// Audit entry for one status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: KycStatus,
    pub to: KycStatus,
    pub at: DateTime<Utc>,
    pub actor: Actor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Whether an accepted step moved the driver forward or corrected the last step in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Advanced,
    Corrected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    driver_id: DriverId,
    status: KycStatus,
    step_data: BTreeMap<u8, StepPayload>,
    step_completed_at: BTreeMap<u8, DateTime<Utc>>,
    retry_count: u32,
    rejection_count: u32,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_activity_at: DateTime<Utc>,
    history: Vec<TransitionRecord>,
    version: u64,
}

impl VerificationRecord {
    pub fn new(driver_id: DriverId, now: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            status: KycStatus::NotStarted,
            step_data: BTreeMap::new(),
            step_completed_at: BTreeMap::new(),
            retry_count: 0,
            rejection_count: 0,
            rejection_reason: None,
            created_at: now,
            submitted_at: None,
            reviewed_at: None,
            completed_at: None,
            last_activity_at: now,
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn driver_id(&self) -> &DriverId {
        &self.driver_id
    }

    pub fn status(&self) -> KycStatus {
        self.status
    }

    pub fn step_data(&self) -> &BTreeMap<u8, StepPayload> {
        &self.step_data
    }

    pub fn step_completed_at(&self, step: KycStep) -> Option<DateTime<Utc>> {
        self.step_completed_at.get(&step.number()).copied()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn rejection_count(&self) -> u32 {
        self.rejection_count
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Storage backends stamp the revision they persisted.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// A rejected driver who has used up every attempt.
    pub fn is_locked(&self, max_rejections: u32) -> bool {
        self.status == KycStatus::Rejected && self.rejection_count >= max_rejections
    }

    /// Check whether `step` may be submitted now, without mutating the record.
    pub fn check_step(&self, step: KycStep) -> Result<StepOutcome, TransitionError> {
        if let Some(pending) = self.refill_step() {
            if step == pending {
                return Ok(StepOutcome::Advanced);
            }
        } else {
            if self.status.next_step() == Some(step) {
                return Ok(StepOutcome::Advanced);
            }
            if self.status.last_completed_step() == Some(step) {
                return Ok(StepOutcome::Corrected);
            }
        }
        Err(TransitionError::InvalidStepOrder {
            status: self.status,
            expected: self.expected_step().map(KycStep::number),
            attempted: step.number(),
        })
    }

    /// Step the driver should submit next.
    pub fn expected_step(&self) -> Option<KycStep> {
        self.refill_step().or(self.status.next_step())
    }

    /// A retry leaves the record at `step_1` with its data cleared; step 1 comes first again.
    fn refill_step(&self) -> Option<KycStep> {
        self.status
            .last_completed_step()
            .filter(|step| !self.step_data.contains_key(&step.number()))
    }

    /// Store a validated step payload, advancing the status or correcting the last step.
    pub fn submit_step(
        &mut self,
        payload: StepPayload,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, TransitionError> {
        let step = payload.step();
        let outcome = self.check_step(step)?;
        let note = match outcome {
            StepOutcome::Advanced => None,
            StepOutcome::Corrected => Some(format!("step {} corrected", step.number())),
        };

        self.transition(step.completed_status(), now, Actor::Driver, note)?;
        self.step_data.insert(step.number(), payload);
        self.step_completed_at.insert(step.number(), now);
        self.last_activity_at = now;
        Ok(outcome)
    }

    /// Lock in the collected steps and hand the package to review.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != KycStatus::Step3 {
            return Err(TransitionError::InvalidTransition {
                status: self.status,
                action: "finalize submission",
            });
        }

        self.transition(KycStatus::Submitted, now, Actor::Driver, None)?;
        self.submitted_at = Some(now);
        self.last_activity_at = now;
        Ok(())
    }

    pub fn apply_review(
        &mut self,
        decision: ReviewDecision,
        reason: Option<String>,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != KycStatus::Submitted {
            return Err(TransitionError::InvalidTransition {
                status: self.status,
                action: "apply a review decision",
            });
        }

        let actor = Actor::Reviewer(reviewer.to_string());
        let reason = reason
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        match decision {
            ReviewDecision::Approve => {
                self.transition(KycStatus::Completed, now, actor, reason)?;
                self.completed_at = Some(now);
            }
            ReviewDecision::Reject => {
                self.transition(KycStatus::Rejected, now, actor, reason.clone())?;
                self.rejection_reason = reason;
                self.rejection_count += 1;
            }
        }
        self.reviewed_at = Some(now);
        Ok(())
    }

    /// Restart data collection after a rejection. Uploaded documents live elsewhere and are kept.
    pub fn retry(
        &mut self,
        max_rejections: u32,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != KycStatus::Rejected {
            return Err(TransitionError::InvalidTransition {
                status: self.status,
                action: "retry verification",
            });
        }
        if self.rejection_count >= max_rejections {
            return Err(TransitionError::RetryLimitExceeded {
                rejections: self.rejection_count,
            });
        }

        self.transition(KycStatus::Step1, now, Actor::Driver, Some("retry".to_string()))?;
        self.retry_count += 1;
        self.rejection_reason = None;
        self.step_data.clear();
        self.step_completed_at.clear();
        self.submitted_at = None;
        self.reviewed_at = None;
        self.last_activity_at = now;
        Ok(())
    }

    /// Soft-expire a record abandoned part-way through the early steps.
    pub fn expire_if_inactive(&mut self, inactivity_days: u32, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, KycStatus::Step1 | KycStatus::Step2) {
            return false;
        }
        if now - self.last_activity_at < Duration::days(i64::from(inactivity_days)) {
            return false;
        }

        let note = format!("inactive for {inactivity_days} days");
        self.transition(KycStatus::Expired, now, Actor::System, Some(note))
            .is_ok()
    }

    fn transition(
        &mut self,
        to: KycStatus,
        at: DateTime<Utc>,
        actor: Actor,
        note: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                status: self.status,
                action: "change status",
            });
        }

        self.history.push(TransitionRecord {
            from: self.status,
            to,
            at,
            actor,
            note,
        });
        self.status = to;
        Ok(())
    }

    pub fn snapshot(&self, max_rejections: u32) -> KycSnapshot {
        KycSnapshot {
            driver_id: self.driver_id.clone(),
            status: self.status,
            next_step: self.expected_step().map(KycStep::number),
            completed_steps: self.step_completed_at.clone(),
            retry_count: self.retry_count,
            rejection_count: self.rejection_count,
            max_rejections,
            locked: self.is_locked(max_rejections),
            rejection_reason: self.rejection_reason.clone(),
            submitted_at: self.submitted_at,
            reviewed_at: self.reviewed_at,
            completed_at: self.completed_at,
            last_activity_at: Some(self.last_activity_at),
        }
    }
}

/// Driver-facing status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KycSnapshot {
    pub driver_id: DriverId,
    pub status: KycStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<u8>,
    pub completed_steps: BTreeMap<u8, DateTime<Utc>>,
    pub retry_count: u32,
    pub rejection_count: u32,
    pub max_rejections: u32,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl KycSnapshot {
    /// View for a driver who has not submitted anything yet.
    pub fn not_started(driver_id: DriverId, max_rejections: u32) -> Self {
        Self {
            driver_id,
            status: KycStatus::NotStarted,
            next_step: Some(KycStep::PersonalInfo.number()),
            completed_steps: BTreeMap::new(),
            retry_count: 0,
            rejection_count: 0,
            max_rejections,
            locked: false,
            rejection_reason: None,
            submitted_at: None,
            reviewed_at: None,
            completed_at: None,
            last_activity_at: None,
        }
    }
}
