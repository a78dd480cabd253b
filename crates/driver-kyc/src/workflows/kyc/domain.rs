use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the driver owning a KYC record. Issued by the driver registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub String);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Aggregate onboarding status. `Step1`..`Step3` name the most recently completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotStarted,
    #[serde(rename = "step_1")]
    Step1,
    #[serde(rename = "step_2")]
    Step2,
    #[serde(rename = "step_3")]
    Step3,
    Submitted,
    Completed,
    Rejected,
    Expired,
}

impl KycStatus {
    pub const fn label(self) -> &'static str {
        match self {
            KycStatus::NotStarted => "not_started",
            KycStatus::Step1 => "step_1",
            KycStatus::Step2 => "step_2",
            KycStatus::Step3 => "step_3",
            KycStatus::Submitted => "submitted",
            KycStatus::Completed => "completed",
            KycStatus::Rejected => "rejected",
            KycStatus::Expired => "expired",
        }
    }

    /// Step the driver is expected to submit next, if the record is still collecting data.
    pub const fn next_step(self) -> Option<KycStep> {
        match self {
            KycStatus::NotStarted => Some(KycStep::PersonalInfo),
            KycStatus::Step1 => Some(KycStep::AddressLicenseBanking),
            KycStatus::Step2 => Some(KycStep::EmploymentConsent),
            _ => None,
        }
    }

    /// Step that was completed last and may still be corrected in place.
    pub const fn last_completed_step(self) -> Option<KycStep> {
        match self {
            KycStatus::Step1 => Some(KycStep::PersonalInfo),
            KycStatus::Step2 => Some(KycStep::AddressLicenseBanking),
            KycStatus::Step3 => Some(KycStep::EmploymentConsent),
            _ => None,
        }
    }

    /// Edges of the onboarding graph. Self-edges cover idempotent step corrections.
    pub fn can_transition_to(self, next: KycStatus) -> bool {
        use KycStatus::*;
        matches!(
            (self, next),
            (NotStarted, Step1)
                | (Step1, Step1)
                | (Step1, Step2)
                | (Step2, Step2)
                | (Step2, Step3)
                | (Step3, Step3)
                | (Step3, Submitted)
                | (Submitted, Completed)
                | (Submitted, Rejected)
                | (Rejected, Step1)
                | (Step1, Expired)
                | (Step2, Expired)
        )
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three data-collection steps of driver onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStep {
    PersonalInfo,
    AddressLicenseBanking,
    EmploymentConsent,
}

impl KycStep {
    pub const fn ordered() -> [Self; 3] {
        [
            Self::PersonalInfo,
            Self::AddressLicenseBanking,
            Self::EmploymentConsent,
        ]
    }

    pub const fn number(self) -> u8 {
        match self {
            Self::PersonalInfo => 1,
            Self::AddressLicenseBanking => 2,
            Self::EmploymentConsent => 3,
        }
    }

    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::PersonalInfo),
            2 => Some(Self::AddressLicenseBanking),
            3 => Some(Self::EmploymentConsent),
            _ => None,
        }
    }

    /// Status reached once this step has been accepted.
    pub const fn completed_status(self) -> KycStatus {
        match self {
            Self::PersonalInfo => KycStatus::Step1,
            Self::AddressLicenseBanking => KycStatus::Step2,
            Self::EmploymentConsent => KycStatus::Step3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::PersonalInfo => "Personal information & emergency contact",
            Self::AddressLicenseBanking => "Address, license & banking",
            Self::EmploymentConsent => "Employment, documents & consent",
        }
    }
}

/// Kinds of identity documents a driver can upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Nin,
    LicenseFront,
    LicenseBack,
    PassportPhoto,
    ProfilePicture,
    ProofOfAddress,
}

/// Documents that must be on file before step 3 and final submission are accepted.
pub const REQUIRED_DOCUMENTS: [DocumentType; 3] = [
    DocumentType::LicenseFront,
    DocumentType::LicenseBack,
    DocumentType::PassportPhoto,
];

impl DocumentType {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::Nin => "nin",
            DocumentType::LicenseFront => "license_front",
            DocumentType::LicenseBack => "license_back",
            DocumentType::PassportPhoto => "passport_photo",
            DocumentType::ProfilePicture => "profile_picture",
            DocumentType::ProofOfAddress => "proof_of_address",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nin" => Some(DocumentType::Nin),
            "license_front" => Some(DocumentType::LicenseFront),
            "license_back" => Some(DocumentType::LicenseBack),
            "passport_photo" => Some(DocumentType::PassportPhoto),
            "profile_picture" => Some(DocumentType::ProfilePicture),
            "proof_of_address" => Some(DocumentType::ProofOfAddress),
            _ => None,
        }
    }

    /// Photos must be images; scanned papers may also arrive as PDF.
    pub const fn is_photo(self) -> bool {
        matches!(self, DocumentType::PassportPhoto | DocumentType::ProfilePicture)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who caused a transition, recorded in the audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Driver,
    Reviewer(String),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Driver => f.write_str("driver"),
            Actor::Reviewer(id) => write!(f, "reviewer:{id}"),
            Actor::System => f.write_str("system"),
        }
    }
}

/// Outcome emitted by the admin review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}
