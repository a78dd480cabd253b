//! Step payloads in two shapes: loosely-typed drafts accepted at the HTTP boundary, and the
//! validated payloads stored on the verification record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::KycStep;

/// Step 1 input as posted by the onboarding form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfoDraft {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub nin: Option<String>,
    pub emergency_contact: Option<EmergencyContactDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyContactDraft {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub relationship: Option<String>,
}

/// Step 2 input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressLicenseBankingDraft {
    pub address: Option<AddressDraft>,
    pub license: Option<LicenseDraft>,
    pub banking: Option<BankingDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressDraft {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub lga: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseDraft {
    pub number: Option<String>,
    pub class: Option<String>,
    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankingDraft {
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
}

/// Step 3 input. Document uploads are checked against the document store, not the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmploymentConsentDraft {
    pub employment: Option<EmploymentDraft>,
    pub consent: Option<ConsentDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmploymentDraft {
    pub status: Option<EmploymentStatus>,
    pub years_driving: Option<u8>,
    pub previous_employer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentDraft {
    pub terms_accepted: Option<bool>,
    pub background_check: Option<bool>,
    pub data_processing: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Unemployed,
    Student,
}

/// Draft for any step, dispatched on the step number carried by the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDraft {
    PersonalInfo(PersonalInfoDraft),
    AddressLicenseBanking(AddressLicenseBankingDraft),
    EmploymentConsent(EmploymentConsentDraft),
}

impl StepDraft {
    pub fn step(&self) -> KycStep {
        match self {
            StepDraft::PersonalInfo(_) => KycStep::PersonalInfo,
            StepDraft::AddressLicenseBanking(_) => KycStep::AddressLicenseBanking,
            StepDraft::EmploymentConsent(_) => KycStep::EmploymentConsent,
        }
    }

    /// Decode a JSON body for the given step.
    pub fn from_json(step: KycStep, body: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match step {
            KycStep::PersonalInfo => StepDraft::PersonalInfo(serde_json::from_value(body)?),
            KycStep::AddressLicenseBanking => {
                StepDraft::AddressLicenseBanking(serde_json::from_value(body)?)
            }
            KycStep::EmploymentConsent => {
                StepDraft::EmploymentConsent(serde_json::from_value(body)?)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone: String,
    pub email: String,
    pub nin: String,
    pub emergency_contact: EmergencyContact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLicenseBanking {
    pub address: Address,
    pub license: DriverLicense,
    pub banking: BankAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub lga: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverLicense {
    pub number: String,
    pub class: String,
    pub expires_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentConsent {
    pub employment: Employment,
    pub consent: Consent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employment {
    pub status: EmploymentStatus,
    pub years_driving: u8,
    pub previous_employer: Option<String>,
}

/// All three flags are true once validated; kept explicit for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub terms_accepted: bool,
    pub background_check: bool,
    pub data_processing: bool,
}

/// Validated payload stored under its step on the verification record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepPayload {
    PersonalInfo(PersonalInfo),
    AddressLicenseBanking(AddressLicenseBanking),
    EmploymentConsent(EmploymentConsent),
}

impl StepPayload {
    pub fn step(&self) -> KycStep {
        match self {
            StepPayload::PersonalInfo(_) => KycStep::PersonalInfo,
            StepPayload::AddressLicenseBanking(_) => KycStep::AddressLicenseBanking,
            StepPayload::EmploymentConsent(_) => KycStep::EmploymentConsent,
        }
    }
}
