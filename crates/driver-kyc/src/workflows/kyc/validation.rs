use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::domain::{DocumentType, KycStep, REQUIRED_DOCUMENTS};
use super::steps::{
    Address, AddressDraft, AddressLicenseBanking, AddressLicenseBankingDraft, BankAccount,
    BankingDraft, Consent, ConsentDraft, DriverLicense, EmergencyContact, EmergencyContactDraft,
    Employment, EmploymentConsent, EmploymentConsentDraft, EmploymentDraft, LicenseDraft,
    PersonalInfo, PersonalInfoDraft, StepDraft, StepPayload,
};

const DEFAULT_MINIMUM_AGE: u32 = 18;
const NIN_DIGITS: usize = 11;
const ACCOUNT_NUMBER_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FieldProblem {
    Missing,
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: FieldProblem,
}

/// Missing or malformed fields in a step payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step {step} failed validation: {}", summarize(.issues))]
pub struct StepValidationError {
    pub step: u8,
    pub issues: Vec<FieldIssue>,
}

impl StepValidationError {
    pub fn malformed(step: KycStep, detail: impl Into<String>) -> Self {
        Self {
            step: step.number(),
            issues: vec![FieldIssue {
                field: "body".to_string(),
                problem: FieldProblem::Invalid(detail.into()),
            }],
        }
    }

    pub fn missing_documents(step: KycStep, documents: &[DocumentType]) -> Self {
        Self {
            step: step.number(),
            issues: documents
                .iter()
                .map(|document| FieldIssue {
                    field: format!("documents.{}", document.label()),
                    problem: FieldProblem::Missing,
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.issues.iter().map(|issue| issue.field.as_str()).collect()
    }
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| match &issue.problem {
            FieldProblem::Missing => format!("{} (missing)", issue.field),
            FieldProblem::Invalid(detail) => format!("{} ({detail})", issue.field),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Documents from the required set that are not on file.
pub fn missing_documents(on_file: &[DocumentType]) -> Vec<DocumentType> {
    REQUIRED_DOCUMENTS
        .iter()
        .copied()
        .filter(|required| !on_file.contains(required))
        .collect()
}

/// Turns step drafts into validated payloads.
#[derive(Debug, Clone)]
pub struct StepValidator {
    minimum_age: u32,
}

impl Default for StepValidator {
    fn default() -> Self {
        Self {
            minimum_age: DEFAULT_MINIMUM_AGE,
        }
    }
}

impl StepValidator {
    pub fn with_minimum_age(minimum_age: u32) -> Self {
        Self { minimum_age }
    }

    /// Validate a draft as of `today`. `documents_on_file` lists the driver's primary uploads.
    pub fn validate(
        &self,
        draft: StepDraft,
        today: NaiveDate,
        documents_on_file: &[DocumentType],
    ) -> Result<StepPayload, StepValidationError> {
        match draft {
            StepDraft::PersonalInfo(draft) => {
                self.personal_info(draft, today).map(StepPayload::PersonalInfo)
            }
            StepDraft::AddressLicenseBanking(draft) => {
                address_license_banking(draft, today).map(StepPayload::AddressLicenseBanking)
            }
            StepDraft::EmploymentConsent(draft) => {
                employment_consent(draft, documents_on_file).map(StepPayload::EmploymentConsent)
            }
        }
    }

    fn personal_info(
        &self,
        draft: PersonalInfoDraft,
        today: NaiveDate,
    ) -> Result<PersonalInfo, StepValidationError> {
        let mut issues = Issues::new(KycStep::PersonalInfo);

        let first_name = issues.text("first_name", draft.first_name);
        let last_name = issues.text("last_name", draft.last_name);
        let middle_name = draft
            .middle_name
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let date_of_birth = match draft.date_of_birth {
            None => issues.missing("date_of_birth"),
            Some(dob) if age_on(dob, today) < self.minimum_age => issues.invalid(
                "date_of_birth",
                format!("driver must be at least {} years old", self.minimum_age),
            ),
            Some(dob) => Some(dob),
        };

        let phone = issues.phone("phone", draft.phone);
        let email = match issues.text("email", draft.email) {
            Some(email) if is_plausible_email(&email) => Some(email.to_ascii_lowercase()),
            Some(_) => issues.invalid("email", "not a valid e-mail address"),
            None => None,
        };
        let nin = issues.digits("nin", draft.nin, NIN_DIGITS);

        let emergency_contact = match draft.emergency_contact {
            None => issues.missing("emergency_contact"),
            Some(contact) => issues.emergency_contact(contact, phone.as_deref()),
        };

        let (
            Some(first_name),
            Some(last_name),
            Some(date_of_birth),
            Some(phone),
            Some(email),
            Some(nin),
            Some(emergency_contact),
        ) = (
            first_name,
            last_name,
            date_of_birth,
            phone,
            email,
            nin,
            emergency_contact,
        )
        else {
            return Err(issues.into_error());
        };
        issues.ensure_clean()?;

        Ok(PersonalInfo {
            first_name,
            middle_name,
            last_name,
            date_of_birth,
            phone,
            email,
            nin,
            emergency_contact,
        })
    }
}

fn address_license_banking(
    draft: AddressLicenseBankingDraft,
    today: NaiveDate,
) -> Result<AddressLicenseBanking, StepValidationError> {
    let mut issues = Issues::new(KycStep::AddressLicenseBanking);

    let address = match draft.address {
        None => issues.missing("address"),
        Some(address) => issues.address(address),
    };
    let license = match draft.license {
        None => issues.missing("license"),
        Some(license) => issues.license(license, today),
    };
    let banking = match draft.banking {
        None => issues.missing("banking"),
        Some(banking) => issues.banking(banking),
    };

    let (Some(address), Some(license), Some(banking)) = (address, license, banking) else {
        return Err(issues.into_error());
    };
    issues.ensure_clean()?;

    Ok(AddressLicenseBanking {
        address,
        license,
        banking,
    })
}

fn employment_consent(
    draft: EmploymentConsentDraft,
    documents_on_file: &[DocumentType],
) -> Result<EmploymentConsent, StepValidationError> {
    let mut issues = Issues::new(KycStep::EmploymentConsent);

    let employment = match draft.employment {
        None => issues.missing("employment"),
        Some(employment) => issues.employment(employment),
    };
    let consent = match draft.consent {
        None => issues.missing("consent"),
        Some(consent) => issues.consent(consent),
    };

    for document in missing_documents(documents_on_file) {
        issues.missing::<()>(&format!("documents.{}", document.label()));
    }

    let (Some(employment), Some(consent)) = (employment, consent) else {
        return Err(issues.into_error());
    };
    issues.ensure_clean()?;

    Ok(EmploymentConsent {
        employment,
        consent,
    })
}

/// Accumulates field problems so a driver sees every issue on the page at once.
struct Issues {
    step: KycStep,
    issues: Vec<FieldIssue>,
}

impl Issues {
    fn new(step: KycStep) -> Self {
        Self {
            step,
            issues: Vec::new(),
        }
    }

    fn missing<T>(&mut self, field: &str) -> Option<T> {
        self.issues.push(FieldIssue {
            field: field.to_string(),
            problem: FieldProblem::Missing,
        });
        None
    }

    fn invalid<T>(&mut self, field: &str, detail: impl Into<String>) -> Option<T> {
        self.issues.push(FieldIssue {
            field: field.to_string(),
            problem: FieldProblem::Invalid(detail.into()),
        });
        None
    }

    fn text(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value.map(|value| value.trim().to_string()) {
            Some(value) if !value.is_empty() => Some(value),
            _ => self.missing(field),
        }
    }

    fn digits(&mut self, field: &str, value: Option<String>, len: usize) -> Option<String> {
        let value = self.text(field, value)?;
        if value.len() == len && value.chars().all(|c| c.is_ascii_digit()) {
            Some(value)
        } else {
            self.invalid(field, format!("must be exactly {len} digits"))
        }
    }

    fn phone(&mut self, field: &str, value: Option<String>) -> Option<String> {
        let value = self.text(field, value)?;
        match normalize_phone(&value) {
            Some(normalized) => Some(normalized),
            None => self.invalid(field, "must contain 10 to 14 digits"),
        }
    }

    fn emergency_contact(
        &mut self,
        draft: EmergencyContactDraft,
        driver_phone: Option<&str>,
    ) -> Option<EmergencyContact> {
        let name = self.text("emergency_contact.name", draft.name);
        let phone = match self.phone("emergency_contact.phone", draft.phone) {
            Some(phone) if Some(phone.as_str()) == driver_phone => self.invalid(
                "emergency_contact.phone",
                "must differ from the driver's own phone",
            ),
            other => other,
        };
        let relationship = self.text("emergency_contact.relationship", draft.relationship);

        Some(EmergencyContact {
            name: name?,
            phone: phone?,
            relationship: relationship?,
        })
    }

    fn address(&mut self, draft: AddressDraft) -> Option<Address> {
        let street = self.text("address.street", draft.street);
        let city = self.text("address.city", draft.city);
        let state = self.text("address.state", draft.state);
        let lga = self.text("address.lga", draft.lga);

        Some(Address {
            street: street?,
            city: city?,
            state: state?,
            lga: lga?,
        })
    }

    fn license(&mut self, draft: LicenseDraft, today: NaiveDate) -> Option<DriverLicense> {
        let number = match self.text("license.number", draft.number) {
            Some(number) => {
                let compact: String = number
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '-')
                    .collect::<String>()
                    .to_ascii_uppercase();
                if (6..=20).contains(&compact.len())
                    && compact.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    Some(compact)
                } else {
                    self.invalid("license.number", "must be 6 to 20 letters or digits")
                }
            }
            None => None,
        };
        let class = self.text("license.class", draft.class);
        let expires_on = match draft.expires_on {
            None => self.missing("license.expires_on"),
            Some(date) if date <= today => {
                self.invalid("license.expires_on", "license has expired")
            }
            Some(date) => Some(date),
        };

        Some(DriverLicense {
            number: number?,
            class: class?,
            expires_on: expires_on?,
        })
    }

    fn banking(&mut self, draft: BankingDraft) -> Option<BankAccount> {
        let bank_name = self.text("banking.bank_name", draft.bank_name);
        let account_number = self.digits(
            "banking.account_number",
            draft.account_number,
            ACCOUNT_NUMBER_DIGITS,
        );
        let account_name = self.text("banking.account_name", draft.account_name);

        Some(BankAccount {
            bank_name: bank_name?,
            account_number: account_number?,
            account_name: account_name?,
        })
    }

    fn employment(&mut self, draft: EmploymentDraft) -> Option<Employment> {
        let status = match draft.status {
            Some(status) => Some(status),
            None => self.missing("employment.status"),
        };
        let years_driving = match draft.years_driving {
            None => self.missing("employment.years_driving"),
            Some(years) if years > 60 => {
                self.invalid("employment.years_driving", "must be at most 60")
            }
            Some(years) => Some(years),
        };
        let previous_employer = draft
            .previous_employer
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Some(Employment {
            status: status?,
            years_driving: years_driving?,
            previous_employer,
        })
    }

    fn consent(&mut self, draft: ConsentDraft) -> Option<Consent> {
        let terms = self.affirmed("consent.terms_accepted", draft.terms_accepted);
        let background = self.affirmed("consent.background_check", draft.background_check);
        let data = self.affirmed("consent.data_processing", draft.data_processing);

        Some(Consent {
            terms_accepted: terms?,
            background_check: background?,
            data_processing: data?,
        })
    }

    fn affirmed(&mut self, field: &str, value: Option<bool>) -> Option<bool> {
        match value {
            Some(true) => Some(true),
            Some(false) => self.invalid(field, "consent is required"),
            None => self.missing(field),
        }
    }

    fn ensure_clean(&mut self) -> Result<(), StepValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self.take_error())
        }
    }

    fn take_error(&mut self) -> StepValidationError {
        StepValidationError {
            step: self.step.number(),
            issues: std::mem::take(&mut self.issues),
        }
    }

    fn into_error(mut self) -> StepValidationError {
        self.take_error()
    }
}

fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (prefix, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let digits: String = rest
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if (10..=14).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{prefix}{digits}"))
    } else {
        None
    }
}

fn is_plausible_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}
