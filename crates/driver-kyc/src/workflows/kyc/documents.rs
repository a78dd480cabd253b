use chrono::{DateTime, Utc};
use mime::Mime;
use serde::{Deserialize, Serialize};

use super::domain::{DocumentId, DocumentType, DriverId};
use super::verification::DocumentVerdict;

/// Error raised when an upload is refused before reaching storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("file is {size} bytes; uploads are limited to {max} bytes")]
    FileTooLarge { size: usize, max: usize },
    #[error("unsupported file format: {detail}")]
    UnsupportedFormat { detail: String },
}

/// Opaque pointer to a blob persisted by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageRef(pub String);

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
}

/// Blob storage collaborator (object store, local disk, ...).
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, content_type: &Mime, bytes: &[u8]) -> Result<StorageRef, BlobError>;
}

/// Raw upload as received from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentVerificationStatus {
    Pending,
    Approved,
    Rejected,
    RequiresManualReview,
}

impl DocumentVerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentVerificationStatus::Pending => "pending",
            DocumentVerificationStatus::Approved => "approved",
            DocumentVerificationStatus::Rejected => "rejected",
            DocumentVerificationStatus::RequiresManualReview => "requires_manual_review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub driver_id: DriverId,
    pub document_type: DocumentType,
    pub storage_ref: StorageRef,
    pub content_type: String,
    pub size_bytes: usize,
    pub verification_status: DocumentVerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_match_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl DocumentRecord {
    pub fn is_primary(&self) -> bool {
        self.superseded_at.is_none()
    }

    /// Only the pending primary upload of a type takes verification results.
    pub fn awaits_verification(&self) -> bool {
        self.is_primary() && self.verification_status == DocumentVerificationStatus::Pending
    }

    /// Record an adapter verdict. Returns `false` when the document no longer awaits one.
    pub fn apply_verdict(&mut self, verdict: &DocumentVerdict, now: DateTime<Utc>) -> bool {
        if !self.awaits_verification() {
            return false;
        }

        let score = verdict.match_score.clamp(0.0, 100.0);
        self.ocr_match_score = Some(score);
        self.verified_at = Some(now);
        if verdict.passed {
            self.verification_status = DocumentVerificationStatus::Approved;
            self.rejection_reason = None;
        } else {
            self.verification_status = DocumentVerificationStatus::Rejected;
            self.rejection_reason = Some(format!("match score {score:.1} below threshold"));
        }
        true
    }

    pub fn require_manual_review(&mut self, reason: impl Into<String>) -> bool {
        if !self.awaits_verification() {
            return false;
        }
        self.verification_status = DocumentVerificationStatus::RequiresManualReview;
        self.rejection_reason = Some(reason.into());
        true
    }
}

/// Build the storage key under which an upload is written.
pub fn storage_key(driver_id: &DriverId, document_type: DocumentType, id: DocumentId) -> String {
    format!("kyc/{}/{}/{}", driver_id.0, document_type.label(), id)
}

/// Check size and format of an upload, returning the content type it will be stored under.
pub fn inspect_upload(
    document_type: DocumentType,
    file: &UploadedFile,
    max_bytes: usize,
) -> Result<Mime, DocumentError> {
    let mime = inspect(file, max_bytes)?;
    if document_type.is_photo() && mime.type_() != mime::IMAGE {
        return Err(DocumentError::UnsupportedFormat {
            detail: format!("{document_type} must be a jpg or png image"),
        });
    }
    Ok(mime)
}

/// Selfie captures follow the upload rules but must be images.
pub fn inspect_capture(file: &UploadedFile, max_bytes: usize) -> Result<Mime, DocumentError> {
    let mime = inspect(file, max_bytes)?;
    if mime.type_() != mime::IMAGE {
        return Err(DocumentError::UnsupportedFormat {
            detail: "face captures must be a jpg or png image".to_string(),
        });
    }
    Ok(mime)
}

fn inspect(file: &UploadedFile, max_bytes: usize) -> Result<Mime, DocumentError> {
    if file.bytes.len() > max_bytes {
        return Err(DocumentError::FileTooLarge {
            size: file.bytes.len(),
            max: max_bytes,
        });
    }
    if file.bytes.is_empty() {
        return Err(DocumentError::UnsupportedFormat {
            detail: "file is empty".to_string(),
        });
    }

    let declared = declared_mime(file)?;
    let sniffed = sniff(&file.bytes).ok_or_else(|| DocumentError::UnsupportedFormat {
        detail: "only jpg, png, and pdf files are accepted".to_string(),
    })?;

    if let Some(declared) = declared {
        if declared != sniffed {
            return Err(DocumentError::UnsupportedFormat {
                detail: format!("declared {declared} but content is {sniffed}"),
            });
        }
    }

    Ok(sniffed)
}

fn declared_mime(file: &UploadedFile) -> Result<Option<Mime>, DocumentError> {
    let from_header = file
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<Mime>()
                .map_err(|_| DocumentError::UnsupportedFormat {
                    detail: format!("unrecognised content type '{value}'"),
                })
        })
        .transpose()?
        .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM);

    let declared = match from_header {
        Some(mime) => Some(mime),
        None => file
            .file_name
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first()),
    };

    match declared {
        None => Ok(None),
        Some(mime) => normalize(&mime)
            .map(Some)
            .ok_or_else(|| DocumentError::UnsupportedFormat {
                detail: format!("{} files are not accepted", mime.essence_str()),
            }),
    }
}

fn normalize(mime: &Mime) -> Option<Mime> {
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("image", "jpeg") | ("image", "jpg") | ("image", "pjpeg") => Some(mime::IMAGE_JPEG),
        ("image", "png") => Some(mime::IMAGE_PNG),
        ("application", "pdf") => Some(mime::APPLICATION_PDF),
        _ => None,
    }
}

fn sniff(bytes: &[u8]) -> Option<Mime> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(mime::IMAGE_JPEG)
    } else if bytes.starts_with(PNG) {
        Some(mime::IMAGE_PNG)
    } else if bytes.starts_with(b"%PDF-") {
        Some(mime::APPLICATION_PDF)
    } else {
        None
    }
}
