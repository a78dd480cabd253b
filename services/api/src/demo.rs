use crate::infra::{OutboxNotificationPublisher, SimulatedVerificationAdapter};
use chrono::NaiveDate;
use clap::Args;
use driver_kyc::config::KycConfig;
use driver_kyc::error::AppError;
use driver_kyc::workflows::kyc::steps::{
    AddressDraft, AddressLicenseBankingDraft, BankingDraft, ConsentDraft, EmergencyContactDraft,
    EmploymentConsentDraft, EmploymentDraft, EmploymentStatus, LicenseDraft, PersonalInfoDraft,
};
use driver_kyc::workflows::kyc::{
    verification_channel, write_transitions_csv, AllowListAuthority, DocumentVerificationStatus,
    DriverId, FacialSessionStatus, KycService, KycSnapshot, MemoryBlobStore, MemoryKycStore,
    ReviewDecision, RetryPolicy, SessionId, StepDraft, SystemClock, UploadedFile,
    VerificationWorker, REQUIRED_DOCUMENTS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DEMO_REVIEWER: &str = "demo-reviewer";
const DEMO_DRIVER: &str = "drv-demo-001";
/// Synthetic scans are large enough for the simulated OCR to read them.
const SYNTHETIC_SCAN_BYTES: usize = 48 * 1024;
const VERIFICATION_POLL: Duration = Duration::from_millis(50);
const VERIFICATION_POLLS: usize = 100;

type DemoService = KycService<MemoryKycStore, OutboxNotificationPublisher>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Image or PDF to upload as the license front. Defaults to a synthetic scan.
    #[arg(long)]
    pub(crate) license_front: Option<PathBuf>,
    /// Image or PDF to upload as the license back. Defaults to a synthetic scan.
    #[arg(long)]
    pub(crate) license_back: Option<PathBuf>,
    /// Image to upload as the passport photo. Defaults to a synthetic scan.
    #[arg(long)]
    pub(crate) passport_photo: Option<PathBuf>,
    /// Reject the first submission, then retry and resubmit before approving.
    #[arg(long)]
    pub(crate) reject_first: bool,
    /// Write the status transition history to this CSV file.
    #[arg(long)]
    pub(crate) audit_csv: Option<PathBuf>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        license_front,
        license_back,
        passport_photo,
        reject_first,
        audit_csv,
    } = args;

    let config = KycConfig {
        reviewers: vec![DEMO_REVIEWER.to_string()],
        ..KycConfig::default()
    };
    let store = Arc::new(MemoryKycStore::default());
    let notifications = Arc::new(OutboxNotificationPublisher::default());
    let (queue, jobs) = verification_channel();
    let service = KycService::new(
        store.clone(),
        notifications.clone(),
        Arc::new(MemoryBlobStore::default()),
        Arc::new(AllowListAuthority::new(config.reviewers.clone())),
        Arc::new(queue),
        config.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = VerificationWorker::new(
        store.clone(),
        Arc::new(SimulatedVerificationAdapter::new(Duration::from_millis(20))),
        RetryPolicy::from_config(&config),
        Arc::new(SystemClock),
    );
    let worker_task = tokio::spawn(worker.run(jobs, shutdown_rx));

    let driver_id = DriverId(DEMO_DRIVER.to_string());
    println!("Driver KYC demo for {driver_id}");

    println!("\nUploading required documents");
    let sources = [license_front, license_back, passport_photo];
    for (document_type, source) in REQUIRED_DOCUMENTS.into_iter().zip(sources) {
        let file = load_upload(source.as_deref())?;
        let document = service.upload_document(&driver_id, document_type, file)?;
        println!(
            "- {}: {} ({} bytes) stored at {}",
            document_type, document.content_type, document.size_bytes, document.storage_ref.0
        );
    }

    collect_steps(&service, &driver_id)?;
    let submitted = service.finalize_submission(&driver_id)?;
    print_snapshot("Submitted for review", &submitted);
    wait_for_documents(&service, &driver_id).await?;

    if reject_first {
        let rejected = service.apply_review(
            DEMO_REVIEWER,
            &driver_id,
            ReviewDecision::Reject,
            Some("blurry license".to_string()),
        )?;
        print_snapshot("Rejected by reviewer", &rejected);

        let retried = service.retry(&driver_id)?;
        print_snapshot("Driver retried", &retried);
        collect_steps(&service, &driver_id)?;
        let resubmitted = service.finalize_submission(&driver_id)?;
        print_snapshot("Resubmitted for review", &resubmitted);
    }

    let approved =
        service.apply_review(DEMO_REVIEWER, &driver_id, ReviewDecision::Approve, None)?;
    print_snapshot("Approved by reviewer", &approved);

    let session = service.begin_facial_session(&driver_id)?;
    service.submit_face_capture(session.session_id, synthetic_jpeg("selfie.jpg"))?;
    let face_status = wait_for_face_match(&service, &driver_id, session.session_id).await?;
    println!(
        "\nFacial verification session {}: {}",
        session.session_id,
        face_status.label()
    );

    println!("\nNotifications published");
    for notification in notifications.events() {
        println!(
            "- {} to {} ({})",
            notification.template, notification.driver_id, notification.status
        );
        for (key, value) in &notification.details {
            println!("    {key}: {value}");
        }
    }

    let records = store.all_records();
    if let Some(path) = audit_csv {
        let file = std::fs::File::create(&path)?;
        let rows = write_transitions_csv(file, &records)?;
        println!("\nWrote {rows} transitions to {}", path.display());
    } else {
        println!("\nTransition history");
        for record in &records {
            for transition in record.history() {
                println!(
                    "- {} -> {} at {} by {}",
                    transition.from,
                    transition.to,
                    transition.at.format("%H:%M:%S"),
                    transition.actor
                );
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(err) = worker_task.await {
        tracing::warn!(error = %err, "verification worker ended abnormally");
    }
    Ok(())
}

fn load_upload(path: Option<&Path>) -> Result<UploadedFile, AppError> {
    let Some(path) = path else {
        return Ok(synthetic_jpeg("scan.jpg"));
    };

    let bytes = std::fs::read(path)?;
    let mut file = UploadedFile::new(bytes);
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        file = file.with_file_name(name);
    }
    if let Some(mime) = mime_guess::from_path(path).first() {
        file = file.with_content_type(mime.essence_str());
    }
    Ok(file)
}

fn synthetic_jpeg(name: &str) -> UploadedFile {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(SYNTHETIC_SCAN_BYTES, 0x5A);
    UploadedFile::new(bytes)
        .with_content_type("image/jpeg")
        .with_file_name(name)
}

fn collect_steps(service: &DemoService, driver_id: &DriverId) -> Result<(), AppError> {
    for draft in sample_drafts() {
        let receipt = service.submit_step(driver_id, draft)?;
        println!(
            "Step {} {:?}: status {}",
            receipt.step, receipt.outcome, receipt.kyc.status
        );
    }
    Ok(())
}

async fn wait_for_documents(service: &DemoService, driver_id: &DriverId) -> Result<(), AppError> {
    for _ in 0..VERIFICATION_POLLS {
        let documents = service.documents(driver_id)?;
        if documents
            .iter()
            .all(|document| document.verification_status != DocumentVerificationStatus::Pending)
        {
            break;
        }
        tokio::time::sleep(VERIFICATION_POLL).await;
    }

    println!("\nAutomated document verification");
    for document in service.documents(driver_id)? {
        let score = document
            .ocr_match_score
            .map(|score| format!("{score:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {}: {} (score {score})",
            document.document_type,
            document.verification_status.label()
        );
    }
    Ok(())
}

async fn wait_for_face_match(
    service: &DemoService,
    driver_id: &DriverId,
    session_id: SessionId,
) -> Result<FacialSessionStatus, AppError> {
    let mut status = FacialSessionStatus::InProgress;
    for _ in 0..VERIFICATION_POLLS {
        let package = service.review_package(driver_id)?;
        if let Some(session) = package
            .facial_sessions
            .iter()
            .find(|session| session.session_id == session_id)
        {
            status = session.status;
        }
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(VERIFICATION_POLL).await;
    }
    Ok(status)
}

fn print_snapshot(label: &str, snapshot: &KycSnapshot) {
    println!(
        "\n{label}: status {} | retries {} | rejections {}/{}{}",
        snapshot.status,
        snapshot.retry_count,
        snapshot.rejection_count,
        snapshot.max_rejections,
        snapshot
            .rejection_reason
            .as_deref()
            .map(|reason| format!(" | reason: {reason}"))
            .unwrap_or_default()
    );
}

fn sample_drafts() -> [StepDraft; 3] {
    [
        StepDraft::PersonalInfo(PersonalInfoDraft {
            first_name: Some("Tunde".to_string()),
            middle_name: Some("Ade".to_string()),
            last_name: Some("Bakare".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1987, 2, 14),
            phone: Some("+234 802 000 1111".to_string()),
            email: Some("tunde.bakare@example.com".to_string()),
            nin: Some("24681357900".to_string()),
            emergency_contact: Some(EmergencyContactDraft {
                name: Some("Funmi Bakare".to_string()),
                phone: Some("+234 802 000 2222".to_string()),
                relationship: Some("Spouse".to_string()),
            }),
        }),
        StepDraft::AddressLicenseBanking(AddressLicenseBankingDraft {
            address: Some(AddressDraft {
                street: Some("22 Allen Avenue".to_string()),
                city: Some("Ikeja".to_string()),
                state: Some("Lagos".to_string()),
                lga: Some("Ikeja".to_string()),
            }),
            license: Some(LicenseDraft {
                number: Some("IKJ-55501-TB".to_string()),
                class: Some("B".to_string()),
                expires_on: NaiveDate::from_ymd_opt(2035, 12, 31),
            }),
            banking: Some(BankingDraft {
                bank_name: Some("Access Bank".to_string()),
                account_number: Some("1122334455".to_string()),
                account_name: Some("Tunde Bakare".to_string()),
            }),
        }),
        StepDraft::EmploymentConsent(EmploymentConsentDraft {
            employment: Some(EmploymentDraft {
                status: Some(EmploymentStatus::SelfEmployed),
                years_driving: Some(12),
                previous_employer: None,
            }),
            consent: Some(ConsentDraft {
                terms_accepted: Some(true),
                background_check: Some(true),
                data_processing: Some(true),
            }),
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_paths_fall_back_to_synthetic_scans() {
        let file = load_upload(None).expect("synthetic upload");
        assert_eq!(file.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(file.bytes.len(), SYNTHETIC_SCAN_BYTES);
    }

    #[tokio::test]
    async fn demo_writes_audit_csv() {
        let path = std::env::temp_dir().join(format!(
            "driver-kyc-demo-{}.csv",
            std::process::id()
        ));

        run_demo(DemoArgs {
            reject_first: true,
            audit_csv: Some(path.clone()),
            ..DemoArgs::default()
        })
        .await
        .expect("demo runs");

        let csv = std::fs::read_to_string(&path).expect("audit written");
        let _ = std::fs::remove_file(&path);
        assert!(csv.starts_with("Driver ID,From,To,At,Actor,Note"));
        assert!(csv.contains("submitted,rejected"));
        assert!(csv.contains("rejected,step_1"));
        assert!(csv.contains("submitted,completed"));
    }
}
