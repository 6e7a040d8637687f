use crate::infra::{ruleset_catalog, Pipeline};
use chrono::{Duration, Local};
use clap::Args;
use evidence_automation::config::{AppConfig, PipelineConfig};
use evidence_automation::error::AppError;
use evidence_automation::workflows::evidence::report::{decision_tally, decisions_of_kind};
use evidence_automation::workflows::evidence::{
    write_decisions_csv, Document, DocumentId, EvidenceStore, FilesystemStorage,
    MemoryDocumentStorage, MouStatus, Partner, PartnerApprovalResult, PartnerApprovalService,
    PartnerDocument, PartnerDocumentStatus, PartnerId, ProcessingResult, ProgramHolder,
    SubjectKind, TransferHoursRequest,
};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_PROGRAM: &str = "barber-apprenticeship";
const DEMO_STATE: &str = "IN";

#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// Text document to run through the pipeline
    pub(crate) file: PathBuf,
    /// Evaluate the document as a transfer-hours transcript for this user
    #[arg(long)]
    pub(crate) user: Option<String>,
    /// Ruleset seed file (overrides EVIDENCE_RULESETS_PATH)
    #[arg(long)]
    pub(crate) rulesets: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Write every decision recorded during the demo to this CSV file
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

pub(crate) fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let ProcessArgs {
        file,
        user,
        rulesets,
    } = args;

    let mut config = AppConfig::load()?.pipeline;
    if rulesets.is_some() {
        config.rulesets_path = rulesets;
    }

    let location = file
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("'{}' does not name a file", file.display()),
            ))
        })?;
    let root = file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let catalog = ruleset_catalog(&config)?;
    let pipeline = Pipeline::build(&config, catalog, Arc::new(FilesystemStorage::new(root)));
    let document_id = DocumentId::generate();
    pipeline
        .store
        .insert_document(Document::pending(document_id.clone(), location))?;

    let result = match user {
        Some(user_id) => pipeline
            .processor
            .process_transfer_hours(&TransferHoursRequest {
                user_id,
                document_id,
                application_id: None,
                enrollment_id: None,
            }),
        None => pipeline.processor.process_document(&document_id),
    };

    if !result.success {
        return Err(AppError::pipeline(&result));
    }

    println!("Processed {}", file.display());
    render_processing(&result);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = PipelineConfig::default();
    let catalog = ruleset_catalog(&config)?;
    let storage = Arc::new(MemoryDocumentStorage::default());
    let pipeline = Pipeline::build(&config, catalog, storage.clone());
    let partners = PartnerApprovalService::new(pipeline.processor.clone());

    println!("Evidence automation demo");

    let upload = |id: &str, text: String| -> Result<DocumentId, AppError> {
        let location = format!("demo/{id}.txt");
        storage.put(location.clone(), text);
        let document_id = DocumentId::from(id);
        pipeline
            .store
            .insert_document(Document::pending(document_id.clone(), location))?;
        Ok(document_id)
    };

    println!("\nA. Transcript from an approved state");
    let transcript = upload("transcript-in", transcript_text("IN"))?;
    let result = pipeline
        .processor
        .process_transfer_hours(&TransferHoursRequest {
            user_id: "apprentice-001".to_string(),
            document_id: transcript,
            application_id: Some("application-001".to_string()),
            enrollment_id: None,
        });
    render_processing(&result);

    println!("\nB. Transcript from a state outside the program");
    let transcript = upload("transcript-ca", transcript_text("CA"))?;
    render_processing(&pipeline.processor.process_document(&transcript));

    println!("\nC. Expired barber license");
    let license = upload(
        "license-expired",
        "STATE BOARD OF BARBER EXAMINERS\nShop License\nLicense Number: SL-20931\nExpiration Date: 2020-06-30\n"
            .to_string(),
    )?;
    render_processing(&pipeline.processor.process_document(&license));

    let license_expiry = Local::now().date_naive() + Duration::days(365);

    println!("\nD. Partner shop with every requirement on file");
    let complete = seed_partner(&pipeline, "partner-complete", "Fade Masters", true, license_expiry)?;
    render_partner(&partners.check_partner_approval(&complete, DEMO_PROGRAM, DEMO_STATE));

    println!("\nE. Partner shop missing proof of insurance");
    let incomplete = seed_partner(&pipeline, "partner-incomplete", "Edge Cuts", false, license_expiry)?;
    render_partner(&partners.check_partner_approval(&incomplete, DEMO_PROGRAM, DEMO_STATE));

    let queue = pipeline.processor.reviews().open_items(None, 20)?;
    println!("\nReview queue ({} open)", queue.len());
    for item in &queue {
        println!(
            "  - [p{}] {} {} | {} | {}",
            item.priority,
            item.queue.label(),
            item.subject,
            item.reasons.join(", "),
            item.metadata["system_recommendation"]
                .as_str()
                .unwrap_or("manual_review_required")
        );
    }

    let decisions = pipeline.store.all_decisions()?;
    println!("\nDecision tally");
    for ((kind, verdict), count) in decision_tally(&decisions) {
        println!("  - {kind}/{verdict}: {count}");
    }
    println!("Partner decisions");
    for view in decisions_of_kind(&decisions, SubjectKind::Partner) {
        println!(
            "  - {} {} [{}] by {}",
            view.subject_id,
            view.decision,
            view.reason_codes.join(", "),
            view.actor
        );
    }
    println!("Audit events recorded: {}", pipeline.audit.events().len());

    if let Some(path) = args.csv {
        let file = File::create(&path)?;
        write_decisions_csv(file, &decisions)?;
        println!("\nWrote {} decisions to {}", decisions.len(), path.display());
    }

    Ok(())
}

fn transcript_text(state: &str) -> String {
    format!(
        "OFFICIAL TRANSCRIPT\nACADEMY OF BARBERING - Total Hours Completed: 1200 - State: {state}\n"
    )
}

fn seed_partner(
    pipeline: &Pipeline,
    id: &str,
    name: &str,
    insured: bool,
    license_expiry: chrono::NaiveDate,
) -> Result<PartnerId, AppError> {
    let partner_id = PartnerId::from(id);
    pipeline
        .store
        .insert_partner(Partner::new(partner_id.clone(), name))?;
    pipeline.store.set_required_documents(
        DEMO_PROGRAM,
        DEMO_STATE,
        vec!["shop_license".to_string(), "insurance".to_string()],
    )?;

    let mut slots = vec![("shop_license", Some(license_expiry))];
    if insured {
        slots.push(("insurance", None));
    }
    for (document_type, expiration_date) in slots {
        pipeline.store.upsert_partner_document(PartnerDocument {
            id: format!("{id}-{document_type}"),
            partner_id: partner_id.clone(),
            document_type: document_type.to_string(),
            document_id: None,
            status: PartnerDocumentStatus::Accepted,
            expiration_date,
            notes: None,
            reviewed_at: None,
        })?;
    }
    pipeline.store.upsert_program_holder(ProgramHolder {
        partner_id: partner_id.clone(),
        program_id: DEMO_PROGRAM.to_string(),
        mou_status: MouStatus::FullyExecuted,
    })?;

    Ok(partner_id)
}

fn render_processing(result: &ProcessingResult) {
    let document_type = result
        .document_type
        .map(|document_type| document_type.label())
        .unwrap_or("unclassified");
    let decision = result
        .decision
        .map(|decision| decision.label())
        .unwrap_or("none");
    println!(
        "- document {} ({document_type}) -> {decision} | confidence {:.2}",
        result.document_id,
        result.confidence.unwrap_or_default()
    );
    if !result.errors.is_empty() {
        println!("  reasons: {}", result.errors.join(", "));
    }
    if !result.extracted_fields.is_empty() {
        let fields: Vec<String> = result
            .extracted_fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("  fields: {}", fields.join(", "));
    }
    if let Some(review) = &result.review_queue_id {
        println!("  queued for review as {review}");
    }
    if let Some(transfer) = &result.transfer_hours {
        match transfer.approved_hours {
            Some(hours) => println!("  transfer hours: {hours} credited automatically"),
            None => println!(
                "  transfer hours: {} awaiting review ({})",
                transfer
                    .total_hours
                    .map(|hours| hours.to_string())
                    .unwrap_or_else(|| "unreadable".to_string()),
                transfer.gates.reason_codes().join(", ")
            ),
        }
    }
}

fn render_partner(result: &PartnerApprovalResult) {
    let status = result
        .status
        .map(|status| status.label())
        .unwrap_or("unknown");
    println!(
        "- partner {} -> {} ({status})",
        result.partner_id,
        if result.approved { "approved" } else { "not approved" }
    );
    println!("  reasons: {}", result.reason_codes.join(", "));
    if !result.missing_documents.is_empty() {
        println!("  missing: {}", result.missing_documents.join(", "));
    }
    if let Some(review) = &result.review_queue_id {
        println!("  queued for review as {review}");
    }
}
