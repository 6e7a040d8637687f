use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::evidence::domain::{
    AutomatedDecision, Document, DocumentExtraction, DocumentId, MouStatus, Partner,
    PartnerDocument, PartnerDocumentStatus, PartnerId, ProgramHolder, QueueType, ReviewItemId,
    ReviewQueueItem, Subject, TransferHours,
};
use crate::workflows::evidence::classifier::FieldPattern;
use crate::workflows::evidence::extraction::{OcrError, OcrOutput, PlainTextExtractor, TextExtractor};
use crate::workflows::evidence::memory::{
    MemoryAuditSink, MemoryDocumentStorage, MemoryEvidenceStore,
};
use crate::workflows::evidence::repository::{
    DocumentStorage, EvidenceStore, RepositoryError, RulesetStoreError, StorageError,
};
use crate::workflows::evidence::ruleset::{
    AutomationRuleset, RulesetCatalog, RulesetRules, LICENSE_APPROVAL, PARTNER_APPROVAL,
    TRANSCRIPT_APPROVAL,
};
use crate::workflows::evidence::service::{EvidenceProcessor, PipelineSettings};
use crate::workflows::evidence::{evidence_router, EvidenceServices};

pub(super) const PROGRAM: &str = "barber-apprenticeship";
pub(super) const STATE: &str = "IN";

pub(super) fn transcript_text(state: &str) -> String {
    format!(
        "OFFICIAL TRANSCRIPT\nACADEMY OF BARBERING \u{2014} Total Hours Completed: 1200 \u{2014} State: {state}\n"
    )
}

pub(super) fn license_text(expiration: &str) -> String {
    format!(
        "STATE BOARD OF BARBER EXAMINERS\nShop License\nLicense Number: SL-20931\nExpiration Date: {expiration}\nState: IN\n"
    )
}

pub(super) fn insurance_text(expiration: &str) -> String {
    format!(
        "CERTIFICATE OF LIABILITY INSURANCE\nInsured: Fade Masters LLC\nPolicy Number: GL-55012\nExpiration Date: {expiration}\nEach occurrence limit $1,000,000\n"
    )
}

pub(super) fn transcript_rules() -> RulesetRules {
    RulesetRules {
        approved_states: Some(vec!["IN".to_string()]),
        max_transfer_hours: Some(1500.0),
        min_confidence: Some(0.85),
        require_hours: true,
        ..RulesetRules::default()
    }
}

pub(super) fn partner_rules() -> RulesetRules {
    RulesetRules {
        required_documents: Some(vec!["shop_license".to_string(), "insurance".to_string()]),
        mou_must_be_signed: true,
        license_must_be_valid: true,
        ..RulesetRules::default()
    }
}

pub(super) fn rulesets() -> RulesetCatalog {
    RulesetCatalog::from_rulesets([
        AutomationRuleset::new(TRANSCRIPT_APPROVAL, "transcript-v1", transcript_rules()).activated(),
        AutomationRuleset::new(
            LICENSE_APPROVAL,
            "license-v1",
            RulesetRules {
                license_must_be_valid: true,
                ..RulesetRules::default()
            },
        )
        .activated(),
        AutomationRuleset::new(PARTNER_APPROVAL, "partner-v1", partner_rules()).activated(),
    ])
    .expect("fixture rulesets publish")
}

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) struct Harness {
    pub(super) store: Arc<MemoryEvidenceStore>,
    pub(super) audit: Arc<MemoryAuditSink>,
    pub(super) storage: Arc<MemoryDocumentStorage>,
    pub(super) processor: Arc<EvidenceProcessor<MemoryEvidenceStore, MemoryAuditSink>>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_confidence(0.9)
    }

    pub(super) fn with_confidence(confidence: f64) -> Self {
        let store = Arc::new(MemoryEvidenceStore::with_rulesets(rulesets()));
        let audit = Arc::new(MemoryAuditSink::default());
        let storage = Arc::new(MemoryDocumentStorage::default());
        let processor = Arc::new(EvidenceProcessor::new(
            store.clone(),
            audit.clone(),
            storage.clone(),
            Arc::new(PlainTextExtractor::new(confidence)),
            PipelineSettings::default(),
        ));

        Self {
            store,
            audit,
            storage,
            processor,
        }
    }

    pub(super) fn services(&self) -> Arc<EvidenceServices<MemoryEvidenceStore, MemoryAuditSink>> {
        Arc::new(EvidenceServices::new(self.processor.clone()))
    }

    pub(super) fn router(&self) -> axum::Router {
        evidence_router(self.services())
    }

    pub(super) fn upload(&self, id: &str, text: &str) -> DocumentId {
        let id = DocumentId::from(id);
        let location = format!("uploads/{id}.txt");
        self.storage.put(location.clone(), text.as_bytes().to_vec());
        self.store
            .insert_document(Document::pending(id.clone(), location))
            .expect("document inserted");
        id
    }

    pub(super) fn decisions(&self, subject: &Subject) -> Vec<AutomatedDecision> {
        self.store.decisions_for(subject).expect("decisions readable")
    }

    pub(super) fn open_items(&self, queue: QueueType) -> Vec<ReviewQueueItem> {
        self.store
            .open_review_items(Some(queue), 100)
            .expect("queue readable")
    }

    pub(super) fn review_item(&self, id: &ReviewItemId) -> ReviewQueueItem {
        self.store
            .fetch_review_item(id)
            .expect("queue readable")
            .expect("review item exists")
    }

    pub(super) fn actions(&self) -> Vec<String> {
        self.audit
            .events()
            .into_iter()
            .map(|event| event.action)
            .collect()
    }
}

pub(super) fn onboard_partner(harness: &Harness, id: &str) -> PartnerId {
    let partner_id = PartnerId::from(id);
    harness
        .store
        .insert_partner(Partner::new(partner_id.clone(), "Fade Masters"))
        .expect("partner inserted");
    harness
        .store
        .set_required_documents(
            PROGRAM,
            STATE,
            vec!["shop_license".to_string(), "insurance".to_string()],
        )
        .expect("requirements stored");
    partner_id
}

pub(super) fn partner_document(
    partner_id: &PartnerId,
    document_type: &str,
    status: PartnerDocumentStatus,
    expiration_date: Option<NaiveDate>,
) -> PartnerDocument {
    PartnerDocument {
        id: format!("{partner_id}-{document_type}"),
        partner_id: partner_id.clone(),
        document_type: document_type.to_string(),
        document_id: None,
        status,
        expiration_date,
        notes: None,
        reviewed_at: None,
    }
}

pub(super) fn set_mou(harness: &Harness, partner_id: &PartnerId, status: MouStatus) {
    harness
        .store
        .upsert_program_holder(ProgramHolder {
            partner_id: partner_id.clone(),
            program_id: PROGRAM.to_string(),
            mou_status: status,
        })
        .expect("program holder stored");
}

pub(super) fn far_future() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 12, 31).expect("valid date")
}

/// Storage that reports itself unavailable for the first `failures` fetches.
pub(super) struct FlakyStorage {
    inner: MemoryDocumentStorage,
    failures: usize,
    pub(super) calls: AtomicUsize,
}

impl FlakyStorage {
    pub(super) fn new(inner: MemoryDocumentStorage, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl DocumentStorage for FlakyStorage {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StorageError::Unavailable("bucket timeout".to_string()));
        }
        self.inner.fetch(location)
    }
}

/// OCR adapter that always reports the service down.
pub(super) struct OfflineOcr {
    pub(super) calls: AtomicUsize,
}

impl OfflineOcr {
    pub(super) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl TextExtractor for OfflineOcr {
    fn extract(&self, _content: &[u8], _patterns: &[FieldPattern]) -> Result<OcrOutput, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OcrError::Unavailable(
            "ocr endpoint refused connection".to_string(),
        ))
    }
}

/// Memory store whose tables can be switched offline one at a time.
#[derive(Default)]
pub(super) struct FaultyStore {
    pub(super) inner: MemoryEvidenceStore,
    pub(super) decisions_down: AtomicBool,
    pub(super) document_updates_down: AtomicBool,
    pub(super) review_updates_down: AtomicBool,
    pub(super) transfer_hours_down: AtomicBool,
}

impl FaultyStore {
    pub(super) fn new(inner: MemoryEvidenceStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(super) fn decision_outage(inner: MemoryEvidenceStore) -> Self {
        let store = Self::new(inner);
        store.decisions_down.store(true, Ordering::SeqCst);
        store
    }
}

fn outage(flag: &AtomicBool, table: &str) -> Result<(), RepositoryError> {
    if flag.load(Ordering::SeqCst) {
        return Err(RepositoryError::Unavailable(format!("{table} table offline")));
    }
    Ok(())
}

impl EvidenceStore for FaultyStore {
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.inner.fetch_document(id)
    }

    fn update_document(&self, document: Document) -> Result<(), RepositoryError> {
        outage(&self.document_updates_down, "document")?;
        self.inner.update_document(document)
    }

    fn insert_extraction(&self, extraction: DocumentExtraction) -> Result<(), RepositoryError> {
        self.inner.insert_extraction(extraction)
    }

    fn extractions_for(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<DocumentExtraction>, RepositoryError> {
        self.inner.extractions_for(document_id)
    }

    fn insert_decision(&self, decision: AutomatedDecision) -> Result<(), RepositoryError> {
        outage(&self.decisions_down, "decision")?;
        self.inner.insert_decision(decision)
    }

    fn decisions_for(&self, subject: &Subject) -> Result<Vec<AutomatedDecision>, RepositoryError> {
        self.inner.decisions_for(subject)
    }

    fn all_decisions(&self) -> Result<Vec<AutomatedDecision>, RepositoryError> {
        self.inner.all_decisions()
    }

    fn insert_review_item(&self, item: ReviewQueueItem) -> Result<(), RepositoryError> {
        self.inner.insert_review_item(item)
    }

    fn fetch_review_item(
        &self,
        id: &ReviewItemId,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError> {
        self.inner.fetch_review_item(id)
    }

    fn update_review_item(&self, item: ReviewQueueItem) -> Result<(), RepositoryError> {
        outage(&self.review_updates_down, "review queue")?;
        self.inner.update_review_item(item)
    }

    fn open_review_items(
        &self,
        queue: Option<QueueType>,
        limit: usize,
    ) -> Result<Vec<ReviewQueueItem>, RepositoryError> {
        self.inner.open_review_items(queue, limit)
    }

    fn open_review_item_for(
        &self,
        queue: QueueType,
        subject: &Subject,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError> {
        self.inner.open_review_item_for(queue, subject)
    }

    fn fetch_partner(&self, id: &PartnerId) -> Result<Option<Partner>, RepositoryError> {
        self.inner.fetch_partner(id)
    }

    fn update_partner(
        &self,
        partner: Partner,
        expected_version: u64,
    ) -> Result<Partner, RepositoryError> {
        self.inner.update_partner(partner, expected_version)
    }

    fn partner_documents(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Vec<PartnerDocument>, RepositoryError> {
        self.inner.partner_documents(partner_id)
    }

    fn update_partner_document(&self, document: PartnerDocument) -> Result<(), RepositoryError> {
        self.inner.update_partner_document(document)
    }

    fn required_documents(
        &self,
        program_id: &str,
        state: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        self.inner.required_documents(program_id, state)
    }

    fn program_holder(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
    ) -> Result<Option<ProgramHolder>, RepositoryError> {
        self.inner.program_holder(partner_id, program_id)
    }

    fn upsert_program_holder(&self, holder: ProgramHolder) -> Result<(), RepositoryError> {
        self.inner.upsert_program_holder(holder)
    }

    fn insert_transfer_hours(&self, record: TransferHours) -> Result<(), RepositoryError> {
        outage(&self.transfer_hours_down, "transfer hours")?;
        self.inner.insert_transfer_hours(record)
    }

    fn active_ruleset(
        &self,
        rule_type: &str,
    ) -> Result<Option<AutomationRuleset>, RepositoryError> {
        self.inner.active_ruleset(rule_type)
    }

    fn publish_ruleset(&self, ruleset: AutomationRuleset) -> Result<(), RulesetStoreError> {
        self.inner.publish_ruleset(ruleset)
    }

    fn activate_ruleset(
        &self,
        rule_type: &str,
        version: &str,
    ) -> Result<AutomationRuleset, RulesetStoreError> {
        self.inner.activate_ruleset(rule_type, version)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
