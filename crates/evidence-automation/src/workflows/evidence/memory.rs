//! In-process adapters for the store, audit log, and document storage ports. The service
//! binary wires these for local runs and the demo; tests use them as fakes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    AuditEvent, AutomatedDecision, Document, DocumentExtraction, DocumentId, ExtractionId, Partner,
    PartnerDocument, PartnerId, ProgramHolder, QueueType, ReviewItemId, ReviewQueueItem,
    ReviewStatus, Subject, TransferHours, TransferHoursId,
};
use super::repository::{
    AuditError, AuditSink, DocumentStorage, EvidenceStore, RepositoryError, RulesetStoreError,
    StorageError,
};
use super::ruleset::{AutomationRuleset, RulesetCatalog};

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<DocumentId, Document>,
    extractions: Vec<DocumentExtraction>,
    extraction_ids: HashSet<ExtractionId>,
    decisions: Vec<AutomatedDecision>,
    idempotency_keys: HashSet<String>,
    review_items: Vec<ReviewQueueItem>,
    partners: HashMap<PartnerId, Partner>,
    partner_documents: Vec<PartnerDocument>,
    requirements: BTreeMap<(String, String), Vec<String>>,
    program_holders: Vec<ProgramHolder>,
    transfer_hours: BTreeMap<TransferHoursId, TransferHours>,
    rulesets: RulesetCatalog,
}

#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    tables: Mutex<Tables>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rulesets(rulesets: RulesetCatalog) -> Self {
        Self {
            tables: Mutex::new(Tables {
                rulesets,
                ..Tables::default()
            }),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }

    pub fn insert_document(&self, document: Document) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.documents.contains_key(&document.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.documents.insert(document.id.clone(), document);
        Ok(())
    }

    pub fn insert_partner(&self, partner: Partner) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.partners.contains_key(&partner.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.partners.insert(partner.id.clone(), partner);
        Ok(())
    }

    pub fn upsert_partner_document(&self, document: PartnerDocument) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        tables
            .partner_documents
            .retain(|existing| existing.id != document.id);
        tables.partner_documents.push(document);
        Ok(())
    }

    pub fn set_required_documents(
        &self,
        program_id: &str,
        state: &str,
        document_types: Vec<String>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        tables.requirements.insert(
            (program_id.to_string(), state.to_ascii_uppercase()),
            document_types,
        );
        Ok(())
    }

    pub fn transfer_hours(&self) -> Result<Vec<TransferHours>, RepositoryError> {
        Ok(self.tables()?.transfer_hours.values().cloned().collect())
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.tables()?.documents.get(id).cloned())
    }

    fn update_document(&self, document: Document) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.documents.get_mut(&document.id) {
            Some(existing) => {
                *existing = document;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn insert_extraction(&self, extraction: DocumentExtraction) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.extraction_ids.insert(extraction.id.clone()) {
            return Err(RepositoryError::Conflict);
        }
        tables.extractions.push(extraction);
        Ok(())
    }

    fn extractions_for(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<DocumentExtraction>, RepositoryError> {
        Ok(self
            .tables()?
            .extractions
            .iter()
            .filter(|extraction| &extraction.document_id == document_id)
            .cloned()
            .collect())
    }

    fn insert_decision(&self, decision: AutomatedDecision) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables
            .idempotency_keys
            .insert(decision.idempotency_key.clone())
        {
            return Err(RepositoryError::Conflict);
        }
        tables.decisions.push(decision);
        Ok(())
    }

    fn decisions_for(&self, subject: &Subject) -> Result<Vec<AutomatedDecision>, RepositoryError> {
        Ok(self
            .tables()?
            .decisions
            .iter()
            .filter(|decision| &decision.subject == subject)
            .cloned()
            .collect())
    }

    fn all_decisions(&self) -> Result<Vec<AutomatedDecision>, RepositoryError> {
        Ok(self.tables()?.decisions.clone())
    }

    fn insert_review_item(&self, item: ReviewQueueItem) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.review_items.iter().any(|existing| existing.id == item.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.review_items.push(item);
        Ok(())
    }

    fn fetch_review_item(
        &self,
        id: &ReviewItemId,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError> {
        Ok(self
            .tables()?
            .review_items
            .iter()
            .find(|item| &item.id == id)
            .cloned())
    }

    fn update_review_item(&self, item: ReviewQueueItem) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables
            .review_items
            .iter_mut()
            .find(|existing| existing.id == item.id)
        {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn open_review_items(
        &self,
        queue: Option<QueueType>,
        limit: usize,
    ) -> Result<Vec<ReviewQueueItem>, RepositoryError> {
        let tables = self.tables()?;
        let mut items: Vec<ReviewQueueItem> = tables
            .review_items
            .iter()
            .filter(|item| item.status == ReviewStatus::Open)
            .filter(|item| queue.map(|queue| item.queue == queue).unwrap_or(true))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        items.truncate(limit);
        Ok(items)
    }

    fn open_review_item_for(
        &self,
        queue: QueueType,
        subject: &Subject,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError> {
        Ok(self
            .tables()?
            .review_items
            .iter()
            .find(|item| {
                item.status == ReviewStatus::Open && item.queue == queue && &item.subject == subject
            })
            .cloned())
    }

    fn fetch_partner(&self, id: &PartnerId) -> Result<Option<Partner>, RepositoryError> {
        Ok(self.tables()?.partners.get(id).cloned())
    }

    fn update_partner(
        &self,
        partner: Partner,
        expected_version: u64,
    ) -> Result<Partner, RepositoryError> {
        let mut tables = self.tables()?;
        let existing = tables
            .partners
            .get_mut(&partner.id)
            .ok_or(RepositoryError::NotFound)?;
        if existing.version != expected_version {
            return Err(RepositoryError::Conflict);
        }

        *existing = Partner {
            version: expected_version + 1,
            ..partner
        };
        Ok(existing.clone())
    }

    fn partner_documents(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Vec<PartnerDocument>, RepositoryError> {
        Ok(self
            .tables()?
            .partner_documents
            .iter()
            .filter(|document| &document.partner_id == partner_id)
            .cloned()
            .collect())
    }

    fn update_partner_document(&self, document: PartnerDocument) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables
            .partner_documents
            .iter_mut()
            .find(|existing| existing.id == document.id)
        {
            Some(existing) => {
                *existing = document;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn required_documents(
        &self,
        program_id: &str,
        state: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .tables()?
            .requirements
            .get(&(program_id.to_string(), state.to_ascii_uppercase()))
            .cloned()
            .unwrap_or_default())
    }

    fn program_holder(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
    ) -> Result<Option<ProgramHolder>, RepositoryError> {
        Ok(self
            .tables()?
            .program_holders
            .iter()
            .find(|holder| &holder.partner_id == partner_id && holder.program_id == program_id)
            .cloned())
    }

    fn upsert_program_holder(&self, holder: ProgramHolder) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        tables.program_holders.retain(|existing| {
            !(existing.partner_id == holder.partner_id && existing.program_id == holder.program_id)
        });
        tables.program_holders.push(holder);
        Ok(())
    }

    fn insert_transfer_hours(&self, record: TransferHours) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.transfer_hours.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.transfer_hours.insert(record.id.clone(), record);
        Ok(())
    }

    fn active_ruleset(
        &self,
        rule_type: &str,
    ) -> Result<Option<AutomationRuleset>, RepositoryError> {
        Ok(self.tables()?.rulesets.active(rule_type).cloned())
    }

    fn publish_ruleset(&self, ruleset: AutomationRuleset) -> Result<(), RulesetStoreError> {
        self.tables()?.rulesets.publish(ruleset)?;
        Ok(())
    }

    fn activate_ruleset(
        &self,
        rule_type: &str,
        version: &str,
    ) -> Result<AutomationRuleset, RulesetStoreError> {
        let mut tables = self.tables()?;
        let active = tables.rulesets.activate(rule_type, version)?;
        Ok(active.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError::Transport("audit lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentStorage {
    pub fn put(&self, location: impl Into<String>, content: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(location.into(), content.into());
        }
    }
}

impl DocumentStorage for MemoryDocumentStorage {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, StorageError> {
        let files = self
            .files
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))?;
        files
            .get(location)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(location.to_string()))
    }
}
