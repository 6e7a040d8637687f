use super::domain::{
    AuditEvent, AutomatedDecision, Document, DocumentExtraction, DocumentId, Partner,
    PartnerDocument, PartnerId, ProgramHolder, QueueType, ReviewItemId, ReviewQueueItem, Subject,
    TransferHours,
};
use super::ruleset::{AutomationRuleset, RulesetError};

/// Storage abstraction over the relational tables the pipeline reads and writes.
///
/// Implementations never cache across calls; every pipeline run re-reads what it needs,
/// including the active ruleset.
pub trait EvidenceStore: Send + Sync {
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;
    fn update_document(&self, document: Document) -> Result<(), RepositoryError>;

    /// Extractions are append-only; inserting an existing id is a conflict.
    fn insert_extraction(&self, extraction: DocumentExtraction) -> Result<(), RepositoryError>;
    fn extractions_for(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<DocumentExtraction>, RepositoryError>;

    /// Rejects a second decision carrying the same idempotency key with `Conflict`.
    fn insert_decision(&self, decision: AutomatedDecision) -> Result<(), RepositoryError>;
    fn decisions_for(&self, subject: &Subject) -> Result<Vec<AutomatedDecision>, RepositoryError>;
    fn all_decisions(&self) -> Result<Vec<AutomatedDecision>, RepositoryError>;

    fn insert_review_item(&self, item: ReviewQueueItem) -> Result<(), RepositoryError>;
    fn fetch_review_item(
        &self,
        id: &ReviewItemId,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError>;
    fn update_review_item(&self, item: ReviewQueueItem) -> Result<(), RepositoryError>;
    /// Open items ordered by priority, then creation time.
    fn open_review_items(
        &self,
        queue: Option<QueueType>,
        limit: usize,
    ) -> Result<Vec<ReviewQueueItem>, RepositoryError>;
    /// The open item already raised on `queue` for `subject`, if any.
    fn open_review_item_for(
        &self,
        queue: QueueType,
        subject: &Subject,
    ) -> Result<Option<ReviewQueueItem>, RepositoryError>;

    fn fetch_partner(&self, id: &PartnerId) -> Result<Option<Partner>, RepositoryError>;
    /// Optimistic write: fails with `Conflict` unless the stored row is still at
    /// `expected_version`. Returns the row as stored, with its bumped version.
    fn update_partner(
        &self,
        partner: Partner,
        expected_version: u64,
    ) -> Result<Partner, RepositoryError>;
    fn partner_documents(
        &self,
        partner_id: &PartnerId,
    ) -> Result<Vec<PartnerDocument>, RepositoryError>;
    fn update_partner_document(&self, document: PartnerDocument) -> Result<(), RepositoryError>;
    /// Required document types for a program in a state; empty when none are configured.
    fn required_documents(
        &self,
        program_id: &str,
        state: &str,
    ) -> Result<Vec<String>, RepositoryError>;
    fn program_holder(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
    ) -> Result<Option<ProgramHolder>, RepositoryError>;
    fn upsert_program_holder(&self, holder: ProgramHolder) -> Result<(), RepositoryError>;

    fn insert_transfer_hours(&self, record: TransferHours) -> Result<(), RepositoryError>;

    fn active_ruleset(&self, rule_type: &str)
        -> Result<Option<AutomationRuleset>, RepositoryError>;
    fn publish_ruleset(&self, ruleset: AutomationRuleset) -> Result<(), RulesetStoreError>;
    fn activate_ruleset(
        &self,
        rule_type: &str,
        version: &str,
    ) -> Result<AutomationRuleset, RulesetStoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RulesetStoreError {
    #[error(transparent)]
    Ruleset(#[from] RulesetError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Append-only audit log.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit transport unavailable: {0}")]
    Transport(String),
}

/// Binary document content by stored file location.
pub trait DocumentStorage: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no file stored at {0}")]
    NotFound(String),
    #[error("location {0} escapes the storage root")]
    OutsideRoot(String),
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::Unavailable(_))
    }
}
