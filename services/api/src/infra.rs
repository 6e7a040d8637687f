use evidence_automation::config::PipelineConfig;
use evidence_automation::error::AppError;
use evidence_automation::workflows::evidence::ruleset::{
    INSURANCE_APPROVAL, LICENSE_APPROVAL, PARTNER_APPROVAL, TRANSCRIPT_APPROVAL,
};
use evidence_automation::workflows::evidence::{
    load_rulesets, AutomationRuleset, DocumentStorage, EvidenceProcessor, MemoryAuditSink,
    MemoryEvidenceStore, PipelineSettings, PlainTextExtractor, RulesetCatalog, RulesetRules,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type Processor = EvidenceProcessor<MemoryEvidenceStore, MemoryAuditSink>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-process collaborators shared by the server, the CLI and the demo.
pub(crate) struct Pipeline {
    pub(crate) store: Arc<MemoryEvidenceStore>,
    pub(crate) audit: Arc<MemoryAuditSink>,
    pub(crate) processor: Arc<Processor>,
}

impl Pipeline {
    pub(crate) fn build(
        config: &PipelineConfig,
        catalog: RulesetCatalog,
        storage: Arc<dyn DocumentStorage>,
    ) -> Self {
        let store = Arc::new(MemoryEvidenceStore::with_rulesets(catalog));
        let audit = Arc::new(MemoryAuditSink::default());
        let processor = Arc::new(EvidenceProcessor::new(
            store.clone(),
            audit.clone(),
            storage,
            Arc::new(PlainTextExtractor::new(config.ocr_confidence)),
            PipelineSettings::from(config),
        ));

        Self {
            store,
            audit,
            processor,
        }
    }
}

/// Rulesets used when no seed file is configured.
pub(crate) fn default_rulesets() -> Vec<AutomationRuleset> {
    vec![
        AutomationRuleset::new(
            TRANSCRIPT_APPROVAL,
            "default-1",
            RulesetRules {
                approved_states: Some(
                    ["IN", "IL", "OH", "MI", "KY"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
                max_transfer_hours: Some(1500.0),
                min_confidence: Some(0.85),
                require_school_name: true,
                require_hours: true,
                ..RulesetRules::default()
            },
        )
        .activated(),
        AutomationRuleset::new(
            LICENSE_APPROVAL,
            "default-1",
            RulesetRules {
                license_must_be_valid: true,
                ..RulesetRules::default()
            },
        )
        .activated(),
        AutomationRuleset::new(INSURANCE_APPROVAL, "default-1", RulesetRules::default())
            .activated(),
        AutomationRuleset::new(
            PARTNER_APPROVAL,
            "default-1",
            RulesetRules {
                required_documents: Some(vec!["shop_license".to_string(), "insurance".to_string()]),
                mou_must_be_signed: true,
                license_must_be_valid: true,
                ..RulesetRules::default()
            },
        )
        .activated(),
    ]
}

/// Seed rulesets from the configured file, or the built-in defaults.
pub(crate) fn ruleset_catalog(config: &PipelineConfig) -> Result<RulesetCatalog, AppError> {
    let rulesets = match &config.rulesets_path {
        Some(path) => {
            let rulesets = load_rulesets(path)?;
            info!(path = %path.display(), count = rulesets.len(), "rulesets loaded");
            rulesets
        }
        None => default_rulesets(),
    };

    Ok(RulesetCatalog::from_rulesets(rulesets)?)
}
