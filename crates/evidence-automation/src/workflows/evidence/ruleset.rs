use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TRANSCRIPT_APPROVAL: &str = "transcript_approval";
pub const LICENSE_APPROVAL: &str = "license_approval";
pub const INSURANCE_APPROVAL: &str = "insurance_approval";
pub const PARTNER_APPROVAL: &str = "partner_approval";

/// Business parameters carried by a ruleset. Every field is optional; an absent ruleset
/// behaves like `RulesetRules::default()`, which turns the conditional checks off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetRules {
    pub approved_states: Option<Vec<String>>,
    pub max_transfer_hours: Option<f64>,
    pub min_confidence: Option<f64>,
    pub require_school_name: bool,
    pub require_hours: bool,
    pub require_date: bool,
    pub license_must_be_valid: bool,
    pub required_documents: Option<Vec<String>>,
    pub mou_must_be_signed: bool,
}

impl RulesetRules {
    /// `None` when no state list is configured.
    pub fn state_approved(&self, state: &str) -> Option<bool> {
        self.approved_states.as_ref().map(|states| {
            states
                .iter()
                .any(|approved| approved.trim().eq_ignore_ascii_case(state.trim()))
        })
    }
}

/// One published version of the rules for a `rule_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRuleset {
    pub rule_type: String,
    pub version: String,
    #[serde(default)]
    pub rules: RulesetRules,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AutomationRuleset {
    pub fn new(rule_type: impl Into<String>, version: impl Into<String>, rules: RulesetRules) -> Self {
        Self {
            rule_type: rule_type.into(),
            version: version.into(),
            rules,
            active: false,
            created_at: Utc::now(),
        }
    }

    pub fn activated(mut self) -> Self {
        self.active = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    #[error("no rulesets published for rule type {0}")]
    UnknownRuleType(String),
    #[error("rule type {rule_type} has no version {version}")]
    UnknownVersion { rule_type: String, version: String },
    #[error("rule type {rule_type} already has a version {version}")]
    DuplicateVersion { rule_type: String, version: String },
    #[error("ruleset document is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unable to read rulesets: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
struct RulesetSlot {
    history: Vec<AutomationRuleset>,
    active: Option<usize>,
}

/// Versioned rules keyed by `rule_type`, with exactly one active slot per type.
///
/// Publishing never changes which version is active unless the published ruleset is
/// flagged `active`; switching versions is always an explicit [`RulesetCatalog::activate`].
#[derive(Debug, Clone, Default)]
pub struct RulesetCatalog {
    slots: BTreeMap<String, RulesetSlot>,
}

impl RulesetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rulesets(
        rulesets: impl IntoIterator<Item = AutomationRuleset>,
    ) -> Result<Self, RulesetError> {
        let mut catalog = Self::new();
        for ruleset in rulesets {
            catalog.publish(ruleset)?;
        }
        Ok(catalog)
    }

    pub fn publish(&mut self, ruleset: AutomationRuleset) -> Result<(), RulesetError> {
        let slot = self.slots.entry(ruleset.rule_type.clone()).or_default();
        if slot
            .history
            .iter()
            .any(|existing| existing.version == ruleset.version)
        {
            return Err(RulesetError::DuplicateVersion {
                rule_type: ruleset.rule_type,
                version: ruleset.version,
            });
        }

        let activate = ruleset.active;
        slot.history.push(AutomationRuleset {
            active: false,
            ..ruleset
        });
        if activate {
            let index = slot.history.len() - 1;
            slot.set_active(index);
        }
        Ok(())
    }

    pub fn activate(
        &mut self,
        rule_type: &str,
        version: &str,
    ) -> Result<&AutomationRuleset, RulesetError> {
        let slot = self
            .slots
            .get_mut(rule_type)
            .ok_or_else(|| RulesetError::UnknownRuleType(rule_type.to_string()))?;
        let index = slot
            .history
            .iter()
            .position(|ruleset| ruleset.version == version)
            .ok_or_else(|| RulesetError::UnknownVersion {
                rule_type: rule_type.to_string(),
                version: version.to_string(),
            })?;

        slot.set_active(index);
        Ok(&slot.history[index])
    }

    pub fn active(&self, rule_type: &str) -> Option<&AutomationRuleset> {
        let slot = self.slots.get(rule_type)?;
        slot.active.map(|index| &slot.history[index])
    }

    /// Published versions for a rule type, oldest first.
    pub fn versions(&self, rule_type: &str) -> &[AutomationRuleset] {
        self.slots
            .get(rule_type)
            .map(|slot| slot.history.as_slice())
            .unwrap_or(&[])
    }
}

impl RulesetSlot {
    fn set_active(&mut self, index: usize) {
        for (position, ruleset) in self.history.iter_mut().enumerate() {
            ruleset.active = position == index;
        }
        self.active = Some(index);
    }
}

#[derive(Debug, Deserialize)]
struct RulesetSeed {
    rulesets: Vec<AutomationRuleset>,
}

/// Parse a `{ "rulesets": [...] }` seed document.
pub fn rulesets_from_json(raw: &str) -> Result<Vec<AutomationRuleset>, RulesetError> {
    let seed: RulesetSeed = serde_json::from_str(raw)?;
    Ok(seed.rulesets)
}

pub fn load_rulesets(path: &Path) -> Result<Vec<AutomationRuleset>, RulesetError> {
    let raw = std::fs::read_to_string(path)?;
    rulesets_from_json(&raw)
}
