use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Nfo,
    Metadata,
    Image,
    Filesystem,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Nfo => "nfo",
            RuleCategory::Metadata => "metadata",
            RuleCategory::Image => "image",
            RuleCategory::Filesystem => "filesystem",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nfo" => Some(RuleCategory::Nfo),
            "metadata" => Some(RuleCategory::Metadata),
            "image" => Some(RuleCategory::Image),
            "filesystem" => Some(RuleCategory::Filesystem),
            _ => None,
        }
    }
}

/// What the pipeline may do on its own when a rule is violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationMode {
    /// Apply fixes without asking.
    Auto,
    /// Only gather candidates; a human decides.
    #[serde(alias = "notify")]
    Manual,
    /// Record violations, never invoke a fixer.
    Disabled,
}

impl AutomationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationMode::Auto => "auto",
            AutomationMode::Manual => "manual",
            AutomationMode::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(AutomationMode::Auto),
            "manual" | "notify" => Some(AutomationMode::Manual),
            "disabled" => Some(AutomationMode::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

/// Per-rule thresholds and flags. Every field is optional; checkers fall
/// back to their own defaults when a value is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Pick the top candidate without asking when several qualify.
    pub auto_select_best: bool,
    /// Only return candidates, never write anything.
    pub discovery_only: bool,
}

impl RuleConfig {
    pub fn severity_or_default(&self) -> Severity {
        self.severity.unwrap_or(Severity::Warning)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: RuleCategory,
    pub enabled: bool,
    pub automation_mode: AutomationMode,
    pub config: RuleConfig,
    pub built_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rule failing for one artist during a single evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub message: String,
    pub fixable: bool,
    pub config: RuleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Open,
    Dismissed,
    Resolved,
    PendingChoice,
}

impl ViolationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationStatus::Open => "open",
            ViolationStatus::Dismissed => "dismissed",
            ViolationStatus::Resolved => "resolved",
            ViolationStatus::PendingChoice => "pending_choice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ViolationStatus::Open),
            "dismissed" => Some(ViolationStatus::Dismissed),
            "resolved" => Some(ViolationStatus::Resolved),
            "pending_choice" => Some(ViolationStatus::PendingChoice),
            _ => None,
        }
    }
}

/// A provider-sourced image not yet written to the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    /// Declared width; 0 when the provider does not say.
    pub width: u32,
    /// Declared height; 0 when the provider does not say.
    pub height: u32,
    #[serde(default)]
    pub likes: u32,
    pub source: String,
    pub image_type: crate::artist::ImageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ImageCandidate {
    pub fn declared_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn has_declared_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Inbox row for a violation, keyed by `(rule_id, artist_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedViolation {
    pub id: String,
    pub rule_id: String,
    pub artist_id: String,
    pub artist_name: String,
    pub severity: Severity,
    pub message: String,
    pub fixable: bool,
    pub status: ViolationStatus,
    pub candidates: Vec<ImageCandidate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PersistedViolation {
    /// Build a row with the given status. Candidates are only kept for
    /// `PendingChoice`, and a `PendingChoice` without candidates is demoted
    /// to `Open`.
    pub fn new(
        violation: &Violation,
        artist_id: &str,
        artist_name: &str,
        status: ViolationStatus,
        candidates: Vec<ImageCandidate>,
    ) -> Self {
        let now = Utc::now();
        let (status, candidates) = normalize_candidates(status, candidates);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: violation.rule_id.clone(),
            artist_id: artist_id.to_string(),
            artist_name: artist_name.to_string(),
            severity: violation.severity,
            message: violation.message.clone(),
            fixable: violation.fixable,
            status,
            candidates,
            created_at: now,
            updated_at: now,
            dismissed_at: None,
            resolved_at: if status == ViolationStatus::Resolved {
                Some(now)
            } else {
                None
            },
        }
    }
}

pub fn normalize_candidates(
    status: ViolationStatus,
    candidates: Vec<ImageCandidate>,
) -> (ViolationStatus, Vec<ImageCandidate>) {
    match status {
        ViolationStatus::PendingChoice if candidates.is_empty() => {
            (ViolationStatus::Open, Vec::new())
        }
        ViolationStatus::PendingChoice => (status, candidates),
        _ => (status, Vec::new()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub artist_id: String,
    pub artist_name: String,
    pub violations: Vec<Violation>,
    pub rules_passed: usize,
    pub rules_total: usize,
    pub health_score: f64,
}

/// `passed / total * 100` rounded to one decimal, or 100 with no rules.
pub fn health_score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let raw = passed as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artist::ImageType;

    #[test]
    fn test_health_score() {
        assert_eq!(health_score(0, 0), 100.0);
        assert_eq!(health_score(0, 6), 0.0);
        assert_eq!(health_score(1, 6), 16.7);
        assert_eq!(health_score(2, 3), 66.7);
        assert_eq!(health_score(6, 6), 100.0);
    }

    #[test]
    fn test_rule_config_round_trip() {
        let configs = vec![
            RuleConfig::default(),
            RuleConfig {
                min_width: Some(1000),
                min_height: Some(1000),
                aspect_ratio: Some(1.75),
                tolerance: Some(0.1),
                min_length: Some(10),
                padding_threshold: Some(0.05),
                severity: Some(Severity::Error),
                auto_select_best: true,
                discovery_only: true,
            },
        ];
        for config in configs {
            let json = serde_json::to_string(&config).unwrap();
            let back: RuleConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(back, config);
        }
    }

    #[test]
    fn test_rule_config_tolerates_missing_fields() {
        let config: RuleConfig = serde_json::from_str(r#"{"min_width": 500}"#).unwrap();
        assert_eq!(config.min_width, Some(500));
        assert!(!config.auto_select_best);
    }

    #[test]
    fn test_candidate_round_trip() {
        let candidate = ImageCandidate {
            url: "https://assets.example/img/1.jpg".to_string(),
            width: 0,
            height: 0,
            likes: 7,
            source: "fanart.tv".to_string(),
            image_type: ImageType::Fanart,
            language: Some("en".to_string()),
        };
        let json = serde_json::to_string(&candidate).unwrap();
        let back: ImageCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, candidate);
    }

    #[test]
    fn test_notify_is_manual_alias() {
        let mode: AutomationMode = serde_json::from_str(r#""notify""#).unwrap();
        assert_eq!(mode, AutomationMode::Manual);
        assert_eq!(AutomationMode::parse("notify"), Some(AutomationMode::Manual));
        assert_eq!(serde_json::to_string(&mode).unwrap(), r#""manual""#);
    }

    #[test]
    fn test_pending_choice_requires_candidates() {
        let (status, candidates) = normalize_candidates(ViolationStatus::PendingChoice, vec![]);
        assert_eq!(status, ViolationStatus::Open);
        assert!(candidates.is_empty());

        let candidate = ImageCandidate {
            url: "u".to_string(),
            width: 1,
            height: 1,
            likes: 0,
            source: "s".to_string(),
            image_type: ImageType::Thumb,
            language: None,
        };
        let (status, candidates) =
            normalize_candidates(ViolationStatus::Open, vec![candidate.clone()]);
        assert_eq!(status, ViolationStatus::Open);
        assert!(candidates.is_empty());

        let (status, candidates) =
            normalize_candidates(ViolationStatus::PendingChoice, vec![candidate]);
        assert_eq!(status, ViolationStatus::PendingChoice);
        assert_eq!(candidates.len(), 1);
    }
}
