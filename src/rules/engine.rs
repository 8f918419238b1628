use super::checkers::CheckerRegistry;
use super::models::{health_score, EvaluationResult, Rule, Violation};
use crate::artist::Artist;
use crate::library_store::RuleStore;
use crate::naming::NamingProfile;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Runs every enabled rule's checker against an artist.
pub struct Engine {
    rules: Arc<dyn RuleStore>,
    registry: CheckerRegistry,
    naming: NamingProfile,
}

impl Engine {
    pub fn new(rules: Arc<dyn RuleStore>, naming: NamingProfile) -> Self {
        Self::with_registry(rules, naming, CheckerRegistry::builtin())
    }

    pub fn with_registry(
        rules: Arc<dyn RuleStore>,
        naming: NamingProfile,
        registry: CheckerRegistry,
    ) -> Self {
        Self {
            rules,
            registry,
            naming,
        }
    }

    pub fn naming(&self) -> &NamingProfile {
        &self.naming
    }

    pub fn registry(&self) -> &CheckerRegistry {
        &self.registry
    }

    pub fn load_rules(&self) -> Result<Vec<Rule>> {
        self.rules.list_rules().context("Failed to load rules")
    }

    pub fn evaluate(&self, artist: &Artist) -> Result<EvaluationResult> {
        let rules = self.load_rules()?;
        Ok(self.evaluate_with_rules(artist, &rules))
    }

    /// Evaluate against an already loaded rule set. Violations come out in
    /// checker registration order; rules without a checker are ignored.
    pub fn evaluate_with_rules(&self, artist: &Artist, rules: &[Rule]) -> EvaluationResult {
        let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut violations = Vec::new();
        let mut total = 0;

        for entry in self.registry.iter() {
            let Some(rule) = by_id.get(entry.rule_id) else {
                continue;
            };
            if !rule.enabled {
                continue;
            }
            total += 1;
            if let Some(message) = (entry.check)(artist, &rule.config, &self.naming) {
                trace!("{}: {} violated: {}", artist.name, rule.id, message);
                violations.push(Violation {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    category: rule.category,
                    severity: rule.config.severity_or_default(),
                    message,
                    fixable: entry.fixable,
                    config: rule.config.clone(),
                });
            }
        }

        let passed = total - violations.len();
        EvaluationResult {
            artist_id: artist.id.clone(),
            artist_name: artist.name.clone(),
            rules_passed: passed,
            rules_total: total,
            health_score: health_score(passed, total),
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::SqliteLibraryStore;
    use crate::rules::{builtin_rules, AutomationMode};
    use tempfile::TempDir;

    const CORE: &[&str] = &[
        "nfo_exists",
        "nfo_has_mbid",
        "thumb_exists",
        "fanart_exists",
        "logo_exists",
        "bio_exists",
    ];

    fn core_rules() -> Vec<Rule> {
        builtin_rules()
            .into_iter()
            .map(|mut r| {
                r.enabled = CORE.contains(&r.id.as_str());
                r
            })
            .collect()
    }

    fn engine() -> (Engine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(temp_dir.path().join("library.db")).unwrap();
        (Engine::new(Arc::new(store), NamingProfile::kodi()), temp_dir)
    }

    #[test]
    fn test_bare_artist_fails_all_core_rules() {
        let (engine, tmp) = engine();
        let artist = Artist::new("a1", "Alpha", tmp.path());
        let result = engine.evaluate_with_rules(&artist, &core_rules());
        assert_eq!(result.rules_total, 6);
        assert_eq!(result.violations.len(), 6);
        assert_eq!(result.rules_passed, 0);
        assert_eq!(result.health_score, 0.0);

        let ids: Vec<&str> = result.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, CORE.to_vec());
    }

    #[test]
    fn test_disabled_rules_are_not_counted() {
        let (engine, tmp) = engine();
        let artist = Artist::new("a1", "Alpha", tmp.path());
        let mut rules = core_rules();
        for rule in rules.iter_mut() {
            if rule.id == "nfo_exists" {
                rule.enabled = false;
                rule.automation_mode = AutomationMode::Disabled;
            }
        }
        let result = engine.evaluate_with_rules(&artist, &rules);
        assert_eq!(result.rules_total, 5);
        assert!(result.violations.iter().all(|v| v.rule_id != "nfo_exists"));
    }

    #[test]
    fn test_no_rules_scores_full() {
        let (engine, tmp) = engine();
        let artist = Artist::new("a1", "Alpha", tmp.path());
        let result = engine.evaluate_with_rules(&artist, &[]);
        assert_eq!(result.rules_total, 0);
        assert_eq!(result.health_score, 100.0);
    }

    #[test]
    fn test_rule_without_checker_is_skipped() {
        let (engine, tmp) = engine();
        let artist = Artist::new("a1", "Alpha", tmp.path());
        let mut custom = builtin_rules().remove(0);
        custom.id = "something_custom".to_string();
        let result = engine.evaluate_with_rules(&artist, &[custom]);
        assert_eq!(result.rules_total, 0);
    }

    #[test]
    fn test_health_score_matches_counts() {
        let (engine, tmp) = engine();
        let mut artist = Artist::new("a1", "Alpha", tmp.path());
        artist.nfo_exists = true;
        artist.biography = "A biography long enough".to_string();
        let result = engine.evaluate_with_rules(&artist, &core_rules());
        assert_eq!(result.rules_passed, 2);
        assert_eq!(result.health_score, 33.3);
    }

    #[test]
    fn test_evaluate_loads_rules_from_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::new(temp_dir.path().join("library.db")).unwrap());
        store.seed_defaults().unwrap();
        let engine = Engine::new(store, NamingProfile::kodi());
        let artist = Artist::new("a1", "Alpha", temp_dir.path().join("Alpha"));
        let result = engine.evaluate(&artist).unwrap();
        assert_eq!(result.rules_total, builtin_rules().len());
    }
}
