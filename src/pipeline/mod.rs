//! Evaluates artists, dispatches fixers and keeps the violation inbox in
//! step with what it found.

mod policy;

pub use policy::decide_persisted_status;

use crate::artist::Artist;
use crate::events::{Event, EventBus};
use crate::fixers::{FixContext, FixResult, Fixer, FixerSet};
use crate::library_store::LibraryStores;
use crate::rules::{
    AutomationMode, Engine, PersistedViolation, Rule, Violation, ViolationStatus,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown rule '{0}'")]
    UnknownRule(String),
    #[error("Violation '{0}' not found")]
    ViolationNotFound(String),
    #[error("Violation '{0}' is not waiting for a candidate choice")]
    NotPendingChoice(String),
    #[error("Candidate index {index} out of range, {available} available")]
    CandidateOutOfRange { index: usize, available: usize },
    #[error("Artist '{0}' not found")]
    ArtistNotFound(String),
    #[error("No fixer can apply candidates for rule '{0}'")]
    NoFixer(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    pub artists_processed: usize,
    pub violations_found: usize,
    pub fixes_attempted: usize,
    pub fixes_succeeded: usize,
    pub results: Vec<FixResult>,
}

pub struct Pipeline {
    engine: Arc<Engine>,
    stores: LibraryStores,
    fixers: FixerSet,
    events: Arc<dyn EventBus>,
}

impl Pipeline {
    pub fn new(
        engine: Arc<Engine>,
        stores: LibraryStores,
        fixers: FixerSet,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            engine,
            stores,
            fixers,
            events,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Process violations of a single rule across the library.
    pub async fn run_rule(
        &self,
        rule_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        self.run(Some(rule_id), cancel).await
    }

    /// Process every violation across the library.
    pub async fn run_all(&self, cancel: &CancellationToken) -> Result<RunResult, PipelineError> {
        self.run(None, cancel).await
    }

    async fn run(
        &self,
        target: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RunResult, PipelineError> {
        let rules = self.engine.load_rules()?;
        if let Some(rule_id) = target {
            if !rules.iter().any(|r| r.id == rule_id) {
                return Err(PipelineError::UnknownRule(rule_id.to_string()));
            }
        }
        let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();
        self.fixers.begin_pass();

        let mut artists = self.stores.artists.list_artists(false)?;
        artists.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        info!(
            "Pipeline run ({}) over {} artists",
            target.unwrap_or("all rules"),
            artists.len()
        );

        let ctx = FixContext::new(cancel.clone());
        let mut result = RunResult::default();
        for mut artist in artists {
            if cancel.is_cancelled() {
                info!(
                    "Pipeline run cancelled after {} artists",
                    result.artists_processed
                );
                break;
            }
            self.process_artist(&ctx, &mut artist, target, &rules, &by_id, &mut result)
                .await?;
            result.artists_processed += 1;
        }

        info!(
            "Pipeline run finished: {} artists, {} violations, {}/{} fixes succeeded",
            result.artists_processed,
            result.violations_found,
            result.fixes_succeeded,
            result.fixes_attempted
        );
        self.events.publish(Event::RunCompleted {
            rule_id: target.map(String::from),
            artists_processed: result.artists_processed,
            violations_found: result.violations_found,
            fixes_attempted: result.fixes_attempted,
            fixes_succeeded: result.fixes_succeeded,
        });
        Ok(result)
    }

    async fn process_artist(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        target: Option<&str>,
        rules: &[Rule],
        by_id: &HashMap<&str, &Rule>,
        result: &mut RunResult,
    ) -> Result<(), PipelineError> {
        let evaluation = self.engine.evaluate_with_rules(artist, rules);
        let mut resolved_now = Vec::new();

        for violation in evaluation.violations {
            if target.is_some_and(|t| t != violation.rule_id) {
                continue;
            }
            result.violations_found += 1;
            let mode = by_id
                .get(violation.rule_id.as_str())
                .map_or(AutomationMode::Disabled, |r| r.automation_mode);

            let outcome = self.dispatch(ctx, artist, &violation, mode).await;
            if let Some(fix) = &outcome {
                result.fixes_attempted += 1;
                if fix.fixed {
                    result.fixes_succeeded += 1;
                    self.stores.artists.save_artist(artist)?;
                }
            }

            let status = decide_persisted_status(mode, outcome.as_ref());
            let candidates = outcome
                .as_ref()
                .map(|r| r.candidates.clone())
                .unwrap_or_default();
            let row = PersistedViolation::new(&violation, &artist.id, &artist.name, status, candidates);
            let saved = self.stores.violations.upsert_violation(&row)?;
            if saved.status == ViolationStatus::Resolved {
                resolved_now.push((saved.id, violation.rule_id.clone()));
            }
            if let Some(fix) = outcome {
                result.results.push(fix);
            }
        }

        let after = self.engine.evaluate_with_rules(artist, rules);
        self.stores
            .artists
            .update_health_score(&artist.id, after.health_score)?;
        artist.health_score = after.health_score;

        // A fixer can report success while the rule still fails
        for (id, rule_id) in resolved_now {
            if after.violations.iter().any(|v| v.rule_id == rule_id) {
                warn!(
                    "{}: {} still fails after a reported fix, reopening",
                    artist.name, rule_id
                );
                self.stores
                    .violations
                    .set_violation_status(&id, ViolationStatus::Open)?;
            }
        }
        self.resolve_stale(artist, target, rules, &after.violations)?;
        Ok(())
    }

    /// Run the fixer the automation mode allows, if any.
    async fn dispatch(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
        mode: AutomationMode,
    ) -> Option<FixResult> {
        if !violation.fixable {
            return None;
        }
        match mode {
            AutomationMode::Disabled => None,
            AutomationMode::Manual => {
                let Some(fixer) = self.fixers.find_discovering(violation) else {
                    debug!(
                        "{}: no discovery-capable fixer for manual rule {}",
                        artist.name, violation.rule_id
                    );
                    return None;
                };
                let mut discovery = violation.clone();
                discovery.config.discovery_only = true;
                Some(attempt(fixer.as_ref(), ctx, artist, &discovery).await)
            }
            AutomationMode::Auto => {
                let fixer = self.fixers.find(violation)?;
                Some(attempt(fixer.as_ref(), ctx, artist, violation).await)
            }
        }
    }

    /// Close open or pending rows whose rule now passes, and rows of rules
    /// that are disabled, unregistered or gone. Rows of enabled manual rules
    /// are left for a person to close.
    fn resolve_stale(
        &self,
        artist: &Artist,
        target: Option<&str>,
        rules: &[Rule],
        still_violated: &[Violation],
    ) -> Result<(), PipelineError> {
        let in_scope = |id: &str| target.map_or(true, |t| t == id);
        let failing: HashSet<&str> = still_violated.iter().map(|v| v.rule_id.as_str()).collect();
        let registered = |r: &&Rule| self.engine.registry().get(&r.id).is_some();
        let passing: HashSet<&str> = rules
            .iter()
            .filter(|r| r.enabled && r.automation_mode != AutomationMode::Manual)
            .filter(registered)
            .map(|r| r.id.as_str())
            .filter(|id| !failing.contains(id))
            .collect();
        let active: HashSet<&str> = rules
            .iter()
            .filter(|r| r.enabled)
            .filter(registered)
            .map(|r| r.id.as_str())
            .collect();

        for row in self.stores.violations.list_violations_for_artist(&artist.id)? {
            let open = matches!(
                row.status,
                ViolationStatus::Open | ViolationStatus::PendingChoice
            );
            let rule_id = row.rule_id.as_str();
            if !open || !in_scope(rule_id) {
                continue;
            }
            if passing.contains(rule_id) {
                debug!("{}: {} now passes, resolving", artist.name, rule_id);
            } else if !active.contains(rule_id) {
                debug!("{}: {} is no longer active, resolving", artist.name, rule_id);
            } else {
                continue;
            }
            self.stores
                .violations
                .set_violation_status(&row.id, ViolationStatus::Resolved)?;
        }
        Ok(())
    }

    /// Install the candidate a person picked for a pending violation.
    pub async fn apply_candidate(
        &self,
        violation_id: &str,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<FixResult, PipelineError> {
        let row = self
            .stores
            .violations
            .get_violation(violation_id)?
            .ok_or_else(|| PipelineError::ViolationNotFound(violation_id.to_string()))?;
        if row.status != ViolationStatus::PendingChoice {
            return Err(PipelineError::NotPendingChoice(violation_id.to_string()));
        }
        let candidate = row.candidates.get(index).cloned().ok_or(
            PipelineError::CandidateOutOfRange {
                index,
                available: row.candidates.len(),
            },
        )?;
        let rule = self
            .stores
            .rules
            .get_rule(&row.rule_id)?
            .ok_or_else(|| PipelineError::UnknownRule(row.rule_id.clone()))?;
        let mut artist = self
            .stores
            .artists
            .get_artist(&row.artist_id)?
            .ok_or_else(|| PipelineError::ArtistNotFound(row.artist_id.clone()))?;

        let violation = Violation {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            category: rule.category,
            severity: row.severity,
            message: row.message.clone(),
            fixable: row.fixable,
            config: rule.config.clone(),
        };
        let fixer = self
            .fixers
            .find_discovering(&violation)
            .ok_or_else(|| PipelineError::NoFixer(rule.id.clone()))?;

        let ctx = FixContext::new(cancel.clone());
        let result = match fixer
            .apply_candidate(&ctx, &mut artist, &rule.id, &candidate, &rule.config)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Applying candidate {} failed: {:#}", candidate.url, e);
                FixResult::not_fixed(&rule.id, format!("{:#}", e))
            }
        };

        if result.fixed {
            self.stores.artists.save_artist(&artist)?;
            let evaluation = self.engine.evaluate(&artist)?;
            self.stores
                .artists
                .update_health_score(&artist.id, evaluation.health_score)?;
            if evaluation.violations.iter().any(|v| v.rule_id == rule.id) {
                warn!(
                    "Candidate {} applied to '{}' but {} still fails",
                    index, artist.name, rule.id
                );
            } else {
                self.stores
                    .violations
                    .set_violation_status(violation_id, ViolationStatus::Resolved)?;
                info!(
                    "Applied candidate {} to '{}' for {}",
                    index, artist.name, rule.id
                );
            }
        }
        Ok(result)
    }
}

/// Run one fixer, turning unexpected failures into an unfixed result.
async fn attempt(
    fixer: &dyn Fixer,
    ctx: &FixContext,
    artist: &mut Artist,
    violation: &Violation,
) -> FixResult {
    match fixer.fix(ctx, artist, violation).await {
        Ok(result) => result,
        Err(e) => {
            warn!(
                "{} fixer failed on '{}' for {}: {:#}",
                fixer.name(),
                artist.name,
                violation.rule_id,
                e
            );
            FixResult::not_fixed(
                &violation.rule_id,
                format!("{} fixer failed: {:#}", fixer.name(), e),
            )
        }
    }
}
