//! Remediation strategies for rule violations.
//!
//! Fixers are tried in registration order; the first whose `can_fix`
//! claims a violation handles it.

mod extraneous;
mod image;
mod logo_trim;
mod metadata;
mod nfo;

pub use self::image::{pre_download_gate, CandidateCacheKey, GateOutcome, ImageFixer};
pub use extraneous::ExtraneousFixer;
pub use logo_trim::LogoTrimFixer;
pub use metadata::{apply_metadata, MetadataFixer};
pub use nfo::NfoFixer;

use crate::artist::Artist;
use crate::rules::{ImageCandidate, RuleConfig, Violation};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-call context handed to fixers.
#[derive(Clone, Default)]
pub struct FixContext {
    pub cancel: CancellationToken,
}

impl FixContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    pub rule_id: String,
    pub fixed: bool,
    pub message: String,
    pub candidates: Vec<ImageCandidate>,
}

impl FixResult {
    pub fn fixed(rule_id: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            fixed: true,
            message: message.into(),
            candidates: Vec::new(),
        }
    }

    pub fn not_fixed(rule_id: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            fixed: false,
            message: message.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_candidates(
        rule_id: &str,
        message: impl Into<String>,
        candidates: Vec<ImageCandidate>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            fixed: false,
            message: message.into(),
            candidates,
        }
    }
}

#[async_trait]
pub trait Fixer: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_fix(&self, violation: &Violation) -> bool;

    /// Attempt to resolve `violation`, mutating `artist` on success. Cases
    /// the fixer cannot help with come back as `fixed = false`; `Err` is
    /// reserved for unexpected failures.
    async fn fix(
        &self,
        ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult>;

    /// Whether `fix` honours `discovery_only` by returning candidates
    /// without touching anything.
    fn supports_candidate_discovery(&self) -> bool {
        false
    }

    /// Called once before a pipeline pass or bulk job. Fixers that memoise
    /// provider answers drop them here so each pass sees fresh data.
    fn begin_pass(&self) {}

    /// Install a candidate previously offered for `rule_id`.
    async fn apply_candidate(
        &self,
        _ctx: &FixContext,
        _artist: &mut Artist,
        _rule_id: &str,
        _candidate: &ImageCandidate,
        _config: &RuleConfig,
    ) -> Result<FixResult> {
        bail!("{} cannot apply candidates", self.name())
    }
}

/// Ordered fixer list.
#[derive(Clone, Default)]
pub struct FixerSet {
    fixers: Vec<Arc<dyn Fixer>>,
}

impl FixerSet {
    pub fn new(fixers: Vec<Arc<dyn Fixer>>) -> Self {
        Self { fixers }
    }

    pub fn push(&mut self, fixer: Arc<dyn Fixer>) {
        self.fixers.push(fixer);
    }

    pub fn find(&self, violation: &Violation) -> Option<&Arc<dyn Fixer>> {
        self.fixers.iter().find(|f| f.can_fix(violation))
    }

    /// First fixer that both claims the violation and can discover candidates.
    pub fn find_discovering(&self, violation: &Violation) -> Option<&Arc<dyn Fixer>> {
        self.fixers
            .iter()
            .find(|f| f.can_fix(violation) && f.supports_candidate_discovery())
    }

    pub fn begin_pass(&self) {
        for fixer in &self.fixers {
            fixer.begin_pass();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fixers.is_empty()
    }
}
