use super::{FixContext, FixResult, Fixer};
use crate::artist::Artist;
use crate::naming::NamingProfile;
use crate::rules::Violation;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Deletes image files that are not canonical for the naming profile.
pub struct ExtraneousFixer {
    naming: NamingProfile,
}

impl ExtraneousFixer {
    pub fn new(naming: NamingProfile) -> Self {
        Self { naming }
    }
}

#[async_trait]
impl Fixer for ExtraneousFixer {
    fn name(&self) -> &'static str {
        "extraneous"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        violation.rule_id == "extraneous_images"
    }

    async fn fix(
        &self,
        _ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult> {
        let files = self.naming.extraneous_images(&artist.path);
        if files.is_empty() {
            return Ok(FixResult::fixed(
                &violation.rule_id,
                "No extraneous images left",
            ));
        }

        let mut removed = 0;
        let mut failed = Vec::new();
        for file in &files {
            match tokio::fs::remove_file(file).await {
                Ok(()) => {
                    info!("Removed extraneous image {:?}", file);
                    removed += 1;
                }
                Err(e) => {
                    warn!("Failed to remove {:?}: {}", file, e);
                    failed.push(file.display().to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(FixResult::fixed(
                &violation.rule_id,
                format!("Removed {} extraneous image(s)", removed),
            ))
        } else {
            Ok(FixResult::not_fixed(
                &violation.rule_id,
                format!("Could not remove {}", failed.join(", ")),
            ))
        }
    }
}
