use super::{FixContext, FixResult, Fixer};
use crate::artist::{Artist, ImageType};
use crate::imaging;
use crate::naming::NamingProfile;
use crate::rules::{Violation, DEFAULT_PADDING_THRESHOLD};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

/// Crops transparent margins off the logo.
pub struct LogoTrimFixer {
    naming: NamingProfile,
}

impl LogoTrimFixer {
    pub fn new(naming: NamingProfile) -> Self {
        Self { naming }
    }
}

#[async_trait]
impl Fixer for LogoTrimFixer {
    fn name(&self) -> &'static str {
        "logo_trim"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        violation.rule_id == "logo_padding"
    }

    async fn fix(
        &self,
        _ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult> {
        let rule_id = violation.rule_id.clone();
        let Some(path) = self.naming.find_existing(&artist.path, ImageType::Logo) else {
            return Ok(FixResult::not_fixed(&rule_id, "No logo on disk"));
        };
        let threshold = violation
            .config
            .padding_threshold
            .unwrap_or(DEFAULT_PADDING_THRESHOLD);

        let task_path = path.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<Option<(u32, u32)>> {
            let img = imaging::decode_file(&task_path)
                .with_context(|| format!("Cannot decode {:?}", task_path))?;
            let within = imaging::padding(&img).map_or(true, |p| p.max_side() <= threshold);
            if within {
                return Ok(None);
            }
            let Some(bounds) = imaging::opaque_bounds(&img) else {
                return Ok(None);
            };
            let cropped = img.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height);
            imaging::write_atomic(&cropped, &task_path)?;
            Ok(Some((bounds.width, bounds.height)))
        })
        .await
        .context("Logo trim task panicked")??;

        match outcome {
            Some((width, height)) => {
                artist.touch();
                info!("Trimmed {:?} to {}x{}", path, width, height);
                Ok(FixResult::fixed(
                    &rule_id,
                    format!("Trimmed logo to {}x{}", width, height),
                ))
            }
            None => Ok(FixResult::not_fixed(
                &rule_id,
                "Logo padding is already within threshold",
            )),
        }
    }
}
