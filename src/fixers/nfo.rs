use super::{FixContext, FixResult, Fixer};
use crate::artist::Artist;
use crate::nfo::{self, ArtistNfo, NFO_FILE_NAME};
use crate::rules::Violation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Writes `artist.nfo` from the artist's current fields.
pub struct NfoFixer;

#[async_trait]
impl Fixer for NfoFixer {
    fn name(&self) -> &'static str {
        "nfo"
    }

    fn can_fix(&self, violation: &Violation) -> bool {
        violation.rule_id == "nfo_exists"
    }

    async fn fix(
        &self,
        _ctx: &FixContext,
        artist: &mut Artist,
        violation: &Violation,
    ) -> Result<FixResult> {
        let path = artist.path.join(NFO_FILE_NAME);

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if let Ok(modified) = meta.modified() {
                let modified: DateTime<Utc> = modified.into();
                if modified > artist.updated_at {
                    warn!(
                        "{:?} was modified externally at {}, leaving it alone",
                        path, modified
                    );
                    return Ok(FixResult::not_fixed(
                        &violation.rule_id,
                        format!("{} was modified externally; not overwriting", NFO_FILE_NAME),
                    ));
                }
            }
        }

        let xml = nfo::render(&ArtistNfo::from_artist(artist))?;
        tokio::fs::write(&path, xml)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;

        artist.nfo_exists = true;
        artist.touch();
        info!("Wrote {:?}", path);
        Ok(FixResult::fixed(
            &violation.rule_id,
            format!("Created {}", NFO_FILE_NAME),
        ))
    }
}
