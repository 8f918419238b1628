use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    FetchMetadata,
    FetchImages,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::FetchMetadata => "fetch_metadata",
            BulkOperation::FetchImages => "fetch_images",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch_metadata" => Some(BulkOperation::FetchMetadata),
            "fetch_images" => Some(BulkOperation::FetchImages),
            _ => None,
        }
    }
}

/// How ambiguous provider answers are handled during a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Take the top hit, whatever it is.
    Yolo,
    /// Take the top hit only when it is a strong match.
    PromptNoMatch,
    /// Take a hit only when it is the single strong match.
    Disambiguate,
    /// Never assign anything automatically.
    Manual,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::Yolo => "yolo",
            ResolutionMode::PromptNoMatch => "prompt_no_match",
            ResolutionMode::Disambiguate => "disambiguate",
            ResolutionMode::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yolo" => Some(ResolutionMode::Yolo),
            "prompt_no_match" => Some(ResolutionMode::PromptNoMatch),
            "disambiguate" => Some(ResolutionMode::Disambiguate),
            "manual" => Some(ResolutionMode::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkJobStatus {
    Pending,
    Running,
    Completed,
    Canceled,
    Failed,
}

impl BulkJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkJobStatus::Pending => "pending",
            BulkJobStatus::Running => "running",
            BulkJobStatus::Completed => "completed",
            BulkJobStatus::Canceled => "canceled",
            BulkJobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BulkJobStatus::Pending),
            "running" => Some(BulkJobStatus::Running),
            "completed" => Some(BulkJobStatus::Completed),
            "canceled" => Some(BulkJobStatus::Canceled),
            "failed" => Some(BulkJobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkJobStatus::Completed | BulkJobStatus::Canceled | BulkJobStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkJob {
    pub id: String,
    pub operation: BulkOperation,
    pub mode: ResolutionMode,
    pub status: BulkJobStatus,
    pub total_items: usize,
    pub processed_items: usize,
    pub fixed_items: usize,
    pub skipped_items: usize,
    pub failed_items: usize,
    /// Explicit targets; empty means every non-excluded artist.
    pub artist_ids: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkJob {
    pub fn new(operation: BulkOperation, mode: ResolutionMode, artist_ids: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            mode,
            status: BulkJobStatus::Pending,
            total_items: 0,
            processed_items: 0,
            fixed_items: 0,
            skipped_items: 0,
            failed_items: 0,
            artist_ids,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Count one processed item.
    pub fn record(&mut self, status: BulkItemStatus) {
        self.processed_items += 1;
        match status {
            BulkItemStatus::Fixed => self.fixed_items += 1,
            BulkItemStatus::Skipped => self.skipped_items += 1,
            BulkItemStatus::Failed => self.failed_items += 1,
            BulkItemStatus::Pending => {}
        }
    }

    pub fn finish(&mut self, status: BulkJobStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkItemStatus {
    Pending,
    Fixed,
    Skipped,
    Failed,
}

impl BulkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkItemStatus::Pending => "pending",
            BulkItemStatus::Fixed => "fixed",
            BulkItemStatus::Skipped => "skipped",
            BulkItemStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BulkItemStatus::Pending),
            "fixed" => Some(BulkItemStatus::Fixed),
            "skipped" => Some(BulkItemStatus::Skipped),
            "failed" => Some(BulkItemStatus::Failed),
            _ => None,
        }
    }
}

/// Outcome for one artist within a bulk job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkJobItem {
    pub id: i64,
    pub job_id: String,
    pub artist_id: String,
    pub artist_name: String,
    pub status: BulkItemStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for starting a bulk job.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub operation: BulkOperation,
    pub mode: ResolutionMode,
    pub artist_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counters() {
        let mut job = BulkJob::new(BulkOperation::FetchImages, ResolutionMode::Yolo, vec![]);
        job.record(BulkItemStatus::Fixed);
        job.record(BulkItemStatus::Skipped);
        job.record(BulkItemStatus::Skipped);
        job.record(BulkItemStatus::Failed);
        assert_eq!(job.processed_items, 4);
        assert_eq!(job.fixed_items, 1);
        assert_eq!(job.skipped_items, 2);
        assert_eq!(job.failed_items, 1);
    }

    #[test]
    fn test_enum_strings_round_trip() {
        for mode in [
            ResolutionMode::Yolo,
            ResolutionMode::PromptNoMatch,
            ResolutionMode::Disambiguate,
            ResolutionMode::Manual,
        ] {
            assert_eq!(ResolutionMode::parse(mode.as_str()), Some(mode));
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
        }
        for status in [
            BulkJobStatus::Pending,
            BulkJobStatus::Running,
            BulkJobStatus::Completed,
            BulkJobStatus::Canceled,
            BulkJobStatus::Failed,
        ] {
            assert_eq!(BulkJobStatus::parse(status.as_str()), Some(status));
        }
        assert!(!BulkJobStatus::Running.is_terminal());
        assert!(BulkJobStatus::Canceled.is_terminal());
    }
}
