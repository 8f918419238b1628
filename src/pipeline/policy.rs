use crate::fixers::FixResult;
use crate::rules::{AutomationMode, ViolationStatus};

/// Inbox status for a violation after the pipeline handled it.
///
/// `result` is `None` when no fixer was invoked. Only `Auto` rules may be
/// resolved here; a result carrying candidates without a fix waits for a
/// choice.
pub fn decide_persisted_status(
    mode: AutomationMode,
    result: Option<&FixResult>,
) -> ViolationStatus {
    let Some(result) = result else {
        return ViolationStatus::Open;
    };
    match mode {
        AutomationMode::Disabled => ViolationStatus::Open,
        _ if !result.fixed && !result.candidates.is_empty() => ViolationStatus::PendingChoice,
        AutomationMode::Auto if result.fixed => ViolationStatus::Resolved,
        _ => ViolationStatus::Open,
    }
}
