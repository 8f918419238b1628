//! Concrete background jobs.

pub mod library_scan;
pub mod rule_compliance;
pub mod violation_cleanup;

pub use library_scan::LibraryScanJob;
pub use rule_compliance::RuleComplianceJob;
pub use violation_cleanup::ViolationCleanupJob;
