//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestLibrary, ARTIST_1_ID, ARTIST_1_NAME};
//! use catalog_auditor::rules::AutomationMode;
//!
//! #[tokio::test]
//! async fn test_evaluate_artist() {
//!     let library = TestLibrary::with_rules(&["nfo_exists"], AutomationMode::Auto);
//!     let artist = library.add_artist(ARTIST_1_ID, ARTIST_1_NAME);
//!     let result = library.engine().evaluate(&artist).unwrap();
//!     assert_eq!(result.rules_total, 1);
//! }
//! ```

mod constants;
mod fakes;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
#[allow(unused_imports)]
pub use fakes::*;
pub use fixtures::TestLibrary;
