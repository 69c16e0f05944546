//! # Specification Parsing
//!
//! Streaming decode of OpenAPI/Swagger JSON files with progress reporting,
//! fault recovery, skeleton enforcement and version-specific validation.
//!
//! The stages compose left to right: [`stream::StreamParser`] produces an
//! order-preserving document, [`structure::validate_structure`] checks the
//! OpenAPI skeleton, [`validation::validate_spec`] applies version rules.
//! Recoverable problems accumulate as [`recovery::ParseIssue`]s; the
//! ingestion pipeline decides what is fatal based on its strict policy.

pub mod progress;
pub mod recovery;
pub mod stream;
pub mod structure;
pub mod validation;

pub use progress::{ProgressEvent, ProgressReporter};
pub use recovery::{
    repair_trailing_commas, repair_unescaped_quotes, strategy_for, IssueAccumulator, ParseFault,
    ParseIssue, RecoveryStrategy,
};
pub use stream::{ParseMetrics, ParsedSpec, StreamParser};
pub use structure::validate_structure;
pub use validation::{detect_version, validate_spec, SpecVersion, ValidationReport};
