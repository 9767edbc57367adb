//! Story Patch Engine
//!
//! Validation and atomic application of advisor-proposed patches.
//!
//! # Core Concepts
//!
//! - [`PatchValidator`]: structural/semantic gate; accumulates every semantic issue
//! - [`PatchOrchestrator`]: applies a batch to a working copy, one winner per target
//! - [`BatchOutcome`]: updated document plus applied and rejected records
//!
//! # Example
//!
//! ```rust
//! use story_document::{Document, Patch, PatchBatch, PatchItem};
//! use story_patch::PatchOrchestrator;
//!
//! let doc = Document::new("Checkout");
//! let patch = Patch::add(
//!     "outcomeAcceptanceCriteria",
//!     PatchItem::item("AC-OUT-1", "User sees confirmation"),
//!     "validation",
//! );
//! let outcome = PatchOrchestrator::new().apply(&doc, PatchBatch::new(vec![patch]));
//! assert_eq!(outcome.document.outcome_acceptance_criteria.len(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod orchestrator;
mod validator;

pub use orchestrator::{
    AppliedPatch, BatchOutcome, PatchOrchestrator, RejectedPatch, RejectionReason,
};
pub use validator::{
    is_valid_id, resolve_match, IssueKind, PatchValidator, Validation, ValidationIssue,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
