//! Story Document Model
//!
//! Structured per-story documents and the typed edits that mutate them.
//!
//! # Core Concepts
//!
//! - [`Document`]: title, narrative and eight ordered collections
//! - [`SectionPath`]: closed set of patchable locations, with wire names and id prefixes
//! - [`Patch`]: the advisor ↔ engine interchange shape
//! - [`StoryInterconnections`]: cross-story links extracted after convergence
//! - [`Fingerprint`]: Blake3 digest for optimistic concurrency on patch batches
//!
//! # Example
//!
//! ```rust
//! use story_document::{CollectionPath, Document, SectionPath};
//!
//! let doc = Document::new("Checkout");
//! let path: SectionPath = "outcomeAcceptanceCriteria".parse().unwrap();
//! assert_eq!(path.id_prefix(), Some("AC-OUT-"));
//! assert!(doc.collection(CollectionPath::OutcomeAcceptanceCriteria).is_empty());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod fingerprint;
mod interconnect;
mod patch;
mod path;

pub use document::{
    CollectionMut, CollectionRef, Document, Entry, ImplementationNotes, Item, Narrative,
    UiMappingEntry,
};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use interconnect::{Ownership, RelatedStory, RelationshipKind, StoryInterconnections};
pub use patch::{Patch, PatchBatch, PatchItem, PatchMatch, PatchMetadata, PatchOp, PatchParseError};
pub use path::{
    CollectionPath, ImplNoteKey, NarrativeField, PathError, SectionPath, MAX_TEXT_LEN,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
