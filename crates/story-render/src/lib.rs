//! Story Document Renderer
//!
//! Deterministic projection of a [`Document`](story_document::Document) into
//! canonical markdown, the interconnection metadata appender, and a
//! section reader for rendered text.
//!
//! # Example
//!
//! ```rust
//! use story_document::{Document, Item};
//! use story_render::{read_sections, render};
//!
//! let mut doc = Document::new("Checkout");
//! doc.edge_cases.push(Item::new("EDGE-1", "Card declined"));
//! let text = render(&doc);
//! assert!(text.contains("- [EDGE-1] Card declined"));
//! assert_eq!(read_sections(&text)[1].heading, "Edge Cases");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod metadata;
mod renderer;
mod sections;

pub use metadata::{
    append_interconnections, render_interconnections, strip_interconnections, BEGIN_MARKER,
    END_MARKER, INTERCONNECTIONS_HEADING,
};
pub use renderer::{
    canonical_rank, escape_markdown, render, DocumentRenderer, CANONICAL_SECTIONS,
    IMPLEMENTATION_NOTES_HEADING, STORY_HEADING, UNTITLED,
};
pub use sections::{duplicate_sections, read_sections, title_of, write_sections, SectionBlock};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
