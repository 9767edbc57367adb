//! Stable Identifier Registry
//!
//! Deterministic, collision-free identifiers for system-level entities
//! (components, screens, services, contracts, state, events) referenced
//! across a story corpus.
//!
//! # Lifecycle
//!
//! 1. Discovery mints ids through [`IdentifierRegistry::mint`]
//! 2. [`IdentifierRegistry::freeze`] ends the mutable phase
//! 3. Every later stage reads the shared [`RegistrySnapshot`]
//!
//! # Example
//!
//! ```rust
//! use story_ids::{EntityKind, IdentifierRegistry};
//!
//! let registry = IdentifierRegistry::new();
//! let id = registry.mint(EntityKind::Component, "Login Button");
//! assert_eq!(id.as_str(), "COMP-LOGIN-BUTTON");
//!
//! let snapshot = registry.freeze();
//! assert!(snapshot.contains_id("COMP-LOGIN-BUTTON"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod kind;
mod registry;

pub use kind::{base_id, normalize_name, EntityKind, UnknownEntityKind, SEPARATOR};
pub use registry::{
    issued_with_prefix, IdentifierRegistry, Registration, RegistrySnapshot, StableId,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
