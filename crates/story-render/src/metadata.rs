//! Interconnection metadata block
//!
//! Appended after the canonical document once cross-story linking is done.
//! The block sits between two HTML comment markers; applying it again
//! replaces the previous block instead of stacking a second one.

use crate::renderer::escape_markdown;
use std::fmt::Write as _;
use story_document::StoryInterconnections;

/// Opens the metadata block
pub const BEGIN_MARKER: &str = "<!-- story-interconnections:begin -->";

/// Closes the metadata block
pub const END_MARKER: &str = "<!-- story-interconnections:end -->";

/// Heading of the metadata block
pub const INTERCONNECTIONS_HEADING: &str = "Interconnections";

/// Remove a previously appended block, if any
#[must_use]
pub fn strip_interconnections(rendered: &str) -> &str {
    let Some(begin) = rendered.find(BEGIN_MARKER) else {
        return rendered;
    };
    let tail = &rendered[begin..];
    match tail.find(END_MARKER) {
        Some(end) if rendered[begin + end + END_MARKER.len()..].trim().is_empty() => {
            rendered[..begin].trim_end()
        }
        Some(_) | None => rendered,
    }
}

/// Markdown for the metadata block, `None` when nothing was recorded
#[must_use]
pub fn render_interconnections(links: &StoryInterconnections) -> Option<String> {
    if links.is_empty() {
        return None;
    }
    let mut parts = vec![format!("## {INTERCONNECTIONS_HEADING}")];

    if !links.ui_mapping.is_empty() {
        let lines: Vec<String> = links
            .ui_mapping
            .iter()
            .map(|(term, component)| format!("- {} → {component}", escape_markdown(term)))
            .collect();
        parts.push(format!("### UI Mapping\n\n{}", lines.join("\n")));
    }

    if !links.contract_dependencies.is_empty() {
        let lines: Vec<String> = links
            .contract_dependencies
            .iter()
            .map(|id| format!("- {id}"))
            .collect();
        parts.push(format!("### Contract Dependencies\n\n{}", lines.join("\n")));
    }

    let ownership = &links.ownership;
    let rows = [
        ("Owns state", &ownership.owns_state),
        ("Consumes state", &ownership.consumes_state),
        ("Emits events", &ownership.emits_events),
        ("Listens to events", &ownership.listens_to_events),
    ];
    let lines: Vec<String> = rows
        .iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(label, ids)| format!("- **{label}:** {}", ids.join(", ")))
        .collect();
    if !lines.is_empty() {
        parts.push(format!("### Ownership\n\n{}", lines.join("\n")));
    }

    let groups = links.grouped_relationships();
    if !groups.is_empty() {
        let mut section = String::from("### Related Stories");
        // writing into a String cannot fail
        for (kind, related) in groups {
            let _ = write!(section, "\n\n#### {}\n", kind.heading());
            for r in related {
                let _ = match r.description.as_deref().map(escape_markdown) {
                    Some(d) if !d.is_empty() => write!(section, "\n- {}: {d}", r.story_id),
                    _ => write!(section, "\n- {}", r.story_id),
                };
            }
        }
        parts.push(section);
    }

    Some(parts.join("\n\n"))
}

/// Append (or replace) the metadata block on rendered text
///
/// Idempotent: applying the same interconnections twice yields the same
/// bytes as applying them once.
#[must_use]
pub fn append_interconnections(rendered: &str, links: &StoryInterconnections) -> String {
    let base = strip_interconnections(rendered).trim_end();
    let Some(block) = render_interconnections(links) else {
        return format!("{base}\n");
    };
    tracing::trace!(story = %links.story_id, "appending interconnection metadata");
    if base.is_empty() {
        format!("{BEGIN_MARKER}\n{block}\n{END_MARKER}\n")
    } else {
        format!("{base}\n\n{BEGIN_MARKER}\n{block}\n{END_MARKER}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use story_document::{Ownership, RelatedStory, RelationshipKind};

    fn links() -> StoryInterconnections {
        let mut links = StoryInterconnections::new("story-checkout");
        links
            .ui_mapping
            .insert("Pay button".into(), "COMP-PAY-BUTTON".into());
        links.add_contract_dependency("API-POST-PAYMENTS");
        links.ownership = Ownership {
            owns_state: vec!["STATE-CART".into()],
            emits_events: vec!["EVT-ORDER-PLACED".into()],
            ..Ownership::default()
        };
        links.add_related(RelatedStory::new("story-receipt", RelationshipKind::Dependent));
        links.add_related(
            RelatedStory::new("story-login", RelationshipKind::Prerequisite)
                .with_description("needs a session"),
        );
        links
    }

    #[test]
    fn renders_grouped_block() {
        let out = append_interconnections("# Checkout\n", &links());
        let expected = "\
# Checkout

<!-- story-interconnections:begin -->
## Interconnections

### UI Mapping

- Pay button → COMP-PAY-BUTTON

### Contract Dependencies

- API-POST-PAYMENTS

### Ownership

- **Owns state:** STATE-CART
- **Emits events:** EVT-ORDER-PLACED

### Related Stories

#### Prerequisite

- story-login: needs a session

#### Dependent

- story-receipt
<!-- story-interconnections:end -->
";
        assert_eq!(out, expected);
    }

    #[test]
    fn appending_twice_is_idempotent() {
        let once = append_interconnections("# Checkout\n", &links());
        let twice = append_interconnections(&once, &links());
        assert_eq!(once, twice);
    }

    #[test]
    fn new_links_replace_old_block() {
        let once = append_interconnections("# Checkout\n", &links());
        let mut fewer = StoryInterconnections::new("story-checkout");
        fewer.add_contract_dependency("API-GET-CART");
        let replaced = append_interconnections(&once, &fewer);
        assert!(replaced.contains("API-GET-CART"));
        assert!(!replaced.contains("API-POST-PAYMENTS"));
        assert_eq!(replaced.matches(BEGIN_MARKER).count(), 1);
    }

    #[test]
    fn empty_links_leave_document_untouched() {
        let once = append_interconnections("# Checkout\n", &links());
        let cleared = append_interconnections(&once, &StoryInterconnections::new("x"));
        assert_eq!(cleared, "# Checkout\n");
    }
}
