//! Document → canonical markdown
//!
//! Pure projection: no clock, no randomness, no hash-ordered iteration.
//! Section order, heading text and id prefixes are a compatibility contract
//! with downstream tools.

use story_document::{CollectionPath, CollectionRef, Document, ImplNoteKey, NarrativeField};

/// Heading of the narrative section
pub const STORY_HEADING: &str = "Story";

/// Heading grouping the seven implementation-note subsections
pub const IMPLEMENTATION_NOTES_HEADING: &str = "Implementation Notes";

/// Title used when a document has none
pub const UNTITLED: &str = "Untitled story";

/// Level-2 headings in canonical order
pub const CANONICAL_SECTIONS: [&str; 9] = [
    STORY_HEADING,
    "User-Visible Behavior",
    "Outcome Acceptance Criteria",
    "System Acceptance Criteria",
    IMPLEMENTATION_NOTES_HEADING,
    "UI Mapping",
    "Open Questions",
    "Edge Cases",
    "Non-Goals",
];

/// Collections rendered as their own level-2 section before implementation notes
const LEADING: [CollectionPath; 3] = [
    CollectionPath::UserVisibleBehavior,
    CollectionPath::OutcomeAcceptanceCriteria,
    CollectionPath::SystemAcceptanceCriteria,
];

/// Collections rendered as their own level-2 section after implementation notes
const TRAILING: [CollectionPath; 4] = [
    CollectionPath::UiMapping,
    CollectionPath::OpenQuestions,
    CollectionPath::EdgeCases,
    CollectionPath::NonGoals,
];

/// Position of a level-2 heading in canonical order
#[must_use]
pub fn canonical_rank(heading: &str) -> Option<usize> {
    CANONICAL_SECTIONS
        .iter()
        .position(|h| h.eq_ignore_ascii_case(heading.trim()))
}

/// Escape markdown-special characters and fold line breaks into single spaces
#[must_use]
pub fn escape_markdown(text: &str) -> String {
    let folded = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::with_capacity(folded.len());
    for c in folded.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '#' | '<' | '>' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Canonical markdown renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentRenderer;

impl DocumentRenderer {
    /// Create new renderer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render a document
    ///
    /// Empty sections are omitted; sections are separated by exactly one
    /// blank line and the output ends with a single newline.
    #[must_use]
    pub fn render(&self, document: &Document) -> String {
        let mut blocks: Vec<String> = Vec::new();

        let title = document.title.trim();
        let title = if title.is_empty() { UNTITLED } else { title };
        blocks.push(format!("# {}", escape_markdown(title)));

        let narrative: Vec<String> = NarrativeField::ALL
            .into_iter()
            .filter_map(|field| {
                let text = escape_markdown(document.story.get(field));
                (!text.is_empty()).then(|| format!("- **{}** {text}", field.label()))
            })
            .collect();
        push_section(&mut blocks, 2, STORY_HEADING, &narrative);

        for path in LEADING {
            push_section(&mut blocks, 2, path.heading(), &entry_lines(document.collection(path)));
        }

        if !document.implementation_notes.is_empty() {
            blocks.push(format!("## {IMPLEMENTATION_NOTES_HEADING}"));
            for key in ImplNoteKey::ALL {
                let path = CollectionPath::ImplementationNotes(key);
                push_section(&mut blocks, 3, key.heading(), &entry_lines(document.collection(path)));
            }
        }

        for path in TRAILING {
            push_section(&mut blocks, 2, path.heading(), &entry_lines(document.collection(path)));
        }

        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }
}

/// Render with the default renderer
#[inline]
#[must_use]
pub fn render(document: &Document) -> String {
    DocumentRenderer::new().render(document)
}

fn push_section(blocks: &mut Vec<String>, level: usize, heading: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    blocks.push(format!("{} {heading}\n\n{}", "#".repeat(level), lines.join("\n")));
}

fn entry_lines(entries: CollectionRef<'_>) -> Vec<String> {
    match entries {
        CollectionRef::Items(items) => items
            .iter()
            .map(|item| item_line(&item.id, &escape_markdown(&item.text)))
            .collect(),
        CollectionRef::UiMapping(entries) => entries
            .iter()
            .map(|entry| {
                let body = format!(
                    "{} → {}",
                    escape_markdown(&entry.product_term),
                    escape_markdown(&entry.component_name)
                );
                item_line(&entry.id, &body)
            })
            .collect(),
    }
}

fn item_line(id: &str, body: &str) -> String {
    if id.is_empty() {
        format!("- {body}")
    } else {
        format!("- [{id}] {body}")
    }
}
