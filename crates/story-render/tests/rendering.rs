//! Rendering properties over generated documents

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use story_document::{Document, Item, Narrative, UiMappingEntry};
use story_render::{
    append_interconnections, duplicate_sections, read_sections, render, title_of,
    CANONICAL_SECTIONS,
};

fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 *_#<>|\\[\\]`\\n-]{0,40}"
}

fn items(prefix: &'static str) -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(text(), 0..4).prop_map(move |texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| Item::new(format!("{prefix}{}", i + 1), t))
            .collect()
    })
}

fn document() -> impl Strategy<Value = Document> {
    (
        text(),
        (text(), text(), text()),
        items("UVB-"),
        items("AC-OUT-"),
        items("IMPL-FLOW-"),
        items("EDGE-"),
        prop::collection::vec((text(), text()), 0..3),
    )
        .prop_map(|(title, (a, w, s), uvb, ac, flow, edge, ui)| {
            let mut doc = Document::new(title).with_story(Narrative::new(a, w, s));
            doc.user_visible_behavior = uvb;
            doc.outcome_acceptance_criteria = ac;
            doc.implementation_notes.data_flow = flow;
            doc.edge_cases = edge;
            doc.ui_mapping = ui
                .into_iter()
                .enumerate()
                .map(|(i, (term, comp))| UiMappingEntry::new(format!("UI-MAP-{}", i + 1), term, comp))
                .collect();
            doc
        })
}

proptest! {
    #[test]
    fn rendering_is_byte_identical(doc in document()) {
        prop_assert_eq!(render(&doc), render(&doc.clone()));
    }

    #[test]
    fn rendered_sections_are_canonical_and_unique(doc in document()) {
        let text = render(&doc);
        prop_assert!(!text.contains("\n\n\n"));
        prop_assert!(text.ends_with('\n') && !text.ends_with("\n\n"));

        let blocks = read_sections(&text);
        prop_assert!(duplicate_sections(&blocks).is_empty());
        prop_assert!(title_of(&blocks).is_some());

        let ranks: Vec<usize> = blocks
            .iter()
            .filter(|b| b.level == 2)
            .filter_map(|b| CANONICAL_SECTIONS.iter().position(|h| b.is(h)))
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        prop_assert_eq!(ranks, sorted);
    }
}

#[test]
fn metadata_follows_document() {
    let mut doc = Document::new("Checkout");
    doc.outcome_acceptance_criteria
        .push(Item::new("AC-OUT-1", "User sees confirmation"));

    let mut links = story_document::StoryInterconnections::new("story-1");
    links.add_contract_dependency("API-POST-PAYMENTS");

    let text = append_interconnections(&render(&doc), &links);
    let headings: Vec<_> = read_sections(&text)
        .into_iter()
        .map(|b| b.heading)
        .collect();
    assert_eq!(
        headings,
        vec![
            "Checkout",
            "Outcome Acceptance Criteria",
            "Interconnections",
            "Contract Dependencies",
        ]
    );
}
