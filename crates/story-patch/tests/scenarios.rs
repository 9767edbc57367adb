//! Batch application scenarios against the public API

use pretty_assertions::assert_eq;
use story_document::{Document, Item, Patch, PatchBatch, PatchItem, PatchMatch, MAX_TEXT_LEN};
use story_patch::{IssueKind, PatchOrchestrator, PatchValidator, RejectionReason};

fn confirmation() -> Patch {
    let raw = r#"{"path":"outcomeAcceptanceCriteria","op":"add",
                  "item":{"id":"AC-OUT-1","text":"User sees confirmation"},
                  "metadata":{"advisorId":"validation"}}"#;
    serde_json::from_str(raw).unwrap()
}

#[test]
fn add_then_readd_reports_duplicate() {
    let orchestrator = PatchOrchestrator::new();
    let empty = Document::new("Checkout");

    let first = orchestrator.apply(&empty, PatchBatch::new(vec![confirmation()]));
    assert!(first.is_clean());
    assert_eq!(
        first.document.outcome_acceptance_criteria,
        vec![Item::new("AC-OUT-1", "User sees confirmation")]
    );

    let second = orchestrator.apply(&first.document, PatchBatch::new(vec![confirmation()]));
    assert!(!second.changed());
    let messages: Vec<String> = second.rejected[0]
        .issues()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        messages,
        vec![r#"Duplicate id "AC-OUT-1" in outcomeAcceptanceCriteria"#.to_string()]
    );
    assert_eq!(second.document, first.document);
}

#[test]
fn three_semantic_errors_at_once() {
    let patch = Patch::add(
        "systemAcceptanceCriteria",
        PatchItem::item("SYS 1", "z".repeat(MAX_TEXT_LEN + 20)),
        "validation",
    );
    let validation = PatchValidator::new().validate(&patch, &Document::new("Checkout"));
    assert_eq!(validation.errors.len(), 3);
    assert!(validation
        .errors
        .iter()
        .all(|e| e.kind() == IssueKind::Semantic));
    assert_eq!(
        validation.messages(),
        vec![
            "text in systemAcceptanceCriteria exceeds 500 characters (520)".to_string(),
            r#"Invalid id format "SYS 1" in systemAcceptanceCriteria"#.to_string(),
            r#"Id "SYS 1" in systemAcceptanceCriteria must start with "AC-SYS-""#.to_string(),
        ]
    );
}

#[test]
fn batch_reports_every_rejection_with_a_reason() {
    let mut doc = Document::new("Checkout");
    doc.open_questions
        .push(Item::new("QUESTION-1", "Do we support wallets?"));

    let batch = PatchBatch::new(vec![
        Patch::replace(
            "openQuestions",
            Some(PatchMatch::by_text("Do we support wallets?")),
            PatchItem::item("QUESTION-1", "Which wallets do we support?"),
            "product",
        ),
        Patch::remove("openQuestions", PatchMatch::by_id("QUESTION-1"), "qa"),
        Patch::remove("openQuestions", PatchMatch::by_id("QUESTION-7"), "qa"),
        Patch::add("nonGoals", PatchItem::item("NON-GOAL-1", "Crypto"), ""),
    ]);
    let outcome = PatchOrchestrator::new().apply(&doc, batch);

    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.rejected.len(), 3);
    assert!(matches!(
        outcome.rejected[0].reason,
        RejectionReason::Conflict { winner: 0, .. }
    ));
    assert_eq!(
        outcome.rejected[1].reason.to_string(),
        r#"invalid patch: No entry in openQuestions matches id "QUESTION-7""#
    );
    assert_eq!(
        outcome.rejected[2].issues()[0].kind(),
        IssueKind::Structural
    );
    assert_eq!(
        outcome.document.open_questions[0].text,
        "Which wallets do we support?"
    );
}

#[test]
fn parsed_advisor_reply_applies_end_to_end() {
    let raw = r#"{"patches":[
        {"path":"story.iWant","op":"replace","item":{"text":"to pay in one tap"},"metadata":{"advisorId":"narrative"}},
        {"path":"uiMapping","op":"add","item":{"id":"UI-MAP-1","productTerm":"Pay button","componentName":"PayButton"},"metadata":{"advisorId":"ui"}},
        {"path":"implementationNotes.loadingStates","op":"add","item":{"id":"IMPL-LOAD-1","text":"Spinner while authorising"},"metadata":{"advisorId":"ux"}}
    ]}"#;
    let patches = Patch::parse_list(raw).unwrap();
    let outcome = PatchOrchestrator::new().apply(&Document::new("Checkout"), PatchBatch::new(patches));

    assert!(outcome.is_clean(), "{:?}", outcome.rejected);
    assert_eq!(outcome.document.story.i_want, "to pay in one tap");
    assert_eq!(outcome.document.ui_mapping[0].component_name, "PayButton");
    assert_eq!(
        outcome.document.implementation_notes.loading_states[0].id,
        "IMPL-LOAD-1"
    );
    let advisors: Vec<_> = outcome.applied.iter().map(|a| a.advisor_id.as_str()).collect();
    assert_eq!(advisors, vec!["narrative", "ui", "ux"]);
}
