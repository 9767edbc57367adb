//! Rewrite stage
//!
//! Sends judge violations and the current text to the [`Rewriter`]
//! capability, refuses degenerate replies, then applies two deterministic
//! passes to whatever it accepts:
//!
//! 1. lines flagged as technical are moved out of the behavior and outcome
//!    sections into `## Implementation Notes`, text unchanged; the three
//!    narrative lines under `## Story` always stay put
//! 2. duplicate sections are merged, keeping every unique line, sections
//!    left empty are dropped, and the rest go back in canonical order

use crate::capability::{RewriteRequest, Rewriter};
use crate::error::{EvaluationError, RewriteError, Stage};
use crate::judge::{JudgeRubric, Violation, ViolationCategory};
use std::fmt;
use std::sync::Arc;
use story_document::ImplNoteKey;
use story_render::{
    canonical_rank, escape_markdown, read_sections, title_of, write_sections, SectionBlock,
    IMPLEMENTATION_NOTES_HEADING, STORY_HEADING,
};

/// Level-2 sections whose technical lines are moved out
const USER_FACING: [&str; 2] = ["User-Visible Behavior", "Outcome Acceptance Criteria"];

/// Subsection used when a technical violation names none
const DEFAULT_TARGET: ImplNoteKey = ImplNoteKey::DataFlow;

/// A level-2 section with its nested subsections
#[derive(Debug, Clone)]
struct Section {
    head: SectionBlock,
    children: Vec<SectionBlock>,
}

/// Rewrite stage over an injected [`Rewriter`] capability
#[derive(Clone)]
pub struct StoryRewriter {
    rewriter: Arc<dyn Rewriter>,
}

impl fmt::Debug for StoryRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryRewriter").finish_non_exhaustive()
    }
}

impl StoryRewriter {
    /// Create rewrite stage
    #[inline]
    #[must_use]
    pub fn new(rewriter: Arc<dyn Rewriter>) -> Self {
        Self { rewriter }
    }

    /// Produce a corrected document
    ///
    /// # Errors
    /// [`RewriteError::Evaluation`] when the call fails; `Empty`, `Fenced` or
    /// `Partial` when the reply is degenerate
    pub async fn rewrite(
        &self,
        story_id: &str,
        text: &str,
        rubric: &JudgeRubric,
    ) -> Result<String, RewriteError> {
        let request = RewriteRequest {
            story_id: story_id.to_string(),
            text: text.to_string(),
            violations: rubric.violations.clone(),
            duplicate_sections: rubric.duplicate_sections.clone(),
        };
        let raw = self
            .rewriter
            .rewrite(&request)
            .await
            .map_err(|source| EvaluationError::failed(Stage::Rewrite, story_id, source))?;

        check_degenerate(text, &raw)?;
        let technical: Vec<&Violation> = rubric.violations_of(ViolationCategory::Technical).collect();
        let corrected = consolidate(&raw, &technical);
        tracing::debug!(
            story = story_id,
            moved = technical.len(),
            bytes = corrected.len(),
            "accepted rewrite"
        );
        Ok(corrected)
    }
}

/// Reject empty, fenced or partial output
///
/// # Errors
/// Returns the degenerate kind found
pub fn check_degenerate(input: &str, output: &str) -> Result<(), RewriteError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(RewriteError::Empty);
    }
    if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
        return Err(RewriteError::Fenced);
    }

    let before = read_sections(input);
    let after = read_sections(output);
    let mut missing = Vec::new();
    if title_of(&before).is_some() && title_of(&after).is_none() {
        missing.push("title".to_string());
    }
    for block in before.iter().filter(|b| b.level == 2) {
        let present = after.iter().any(|b| b.level == 2 && b.is(&block.heading));
        let label = format!("## {}", block.heading);
        if !present && !missing.contains(&label) {
            missing.push(label);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RewriteError::Partial { missing })
    }
}

/// Move technical lines, merge duplicate sections, restore canonical order
#[must_use]
pub fn consolidate(markdown: &str, technical: &[&Violation]) -> String {
    let (mut preamble, mut sections) = group(read_sections(markdown));
    move_technical(&mut sections, technical);
    let sections = merge(sections);

    let mut blocks = Vec::new();
    blocks.append(&mut preamble);
    for section in sections {
        blocks.push(section.head);
        blocks.extend(section.children);
    }
    write_sections(&blocks)
}

/// Split blocks into leading blocks (preamble, title) and level-2 sections
fn group(blocks: Vec<SectionBlock>) -> (Vec<SectionBlock>, Vec<Section>) {
    let mut leading = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    for block in blocks {
        if block.level == 2 {
            sections.push(Section {
                head: block,
                children: Vec::new(),
            });
            continue;
        }
        match sections.last_mut() {
            Some(section) if block.level > 2 => section.children.push(block),
            Some(section) if block.level != 1 => section.head.lines.extend(block.lines),
            _ => leading.push(block),
        }
    }
    (leading, sections)
}

fn move_technical(sections: &mut Vec<Section>, technical: &[&Violation]) {
    for violation in technical {
        let needle = violation.text.trim();
        if needle.is_empty() {
            continue;
        }
        let escaped = escape_markdown(needle);
        let mut moved = Vec::new();
        for section in sections
            .iter_mut()
            .filter(|s| USER_FACING.iter().any(|h| s.head.is(h)))
        {
            section.head.lines.retain(|line| {
                let hit = line.contains(needle) || line.contains(&escaped);
                if hit {
                    moved.push(strip_item_id(line));
                }
                !hit
            });
        }
        if moved.is_empty() {
            continue;
        }

        let key = violation
            .target_section
            .as_deref()
            .and_then(ImplNoteKey::parse)
            .unwrap_or(DEFAULT_TARGET);
        let notes = implementation_notes(sections);
        match notes.children.iter_mut().find(|c| c.is(key.heading())) {
            Some(sub) => sub.lines.extend(moved),
            None => notes
                .children
                .push(SectionBlock::new(key.heading(), 3, moved)),
        }
    }
}

fn implementation_notes(sections: &mut Vec<Section>) -> &mut Section {
    let position = sections
        .iter()
        .position(|s| s.head.is(IMPLEMENTATION_NOTES_HEADING))
        .unwrap_or_else(|| {
            sections.push(Section {
                head: SectionBlock::new(IMPLEMENTATION_NOTES_HEADING, 2, Vec::new()),
                children: Vec::new(),
            });
            sections.len() - 1
        });
    &mut sections[position]
}

/// `- [UVB-2] Calls the API` → `- Calls the API`
fn strip_item_id(line: &str) -> String {
    let body = line.strip_prefix("- ").unwrap_or(line);
    let body = match body.strip_prefix('[').and_then(|rest| rest.split_once("] ")) {
        Some((id, rest)) if !id.is_empty() && !id.contains(' ') => rest,
        _ => body,
    };
    format!("- {body}")
}

fn merge(sections: Vec<Section>) -> Vec<Section> {
    let mut merged: Vec<Section> = Vec::new();
    for section in sections {
        match merged.iter_mut().find(|m| m.head.is(&section.head.heading)) {
            Some(existing) => {
                push_unique(&mut existing.head.lines, section.head.lines);
                for child in section.children {
                    match existing.children.iter_mut().find(|c| c.is(&child.heading)) {
                        Some(target) => push_unique(&mut target.lines, child.lines),
                        None => existing.children.push(child),
                    }
                }
            }
            None => merged.push(section),
        }
    }

    for section in &mut merged {
        let lines = std::mem::take(&mut section.head.lines);
        push_unique(&mut section.head.lines, lines);
        for child in &mut section.children {
            let lines = std::mem::take(&mut child.lines);
            push_unique(&mut child.lines, lines);
        }
        if section.head.is(IMPLEMENTATION_NOTES_HEADING) {
            section.children.sort_by_key(|c| subsection_rank(&c.heading));
        }
    }

    merged.retain(|s| s.head.is(STORY_HEADING) || !s.head.lines.is_empty() || !s.children.is_empty());
    merged.sort_by_key(|s| canonical_rank(&s.head.heading).unwrap_or(usize::MAX));
    merged
}

fn subsection_rank(heading: &str) -> usize {
    ImplNoteKey::ALL
        .iter()
        .position(|k| k.heading().eq_ignore_ascii_case(heading.trim()))
        .unwrap_or(usize::MAX)
}

fn push_unique(into: &mut Vec<String>, from: Vec<String>) {
    for line in from {
        if !into.contains(&line) {
            into.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rubric_json, FixedRewriter};
    use pretty_assertions::assert_eq;

    const INPUT: &str = "\
# Checkout

## Story

- **As a** shopper

## User-Visible Behavior

- [UVB-1] Pay button shows the saved card

## Edge Cases

- [EDGE-1] Card declined
";

    #[test]
    fn degenerate_outputs_are_rejected() {
        assert!(matches!(check_degenerate(INPUT, "  \n"), Err(RewriteError::Empty)));
        assert!(matches!(
            check_degenerate(INPUT, "```markdown\n# Checkout\n```"),
            Err(RewriteError::Fenced)
        ));
        let partial = check_degenerate(INPUT, "# Checkout\n\n## Story\n\n- **As a** shopper\n");
        match partial {
            Err(RewriteError::Partial { missing }) => assert_eq!(
                missing,
                vec!["## User-Visible Behavior".to_string(), "## Edge Cases".to_string()]
            ),
            other => panic!("expected partial, got {other:?}"),
        }
        let untitled = check_degenerate(INPUT, "## Story\n\n## User-Visible Behavior\n\n## Edge Cases\n");
        assert!(matches!(untitled, Err(RewriteError::Partial { missing }) if missing == vec!["title"]));
        assert!(check_degenerate(INPUT, INPUT).is_ok());
    }

    #[test]
    fn technical_lines_move_verbatim() {
        let text = "\
# Checkout

## User-Visible Behavior

- [UVB-1] Pay button shows the saved card
- [UVB-2] Client calls POST /payments with the card token

## Implementation Notes

### Security

- [IMPL-SEC-1] Token never leaves the vault
";
        let violation = Violation::technical("POST /payments", "API detail").into_section("apiContracts");
        let out = consolidate(text, &[&violation]);
        let expected = "\
# Checkout

## User-Visible Behavior

- [UVB-1] Pay button shows the saved card

## Implementation Notes

### API Contracts

- Client calls POST /payments with the card token

### Security

- [IMPL-SEC-1] Token never leaves the vault
";
        assert_eq!(out, expected);
    }

    #[test]
    fn technical_lines_default_to_data_flow_and_create_notes() {
        let text = "# T\n\n## Outcome Acceptance Criteria\n\n- [AC-OUT-1] Redux store updates cart\n";
        let violation = Violation::technical("Redux store", "state detail");
        let out = consolidate(text, &[&violation]);
        assert_eq!(
            out,
            "# T\n\n## Implementation Notes\n\n### Data Flow\n\n- Redux store updates cart\n"
        );
    }

    #[test]
    fn narrative_lines_never_move() {
        let text = "\
# Pay

## Story

- **As a** shopper
- **I want** the client to call POST /payments
- **So that** I can pay

## User-Visible Behavior

- [UVB-1] Client sends POST /payments on submit
";
        let violation = Violation::technical("POST /payments", "API detail");
        let expected = "\
# Pay

## Story

- **As a** shopper
- **I want** the client to call POST /payments
- **So that** I can pay

## Implementation Notes

### Data Flow

- Client sends POST /payments on submit
";
        assert_eq!(consolidate(text, &[&violation]), expected);
    }

    #[test]
    fn empty_story_section_is_kept_other_empty_sections_dropped() {
        let text = "# T\n\n## Story\n\n## Edge Cases\n\n## Non-Goals\n\n- [NON-GOAL-1] Refunds\n";
        assert_eq!(
            consolidate(text, &[]),
            "# T\n\n## Story\n\n## Non-Goals\n\n- [NON-GOAL-1] Refunds\n"
        );
    }

    #[test]
    fn duplicate_sections_merge_in_canonical_order() {
        let text = "\
# Checkout

## Edge Cases

- [EDGE-1] Card declined

## Appendix

- extra

## Story

- **As a** shopper

## Edge Cases

- [EDGE-1] Card declined
- [EDGE-2] Network drops
";
        let expected = "\
# Checkout

## Story

- **As a** shopper

## Edge Cases

- [EDGE-1] Card declined
- [EDGE-2] Network drops

## Appendix

- extra
";
        assert_eq!(consolidate(text, &[]), expected);
    }

    #[test]
    fn strips_only_real_ids() {
        assert_eq!(strip_item_id("- [UVB-2] Calls API"), "- Calls API");
        assert_eq!(strip_item_id("- **As a** dev"), "- **As a** dev");
        assert_eq!(strip_item_id("- [see this] link"), "- [see this] link");
    }

    #[tokio::test]
    async fn call_failure_is_evaluation() {
        let stage = StoryRewriter::new(Arc::new(FixedRewriter(Err("offline".into()))));
        let rubric = JudgeRubric::parse(&rubric_json(2.0)).unwrap();
        let err = stage.rewrite("story-1", INPUT, &rubric).await.unwrap_err();
        assert!(!err.is_degenerate());
    }

    #[tokio::test]
    async fn accepted_rewrite_is_consolidated() {
        let reply = format!("{INPUT}\n## Edge Cases\n\n- [EDGE-2] Network drops\n");
        let stage = StoryRewriter::new(Arc::new(FixedRewriter(Ok(reply))));
        let rubric = JudgeRubric::parse(&rubric_json(2.0)).unwrap();
        let out = stage.rewrite("story-1", INPUT, &rubric).await.unwrap();
        assert_eq!(out.matches("## Edge Cases").count(), 1);
        assert!(out.contains("- [EDGE-1] Card declined\n- [EDGE-2] Network drops"));
    }
}
