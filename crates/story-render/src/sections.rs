//! Rendered markdown → ordered section blocks
//!
//! The judge and the rewriter both work on rendered text. This reader uses
//! pulldown-cmark to find real headings (a `#` inside a code block or an
//! escaped `\#` is not one) and keeps the body lines verbatim.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One heading and the non-blank lines under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionBlock {
    /// Heading text; empty for content before the first heading
    pub heading: String,
    /// 1-6, or 0 for the preamble
    pub level: u8,
    /// Raw markdown lines, trimmed, blank lines dropped
    pub lines: Vec<String>,
}

impl SectionBlock {
    /// New block
    #[must_use]
    pub fn new(heading: impl Into<String>, level: u8, lines: Vec<String>) -> Self {
        Self {
            heading: heading.into(),
            level,
            lines,
        }
    }

    /// Whether this block's heading is `heading` (case-insensitive)
    #[inline]
    #[must_use]
    pub fn is(&self, heading: &str) -> bool {
        self.heading.trim().eq_ignore_ascii_case(heading.trim())
    }
}

struct HeadingSpan {
    level: u8,
    text: String,
    range: Range<usize>,
}

fn heading_spans(markdown: &str) -> Vec<HeadingSpan> {
    let mut spans = Vec::new();
    let mut current: Option<HeadingSpan> = None;

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(HeadingSpan {
                    level: level as u8,
                    text: String::new(),
                    range,
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(span) = current.as_mut() {
                    span.text.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(span) = current.take() {
                    spans.push(span);
                }
            }
            _ => {}
        }
    }
    spans
}

fn body_lines(markdown: &str, range: Range<usize>) -> Vec<String> {
    markdown
        .get(range)
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split rendered markdown into blocks in document order
///
/// Every heading starts a new block regardless of level. Content before the
/// first heading becomes a level-0 block with an empty heading, and only if
/// it is non-blank.
#[must_use]
pub fn read_sections(markdown: &str) -> Vec<SectionBlock> {
    let spans = heading_spans(markdown);
    let mut blocks = Vec::with_capacity(spans.len() + 1);

    let first_start = spans.first().map_or(markdown.len(), |s| s.range.start);
    let preamble = body_lines(markdown, 0..first_start);
    if !preamble.is_empty() {
        blocks.push(SectionBlock::new("", 0, preamble));
    }

    for (i, span) in spans.iter().enumerate() {
        let end = spans.get(i + 1).map_or(markdown.len(), |next| next.range.start);
        let body = body_lines(markdown, span.range.end..end);
        blocks.push(SectionBlock::new(span.text.trim(), span.level, body));
    }
    blocks
}

/// Write blocks back as markdown, one blank line between blocks
#[must_use]
pub fn write_sections(blocks: &[SectionBlock]) -> String {
    let rendered: Vec<String> = blocks
        .iter()
        .filter_map(|block| {
            let body = block.lines.join("\n");
            if block.level == 0 {
                return (!body.is_empty()).then_some(body);
            }
            let heading = format!("{} {}", "#".repeat(usize::from(block.level)), block.heading);
            Some(if body.is_empty() {
                heading
            } else {
                format!("{heading}\n\n{body}")
            })
        })
        .collect();
    let mut out = rendered.join("\n\n");
    out.push('\n');
    out
}

/// Level-2 headings that occur more than once, with their counts
///
/// Headings compare case-insensitively; the first spelling seen is reported.
#[must_use]
pub fn duplicate_sections(blocks: &[SectionBlock]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for block in blocks.iter().filter(|b| b.level == 2) {
        match counts.iter_mut().find(|(h, _)| block.is(h)) {
            Some((_, n)) => *n += 1,
            None => counts.push((block.heading.clone(), 1)),
        }
    }
    counts.retain(|(_, n)| *n > 1);
    counts
}

/// Title of the document: text of the first level-1 heading
#[must_use]
pub fn title_of(blocks: &[SectionBlock]) -> Option<&str> {
    blocks
        .iter()
        .find(|b| b.level == 1)
        .map(|b| b.heading.as_str())
}
