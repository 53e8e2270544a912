//! Turns plain text edits into `textDocument/didChange` content changes.
//!
//! Editors that track only "the text was X, now it is Y" can still speak
//! incremental synchronization: [`calculate_change_events`] diffs the two
//! versions and emits one change event per replaced span. These are pure
//! functions with no tie to the client.

use lsp_types::{Position, Range, TextDocumentContentChangeEvent};
use similar::{DiffTag, TextDiff};

/// Computes the minimal list of content changes that turns `old_text` into
/// `new_text` when applied in order.
///
/// Each non-equal span of a character-level Myers diff becomes one event.
/// Ranges are expressed against the intermediate text produced by the
/// preceding events, which is what the protocol expects of a change list.
/// Positions count lines and characters the way the diff sees them, i.e. in
/// Unicode scalar values; `range_length` mirrors that count and is advisory
/// only (the field is deprecated in the protocol but servers still read it).
pub fn calculate_change_events(
    old_text: &str,
    new_text: &str,
) -> Vec<TextDocumentContentChangeEvent> {
    let new_chars: Vec<char> = new_text.chars().collect();
    let diff = TextDiff::from_chars(old_text, new_text);

    let mut events = Vec::new();
    // The text as the server sees it after the events emitted so far.
    let mut adjusted: Vec<char> = old_text.chars().collect();
    let mut offset = 0isize;

    for op in diff.ops() {
        if op.tag() == DiffTag::Equal {
            continue;
        }
        let old_range = op.old_range();
        let new_range = op.new_range();

        let start = (old_range.start as isize + offset) as usize;
        let end = (old_range.end as isize + offset) as usize;
        let replacement: String = new_chars[new_range.clone()].iter().collect();

        offset += new_range.len() as isize - (end - start) as isize;

        let range = Range::new(
            position_at(&adjusted, start),
            position_at(&adjusted, end),
        );
        events.push(TextDocumentContentChangeEvent {
            range: Some(range),
            range_length: Some((end - start) as u32),
            text: replacement.clone(),
        });

        adjusted.splice(start..end, replacement.chars());
    }
    events
}

/// The degenerate change list: replace the whole document.
pub fn whole_document_change(new_text: impl Into<String>) -> TextDocumentContentChangeEvent {
    TextDocumentContentChangeEvent {
        range: None,
        range_length: None,
        text: new_text.into(),
    }
}

fn position_at(chars: &[char], index: usize) -> Position {
    let before = &chars[..index];
    let line = before.iter().filter(|&&c| c == '\n').count() as u32;
    let line_start = before
        .iter()
        .rposition(|&c| c == '\n')
        .map_or(0, |newline| newline + 1);
    Position::new(line, (index - line_start) as u32)
}
