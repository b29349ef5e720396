//! Incremental edit engine.
//!
//! Applies `textDocument/didChange` content changes to a rope. The input rope is
//! never modified; every call yields a new rope that shares unchanged chunks with
//! the old one, so readers holding the previous snapshot are unaffected.
//!
//! Ranged positions are resolved in the negotiated [`OffsetEncoding`]. A column past
//! the end of its line clamps to the end of the line's content and a line past the
//! end of the document clamps to the end of the document. A range whose start lies
//! after its end is rejected.

use lsp_types::{Position, TextDocumentContentChangeEvent};
use lumen_lsp::{OffsetEncoding, lsp_position_to_char_clamped};
use ropey::Rope;

use crate::error::EditError;

/// Applies one content change.
///
/// # Errors
///
/// [`EditError::InvalidRange`] when the change's range is reversed.
pub fn apply_change(text: &Rope, change: &TextDocumentContentChangeEvent, encoding: OffsetEncoding) -> Result<Rope, EditError> {
	let Some(range) = change.range else {
		return Ok(Rope::from_str(&change.text));
	};
	if is_reversed(range.start, range.end) {
		return Err(EditError::InvalidRange {
			start: range.start,
			end: range.end,
		});
	}

	let start = lsp_position_to_char_clamped(text, range.start, encoding);
	let end = lsp_position_to_char_clamped(text, range.end, encoding);
	let mut next = text.clone();
	next.remove(start..end);
	next.insert(start, &change.text);
	Ok(next)
}

/// Applies content changes in order, each against the result of the previous one.
///
/// # Errors
///
/// The first [`EditError`]; no partial result is returned.
pub fn apply_changes(text: &Rope, changes: &[TextDocumentContentChangeEvent], encoding: OffsetEncoding) -> Result<Rope, EditError> {
	changes
		.iter()
		.try_fold(text.clone(), |acc, change| apply_change(&acc, change, encoding))
}

fn is_reversed(start: Position, end: Position) -> bool {
	(start.line, start.character) > (end.line, end.character)
}
