//! Conversion between LSP positions and rope char offsets.
//!
//! LSP addresses text by `(line, character)` where `character` counts units of the
//! negotiated [`OffsetEncoding`] within the line. Ropes address text by char index.
//! Columns past the end of a line clamp to the end of its content, i.e. before the
//! line terminator. A column that falls inside a multi-unit char rounds down to the
//! start of that char.

use lsp_types::{Position, Range};
use ropey::{Rope, RopeSlice};

use crate::OffsetEncoding;

/// Converts an LSP position to a char index.
///
/// Returns `None` when the line does not exist.
pub fn lsp_position_to_char(text: &Rope, pos: Position, encoding: OffsetEncoding) -> Option<usize> {
	let line = usize::try_from(pos.line).ok()?;
	if line >= text.len_lines() {
		return None;
	}
	let column = usize::try_from(pos.character).ok()?;
	Some(text.line_to_char(line) + column_to_char_offset(text.line(line), column, encoding))
}

/// Converts an LSP position to a char index, clamping lines past the end of the
/// document to the end of the document.
pub fn lsp_position_to_char_clamped(text: &Rope, pos: Position, encoding: OffsetEncoding) -> usize {
	lsp_position_to_char(text, pos, encoding).unwrap_or_else(|| text.len_chars())
}

/// Converts a char index to an LSP position.
///
/// Returns `None` when the index is past the end of the document.
pub fn char_to_lsp_position(text: &Rope, char_idx: usize, encoding: OffsetEncoding) -> Option<Position> {
	if char_idx > text.len_chars() {
		return None;
	}
	let line = text.char_to_line(char_idx);
	let line_start = text.line_to_char(line);
	let column: usize = text
		.slice(line_start..char_idx)
		.chars()
		.map(|ch| encoding.char_width(ch))
		.sum();
	Some(Position {
		line: u32::try_from(line).ok()?,
		character: u32::try_from(column).ok()?,
	})
}

/// Converts an LSP range to a pair of char indices.
pub fn lsp_range_to_char_range(text: &Rope, range: Range, encoding: OffsetEncoding) -> Option<(usize, usize)> {
	let start = lsp_position_to_char(text, range.start, encoding)?;
	let end = lsp_position_to_char(text, range.end, encoding)?;
	Some((start, end))
}

/// Converts a pair of char indices to an LSP range.
pub fn char_range_to_lsp_range(text: &Rope, start: usize, end: usize, encoding: OffsetEncoding) -> Option<Range> {
	Some(Range {
		start: char_to_lsp_position(text, start, encoding)?,
		end: char_to_lsp_position(text, end, encoding)?,
	})
}

/// Number of chars in `line` excluding its terminator.
///
/// Only `\n`, `\r\n` and `\r` end a line. Other Unicode separators are content.
pub(crate) fn line_content_len(line: RopeSlice<'_>) -> usize {
	let len = line.len_chars();
	let Some(last) = len.checked_sub(1).map(|i| line.char(i)) else {
		return 0;
	};
	match last {
		'\n' if len >= 2 && line.char(len - 2) == '\r' => len - 2,
		'\n' | '\r' => len - 1,
		_ => len,
	}
}

fn column_to_char_offset(line: RopeSlice<'_>, column: usize, encoding: OffsetEncoding) -> usize {
	let content_len = line_content_len(line);
	let mut units = 0;
	for (idx, ch) in line.chars().take(content_len).enumerate() {
		let width = encoding.char_width(ch);
		if units + width > column {
			return idx;
		}
		units += width;
	}
	content_len
}
