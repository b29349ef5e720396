//! Language features answered from a document snapshot.
//!
//! Providers only ever see an immutable [`DocumentSnapshot`], so they run on request
//! tasks without touching the store's locks.

use std::collections::BTreeSet;

use lsp_types::{
	CompletionItem, CompletionItemKind, CompletionResponse, Hover, HoverContents, MarkupContent, MarkupKind, Position,
};
use lumen_lsp::{OffsetEncoding, char_range_to_lsp_range, lsp_position_to_char};
use ropey::Rope;

use crate::vfs::DocumentSnapshot;

/// Marker keywords offered by completion.
const KEYWORDS: [&str; 2] = ["TODO", "FIXME"];

/// Answers hover and completion requests.
pub trait FeatureProvider: Send + Sync + 'static {
	/// Hover at `position`, or `None` when there is nothing to show.
	fn hover(&self, doc: &DocumentSnapshot, position: Position, encoding: OffsetEncoding) -> Option<Hover>;

	/// Completion candidates at `position`.
	fn completion(&self, doc: &DocumentSnapshot, position: Position, encoding: OffsetEncoding) -> Option<CompletionResponse>;
}

/// Word-based features for plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFeatures;

impl FeatureProvider for DefaultFeatures {
	fn hover(&self, doc: &DocumentSnapshot, position: Position, encoding: OffsetEncoding) -> Option<Hover> {
		let cursor = lsp_position_to_char(&doc.text, position, encoding)?;
		let (start, end) = word_at(&doc.text, cursor)?;
		let word = doc.text.slice(start..end).to_string();
		let range = char_range_to_lsp_range(&doc.text, start, end, encoding)?;
		let value = format!(
			"**{word}**\n\nline {}, column {} of `{}` (version {})",
			range.start.line + 1,
			range.start.character + 1,
			doc.uri.as_str(),
			doc.version,
		);
		Some(Hover {
			contents: HoverContents::Markup(MarkupContent {
				kind: MarkupKind::Markdown,
				value,
			}),
			range: Some(range),
		})
	}

	fn completion(&self, doc: &DocumentSnapshot, position: Position, encoding: OffsetEncoding) -> Option<CompletionResponse> {
		let cursor = lsp_position_to_char(&doc.text, position, encoding)?;
		let prefix_start = scan_back(&doc.text, cursor);
		let prefix = doc.text.slice(prefix_start..cursor).to_string();

		let text = doc.text.to_string();
		let words: BTreeSet<&str> = text
			.split(|c: char| !is_word_char(c))
			.filter(|w| w.chars().count() >= 2 && w.starts_with(prefix.as_str()) && *w != prefix)
			.collect();

		let mut items: Vec<CompletionItem> = words
			.into_iter()
			.filter(|w| !KEYWORDS.contains(w))
			.map(|w| CompletionItem {
				label: w.to_owned(),
				kind: Some(CompletionItemKind::TEXT),
				..CompletionItem::default()
			})
			.collect();
		items.extend(
			KEYWORDS
				.iter()
				.filter(|k| k.starts_with(prefix.as_str()) && **k != prefix)
				.map(|k| CompletionItem {
					label: (*k).to_owned(),
					kind: Some(CompletionItemKind::KEYWORD),
					..CompletionItem::default()
				}),
		);
		items.sort_by(|a, b| a.label.cmp(&b.label));
		Some(CompletionResponse::Array(items))
	}
}

fn is_word_char(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

/// Start of the word run ending at `cursor`.
fn scan_back(text: &Rope, cursor: usize) -> usize {
	let mut start = cursor;
	while start > 0 && is_word_char(text.char(start - 1)) {
		start -= 1;
	}
	start
}

/// The word containing `cursor`, or ending right at it.
fn word_at(text: &Rope, cursor: usize) -> Option<(usize, usize)> {
	let len = text.len_chars();
	let anchor = if cursor < len && is_word_char(text.char(cursor)) {
		cursor
	} else if cursor > 0 && is_word_char(text.char(cursor - 1)) {
		cursor - 1
	} else {
		return None;
	};
	let start = scan_back(text, anchor);
	let mut end = anchor + 1;
	while end < len && is_word_char(text.char(end)) {
		end += 1;
	}
	Some((start, end))
}

#[cfg(test)]
mod tests {
	use lsp_types::Range;
	use pretty_assertions::assert_eq;

	use super::*;

	fn doc(text: &str) -> DocumentSnapshot {
		DocumentSnapshot {
			uri: "file:///hover_test.txt".parse().unwrap(),
			version: 1,
			language_id: "plaintext".into(),
			text: Rope::from_str(text),
		}
	}

	fn labels(response: Option<CompletionResponse>) -> Vec<String> {
		match response {
			Some(CompletionResponse::Array(items)) => items.into_iter().map(|i| i.label).collect(),
			other => panic!("unexpected completion response: {other:?}"),
		}
	}

	#[test]
	fn hover_shows_word_under_cursor() {
		let hover = DefaultFeatures
			.hover(&doc("hello world"), Position::new(0, 2), OffsetEncoding::Utf16)
			.unwrap();
		let HoverContents::Markup(content) = hover.contents else {
			panic!("expected markup");
		};
		assert!(content.value.contains("hello"));
		assert_eq!(hover.range, Some(Range::new(Position::new(0, 0), Position::new(0, 5))));
	}

	#[test]
	fn hover_at_word_end_and_on_whitespace() {
		let doc = doc("hello  world");
		assert!(DefaultFeatures.hover(&doc, Position::new(0, 5), OffsetEncoding::Utf16).is_some());
		assert!(DefaultFeatures.hover(&doc, Position::new(0, 6), OffsetEncoding::Utf16).is_none());
		assert!(DefaultFeatures.hover(&doc, Position::new(3, 0), OffsetEncoding::Utf16).is_none());
	}

	#[test]
	fn hover_range_after_astral_chars() {
		let hover = DefaultFeatures
			.hover(&doc("🌍 globe"), Position::new(0, 4), OffsetEncoding::Utf16)
			.unwrap();
		assert_eq!(hover.range, Some(Range::new(Position::new(0, 3), Position::new(0, 8))));
	}

	#[test]
	fn completion_offers_document_words_and_markers() {
		let doc = doc("test testing tested t\nTOTAL");
		let got = labels(DefaultFeatures.completion(&doc, Position::new(1, 2), OffsetEncoding::Utf16));
		assert_eq!(got, ["TODO", "TOTAL"]);

		let got = labels(DefaultFeatures.completion(&doc, Position::new(0, 4), OffsetEncoding::Utf16));
		assert_eq!(got, ["tested", "testing"]);
	}

	#[test]
	fn completion_without_prefix_lists_everything() {
		let got = labels(DefaultFeatures.completion(&doc("b a ab"), Position::new(0, 2), OffsetEncoding::Utf16));
		assert_eq!(got, ["FIXME", "TODO", "ab"]);
	}
}
