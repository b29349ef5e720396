use lsp_types::PositionEncodingKind;

/// Offset encoding for LSP positions.
///
/// LSP uses UTF-16 by default, but servers can negotiate different encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetEncoding {
	/// UTF-8 byte offsets.
	Utf8,
	/// UTF-16 code unit offsets (LSP default).
	#[default]
	Utf16,
	/// UTF-32 / Unicode codepoint offsets.
	Utf32,
}

impl OffsetEncoding {
	/// Parse from LSP position encoding kind.
	pub fn from_lsp(kind: &PositionEncodingKind) -> Option<Self> {
		match kind.as_str() {
			"utf-8" => Some(Self::Utf8),
			"utf-16" => Some(Self::Utf16),
			"utf-32" => Some(Self::Utf32),
			_ => None,
		}
	}

	/// The LSP position encoding kind for this encoding.
	pub fn to_lsp(self) -> PositionEncodingKind {
		match self {
			Self::Utf8 => PositionEncodingKind::UTF8,
			Self::Utf16 => PositionEncodingKind::UTF16,
			Self::Utf32 => PositionEncodingKind::UTF32,
		}
	}

	/// Picks the encoding for a session from the client's advertised list.
	///
	/// UTF-16 wins whenever it is offered or nothing is advertised, as every client must
	/// support it. Otherwise the client's first supported preference is used.
	pub fn negotiate(offered: Option<&[PositionEncodingKind]>) -> Self {
		let Some(offered) = offered.filter(|kinds| !kinds.is_empty()) else {
			return Self::Utf16;
		};
		if offered.contains(&PositionEncodingKind::UTF16) {
			return Self::Utf16;
		}
		offered.iter().find_map(Self::from_lsp).unwrap_or(Self::Utf16)
	}

	/// Width of `ch` in this encoding's units.
	pub fn char_width(self, ch: char) -> usize {
		match self {
			Self::Utf8 => ch.len_utf8(),
			Self::Utf16 => ch.len_utf16(),
			Self::Utf32 => 1,
		}
	}

	/// Width of `text` in this encoding's units.
	pub fn str_width(self, text: &str) -> usize {
		match self {
			Self::Utf8 => text.len(),
			Self::Utf16 => text.encode_utf16().count(),
			Self::Utf32 => text.chars().count(),
		}
	}
}
