//! Open document store.
//!
//! Each open document lives in its own slot: a reader/writer lock around the current
//! [`DocumentSnapshot`]. Writers build the next snapshot from the current one and swap
//! it in; readers clone the `Arc` and drop the lock immediately, so a long-running
//! request keeps its snapshot alive without ever blocking an edit. Slots of different
//! documents never contend with each other.
//!
//! Slot locks are synchronous and must not be held across an `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use lsp_types::{TextDocumentContentChangeEvent, TextDocumentItem, Uri};
use lumen_lsp::OffsetEncoding;
use parking_lot::RwLock;
use ropey::Rope;
use tracing::{debug, warn};

use crate::edit;
use crate::error::StoreError;

/// Immutable view of a document at one version.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
	/// Document URI.
	pub uri: Uri,
	/// Client-assigned version.
	pub version: i32,
	/// Language identifier sent on open.
	pub language_id: String,
	/// Full text.
	pub text: Rope,
}

impl DocumentSnapshot {
	/// Creates a snapshot from a `didOpen` item.
	#[must_use]
	pub fn from_item(item: TextDocumentItem) -> Self {
		Self {
			text: Rope::from_str(&item.text),
			uri: item.uri,
			version: item.version,
			language_id: item.language_id,
		}
	}
}

#[derive(Debug)]
struct DocumentSlot {
	current: RwLock<Arc<DocumentSnapshot>>,
}

impl DocumentSlot {
	fn new(snapshot: Arc<DocumentSnapshot>) -> Arc<Self> {
		Arc::new(Self {
			current: RwLock::new(snapshot),
		})
	}

	fn load(&self) -> Arc<DocumentSnapshot> {
		Arc::clone(&*self.current.read())
	}
}

/// Concurrent map of open documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
	documents: DashMap<Uri, Arc<DocumentSlot>>,
}

impl DocumentStore {
	/// Creates an empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs a freshly opened document.
	///
	/// Reopening a document that was never closed is a client bug; the new content
	/// wins and a warning is logged.
	pub fn open(&self, item: TextDocumentItem) -> Arc<DocumentSnapshot> {
		let snapshot = Arc::new(DocumentSnapshot::from_item(item));
		let previous = self
			.documents
			.insert(snapshot.uri.clone(), DocumentSlot::new(Arc::clone(&snapshot)));
		match previous {
			Some(_) => warn!(uri = snapshot.uri.as_str(), "document opened twice; replacing it"),
			None => debug!(uri = snapshot.uri.as_str(), version = snapshot.version, "document opened"),
		}
		snapshot
	}

	/// Applies a `didChange` and returns the new snapshot.
	///
	/// Nothing is stored unless every change applies.
	///
	/// # Errors
	///
	/// - [`StoreError::UnknownDocument`] if the URI is not open.
	/// - [`StoreError::StaleVersion`] if `version` does not exceed the current one.
	/// - [`StoreError::Edit`] if a change is malformed.
	pub fn apply_change(
		&self,
		uri: &Uri,
		version: i32,
		changes: &[TextDocumentContentChangeEvent],
		encoding: OffsetEncoding,
	) -> Result<Arc<DocumentSnapshot>, StoreError> {
		// Take the slot out of the map so the shard lock is not held while editing.
		let slot = self
			.documents
			.get(uri)
			.map(|entry| Arc::clone(entry.value()))
			.ok_or_else(|| StoreError::UnknownDocument(uri.clone()))?;

		let mut current = slot.current.write();
		if version <= current.version {
			return Err(StoreError::StaleVersion {
				uri: uri.clone(),
				version,
				current: current.version,
			});
		}
		let text = edit::apply_changes(&current.text, changes, encoding)?;
		let next = Arc::new(DocumentSnapshot {
			uri: current.uri.clone(),
			version,
			language_id: current.language_id.clone(),
			text,
		});
		*current = Arc::clone(&next);
		Ok(next)
	}

	/// Forgets a document. Returns whether it was open.
	pub fn close(&self, uri: &Uri) -> bool {
		self.documents.remove(uri).is_some()
	}

	/// The current snapshot of a document.
	#[must_use]
	pub fn snapshot(&self, uri: &Uri) -> Option<Arc<DocumentSnapshot>> {
		// Release the shard guard before taking the slot lock.
		let slot = self.documents.get(uri).map(|entry| Arc::clone(entry.value()))?;
		Some(slot.load())
	}

	/// Number of open documents.
	#[must_use]
	pub fn len(&self) -> usize {
		self.documents.len()
	}

	/// Whether no document is open.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}
}
