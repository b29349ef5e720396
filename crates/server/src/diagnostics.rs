//! Lexical diagnostics and their debounced publication.
//!
//! [`compute`] scans a snapshot line by line for marker words. [`DiagnosticsScheduler`]
//! decides *when* to compute: every schedule for a URI supersedes the previous one,
//! and only the newest computation may publish.
//!
//! The flow for one schedule:
//!
//! 1. The session's main loop calls [`DiagnosticsScheduler::schedule`], which stamps a
//!    new generation and cancels the pending task of that URI.
//! 2. The spawned task waits out the debounce window, reads the *latest* snapshot,
//!    computes, and hands a [`DiagnosticsComputed`] back to the main loop as an event.
//! 3. The main loop calls [`DiagnosticsScheduler::complete`]; the result is published
//!    only if its generation is still the current one for the URI.
//!
//! Since steps 1 and 3 both run on the main loop, a close (which forgets the URI) can
//! never be followed by a publish for it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range, Uri};
use lumen_lsp::{ClientSocket, OffsetEncoding};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::vfs::{DocumentSnapshot, DocumentStore};

/// Message of the `TODO` rule.
pub const TODO_MESSAGE: &str = "TODO comment found";
/// Message of the `FIXME` rule.
pub const FIXME_MESSAGE: &str = "FIXME comment found";

struct Rule {
	marker: &'static str,
	severity: DiagnosticSeverity,
	message: &'static str,
}

const RULES: [Rule; 2] = [
	Rule {
		marker: "TODO",
		severity: DiagnosticSeverity::WARNING,
		message: TODO_MESSAGE,
	},
	Rule {
		marker: "FIXME",
		severity: DiagnosticSeverity::ERROR,
		message: FIXME_MESSAGE,
	},
];

/// Computes the diagnostics of a snapshot.
///
/// Matching is case-sensitive and each rule reports its first match on a line.
/// Ranges cover exactly the marker, measured in `encoding`. The result is ordered by
/// start position; rule order breaks ties.
#[must_use]
pub fn compute(snapshot: &DocumentSnapshot, source: &str, encoding: OffsetEncoding) -> Vec<Diagnostic> {
	let mut diagnostics = Vec::new();
	for (line_idx, line) in snapshot.text.lines().enumerate() {
		let Ok(line_no) = u32::try_from(line_idx) else {
			break;
		};
		let line = line.to_string();
		for rule in &RULES {
			let Some(byte_idx) = line.find(rule.marker) else {
				continue;
			};
			let start = encoding.str_width(&line[..byte_idx]);
			let end = start + encoding.str_width(rule.marker);
			let (Ok(start), Ok(end)) = (u32::try_from(start), u32::try_from(end)) else {
				continue;
			};
			diagnostics.push(Diagnostic {
				range: Range::new(Position::new(line_no, start), Position::new(line_no, end)),
				severity: Some(rule.severity),
				source: Some(source.to_owned()),
				message: rule.message.to_owned(),
				..Diagnostic::default()
			});
		}
	}
	diagnostics.sort_by_key(|d| (d.range.start.line, d.range.start.character));
	diagnostics
}

/// A finished computation on its way back to the main loop.
#[derive(Debug, Clone)]
pub struct DiagnosticsComputed {
	/// Document URI.
	pub uri: Uri,
	/// Generation stamped when the computation was scheduled.
	pub generation: u64,
	/// Version of the snapshot that was analysed.
	pub version: i32,
	/// The computed diagnostics, possibly empty.
	pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
struct Pending {
	generation: u64,
	cancel: CancellationToken,
}

/// Per-URI debounce with generation checks.
///
/// Owned by the session state and only touched from the main loop.
#[derive(Debug)]
pub struct DiagnosticsScheduler {
	store: Arc<DocumentStore>,
	client: ClientSocket,
	source: Arc<str>,
	encoding: OffsetEncoding,
	generation: u64,
	pending: HashMap<Uri, Pending>,
}

impl DiagnosticsScheduler {
	/// Creates a scheduler reading from `store` and reporting through `client`.
	#[must_use]
	pub fn new(store: Arc<DocumentStore>, client: ClientSocket, source: &str) -> Self {
		Self {
			store,
			client,
			source: Arc::from(source),
			encoding: OffsetEncoding::default(),
			generation: 0,
			pending: HashMap::new(),
		}
	}

	/// Updates the source label and position encoding for later computations.
	pub fn configure(&mut self, source: &str, encoding: OffsetEncoding) {
		self.source = Arc::from(source);
		self.encoding = encoding;
	}

	/// Schedules a computation for `uri` after `delay`, superseding any pending one.
	///
	/// Returns the generation of the new computation.
	pub fn schedule(&mut self, uri: &Uri, delay: Duration) -> u64 {
		self.generation += 1;
		let generation = self.generation;
		let cancel = CancellationToken::new();
		let pending = Pending {
			generation,
			cancel: cancel.clone(),
		};
		if let Some(previous) = self.pending.insert(uri.clone(), pending) {
			trace!(uri = uri.as_str(), superseded = previous.generation, generation, "superseding diagnostics");
			previous.cancel.cancel();
		}

		let store = Arc::clone(&self.store);
		let client = self.client.clone();
		let source = Arc::clone(&self.source);
		let encoding = self.encoding;
		let uri = uri.clone();
		tokio::spawn(async move {
			tokio::select! {
				() = cancel.cancelled() => return,
				() = tokio::time::sleep(delay) => {}
			}
			let Some(snapshot) = store.snapshot(&uri) else {
				return;
			};
			let computed = DiagnosticsComputed {
				generation,
				version: snapshot.version,
				diagnostics: compute(&snapshot, &source, encoding),
				uri,
			};
			if client.emit(computed).is_err() {
				debug!(generation, "session ended before diagnostics were delivered");
			}
		});
		generation
	}

	/// Settles a computation. Returns `true` if it is the newest one for its URI and
	/// should be published.
	pub fn complete(&mut self, computed: &DiagnosticsComputed) -> bool {
		match self.pending.get(&computed.uri) {
			Some(pending) if pending.generation == computed.generation => {
				self.pending.remove(&computed.uri);
				true
			}
			_ => {
				trace!(uri = computed.uri.as_str(), generation = computed.generation, "discarding superseded diagnostics");
				false
			}
		}
	}

	/// Cancels pending work for `uri` and forgets it.
	pub fn forget(&mut self, uri: &Uri) {
		if let Some(pending) = self.pending.remove(uri) {
			pending.cancel.cancel();
		}
	}

	/// Cancels all pending work.
	pub fn cancel_all(&mut self) {
		for (_, pending) in self.pending.drain() {
			pending.cancel.cancel();
		}
	}

	/// Number of URIs with a computation in flight.
	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}
}
