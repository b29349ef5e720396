//! Error types of the session runtime.

use std::time::Duration;

use lsp_types::{Position, Uri};
use lumen_lsp::{ErrorCode, ResponseError};

/// A content change that cannot be applied to a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
	/// The range starts after it ends.
	#[error("range start {}:{} is after its end {}:{}", .start.line, .start.character, .end.line, .end.character)]
	InvalidRange {
		/// Requested start.
		start: Position,
		/// Requested end.
		end: Position,
	},
}

/// Failures of [`DocumentStore`](crate::vfs::DocumentStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
	/// No document is open under this URI.
	#[error("document {} is not open", .0.as_str())]
	UnknownDocument(Uri),
	/// The update does not advance the document version.
	#[error("stale version {version} for {} (current version is {current})", .uri.as_str())]
	StaleVersion {
		/// Document URI.
		uri: Uri,
		/// Version carried by the update.
		version: i32,
		/// Version currently stored.
		current: i32,
	},
	/// An edit in the change was malformed; the document is unchanged.
	#[error(transparent)]
	Edit(#[from] EditError),
}

/// Invalid configuration input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// Overrides must be a JSON object.
	#[error("configuration overrides must be a JSON object, got {0}")]
	NotAnObject(&'static str),
	/// A known key carries a value of the wrong type.
	#[error("invalid configuration: {0}")]
	Invalid(#[from] serde_json::Error),
}

/// Failures surfaced by request handlers of a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	/// The client did not answer an outbound request in time.
	#[error("{method} was not answered within {timeout:?}")]
	UnresolvedOutboundCall {
		/// Outbound method.
		method: &'static str,
		/// The timeout that elapsed.
		timeout: Duration,
	},
	/// An outbound request or notification failed.
	#[error("{method} failed: {source}")]
	Outbound {
		/// Outbound method.
		method: &'static str,
		/// What went wrong.
		#[source]
		source: lumen_lsp::Error,
	},
	/// The same registration id appears twice in one request.
	#[error("registration id {0:?} appears more than once")]
	DuplicateRegistration(String),
	/// A handler could not complete.
	#[error("{0}")]
	HandlerFailure(String),
}

impl From<SessionError> for ResponseError {
	fn from(err: SessionError) -> Self {
		let code = match &err {
			SessionError::DuplicateRegistration(_) => ErrorCode::INVALID_PARAMS,
			SessionError::HandlerFailure(_) => ErrorCode::INTERNAL_ERROR,
			SessionError::UnresolvedOutboundCall { .. } | SessionError::Outbound { .. } => ErrorCode::REQUEST_FAILED,
		};
		ResponseError::new(code, err)
	}
}
