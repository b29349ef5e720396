//! Work-done progress reporting.
//!
//! A [`ProgressStream`] owns a fresh token. Beginning it yields an [`ActiveProgress`],
//! the only type that can report, so a report can never precede the begin. `end`
//! consumes the active stream, and dropping one that was never ended sends the end
//! notification on its behalf: every begun stream ends exactly once.

use std::sync::atomic::{AtomicU64, Ordering};

use lsp_types::notification::Progress;
use lsp_types::{
	NumberOrString, ProgressParams, ProgressParamsValue, ProgressToken, WorkDoneProgress, WorkDoneProgressBegin,
	WorkDoneProgressEnd, WorkDoneProgressReport,
};
use lumen_lsp::{ClientSocket, Result};
use tracing::{debug, warn};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> ProgressToken {
	let n = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
	NumberOrString::String(format!("lumen/progress/{n}"))
}

/// A progress operation that has not begun yet.
#[derive(Debug)]
#[must_use = "progress is only reported once begun"]
pub struct ProgressStream {
	client: ClientSocket,
	token: ProgressToken,
}

impl ProgressStream {
	/// Allocates a new, never used token.
	pub fn new(client: ClientSocket) -> Self {
		Self {
			client,
			token: next_token(),
		}
	}

	/// The token identifying this operation.
	#[must_use]
	pub fn token(&self) -> &ProgressToken {
		&self.token
	}

	/// Sends the `begin` notification.
	///
	/// # Errors
	///
	/// [`lumen_lsp::Error::ServiceStopped`] if the session ended.
	pub fn begin(self, title: impl Into<String>, message: Option<String>, percentage: Option<u32>) -> Result<ActiveProgress> {
		send(
			&self.client,
			&self.token,
			WorkDoneProgress::Begin(WorkDoneProgressBegin {
				title: title.into(),
				cancellable: Some(false),
				message,
				percentage,
			}),
		)?;
		Ok(ActiveProgress {
			client: self.client,
			token: self.token,
			ended: false,
		})
	}
}

/// A progress operation between `begin` and `end`.
#[derive(Debug)]
#[must_use = "dropping ends the progress immediately"]
pub struct ActiveProgress {
	client: ClientSocket,
	token: ProgressToken,
	ended: bool,
}

impl ActiveProgress {
	/// The token identifying this operation.
	#[must_use]
	pub fn token(&self) -> &ProgressToken {
		&self.token
	}

	/// Sends a `report` notification.
	///
	/// # Errors
	///
	/// [`lumen_lsp::Error::ServiceStopped`] if the session ended.
	pub fn report(&self, message: Option<String>, percentage: Option<u32>) -> Result<()> {
		send(
			&self.client,
			&self.token,
			WorkDoneProgress::Report(WorkDoneProgressReport {
				cancellable: Some(false),
				message,
				percentage,
			}),
		)
	}

	/// Sends the `end` notification.
	///
	/// # Errors
	///
	/// [`lumen_lsp::Error::ServiceStopped`] if the session ended.
	pub fn end(mut self, message: Option<String>) -> Result<()> {
		self.ended = true;
		send(&self.client, &self.token, WorkDoneProgress::End(WorkDoneProgressEnd { message }))
	}
}

impl Drop for ActiveProgress {
	fn drop(&mut self) {
		if self.ended {
			return;
		}
		debug!(token = ?self.token, "progress dropped before end");
		if let Err(err) = send(&self.client, &self.token, WorkDoneProgress::End(WorkDoneProgressEnd { message: None })) {
			warn!(token = ?self.token, error = %err, "failed to end progress");
		}
	}
}

fn send(client: &ClientSocket, token: &ProgressToken, value: WorkDoneProgress) -> Result<()> {
	client.notify::<Progress>(ProgressParams {
		token: token.clone(),
		value: ProgressParamsValue::WorkDone(value),
	})
}
