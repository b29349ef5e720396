//! `test/*` requests that make the server exercise its outbound flows on demand.

use std::collections::HashMap;
use std::time::Duration;

use lsp_types::request::Request;
use lsp_types::{
	DidChangeWatchedFilesRegistrationOptions, FileSystemWatcher, GlobPattern, Position, Range, Registration, TextEdit, Uri,
	WorkspaceEdit,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::SessionError;
use crate::outbound::Outbound;

/// Label of the edit sent by [`TestApplyEdit`].
pub const TEST_EDIT_LABEL: &str = "Test Edit";
/// Registration id used by [`TestRegisterCapability`].
pub const TEST_REGISTRATION_ID: &str = "test-file-watcher-1";

const PROGRESS_STEPS: u32 = 3;
const PROGRESS_STEP_DELAY: Duration = Duration::from_millis(10);

/// `test/progress`: run one begin/report/end progress sequence.
#[derive(Debug)]
pub enum TestProgress {}

impl Request for TestProgress {
	type Params = JsonValue;
	type Result = TriggerResult;
	const METHOD: &'static str = "test/progress";
}

/// `test/applyEdit`: ask the client to insert text at the start of a document.
#[derive(Debug)]
pub enum TestApplyEdit {}

impl Request for TestApplyEdit {
	type Params = TestApplyEditParams;
	type Result = ApplyEditOutcome;
	const METHOD: &'static str = "test/applyEdit";
}

/// `test/registerCapability`: register a catch-all file watcher.
#[derive(Debug)]
pub enum TestRegisterCapability {}

impl Request for TestRegisterCapability {
	type Params = JsonValue;
	type Result = TriggerResult;
	const METHOD: &'static str = "test/registerCapability";
}

/// Params of [`TestApplyEdit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestApplyEditParams {
	/// Document to edit.
	pub uri: Uri,
	/// Text inserted at line 0, character 0.
	pub new_text: String,
}

/// Result of [`TestProgress`] and [`TestRegisterCapability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
	/// Whether the flow completed.
	pub success: bool,
}

/// Result of [`TestApplyEdit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditOutcome {
	/// Same as `applied`.
	pub success: bool,
	/// The client's verdict.
	pub applied: bool,
	/// The client's reason for declining, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure_reason: Option<String>,
}

/// Runs a progress stream with a begin, [`PROGRESS_STEPS`] reports and an end.
///
/// # Errors
///
/// Fails if token creation is refused or the session ends midway.
pub async fn run_progress(outbound: Outbound, create_token: bool) -> Result<TriggerResult, SessionError> {
	let progress_err = |source| SessionError::Outbound {
		method: "$/progress",
		source,
	};
	let stream = outbound.progress(create_token).await?;
	let active = stream
		.begin("Test progress", Some("Starting".into()), Some(0))
		.map_err(progress_err)?;
	for step in 1..=PROGRESS_STEPS {
		tokio::time::sleep(PROGRESS_STEP_DELAY).await;
		active
			.report(Some(format!("Step {step} of {PROGRESS_STEPS}")), Some(step * 100 / (PROGRESS_STEPS + 1)))
			.map_err(progress_err)?;
	}
	active.end(Some("Done".into())).map_err(progress_err)?;
	Ok(TriggerResult { success: true })
}

/// Sends `workspace/applyEdit` inserting `new_text` at the top of `uri`.
///
/// # Errors
///
/// See [`Outbound::apply_edit`]. A declined edit is reported in the outcome.
pub async fn run_apply_edit(outbound: Outbound, params: TestApplyEditParams) -> Result<ApplyEditOutcome, SessionError> {
	let origin = Position::new(0, 0);
	let edit = WorkspaceEdit {
		changes: Some(HashMap::from([(
			params.uri,
			vec![TextEdit::new(Range::new(origin, origin), params.new_text)],
		)])),
		..WorkspaceEdit::default()
	};
	let response = outbound.apply_edit(Some(TEST_EDIT_LABEL.into()), edit).await?;
	info!(applied = response.applied, "test edit answered");
	Ok(ApplyEditOutcome {
		success: response.applied,
		applied: response.applied,
		failure_reason: response.failure_reason,
	})
}

/// Registers a `workspace/didChangeWatchedFiles` watcher for every file.
///
/// # Errors
///
/// See [`Outbound::register_capabilities`].
pub async fn run_register_capability(outbound: Outbound) -> Result<TriggerResult, SessionError> {
	let options = DidChangeWatchedFilesRegistrationOptions {
		watchers: vec![FileSystemWatcher {
			glob_pattern: GlobPattern::String("**/*".into()),
			kind: None,
		}],
	};
	let register_options = serde_json::to_value(options).map_err(|e| SessionError::HandlerFailure(e.to_string()))?;
	outbound
		.register_capabilities(vec![Registration {
			id: TEST_REGISTRATION_ID.into(),
			method: "workspace/didChangeWatchedFiles".into(),
			register_options: Some(register_options),
		}])
		.await?;
	Ok(TriggerResult { success: true })
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn apply_edit_outcome_omits_missing_reason() {
		let outcome = ApplyEditOutcome {
			success: true,
			applied: true,
			failure_reason: None,
		};
		assert_eq!(serde_json::to_value(outcome).unwrap(), json!({ "success": true, "applied": true }));

		let outcome = ApplyEditOutcome {
			success: false,
			applied: false,
			failure_reason: Some("read-only".into()),
		};
		assert_eq!(
			serde_json::to_value(outcome).unwrap(),
			json!({ "success": false, "applied": false, "failureReason": "read-only" })
		);
	}

	#[test]
	fn apply_edit_params_use_camel_case() {
		let params: TestApplyEditParams =
			serde_json::from_value(json!({ "uri": "file:///test-edit.txt", "newText": "Hello, World!" })).unwrap();
		assert_eq!(params.uri.as_str(), "file:///test-edit.txt");
		assert_eq!(params.new_text, "Hello, World!");
	}
}
