//! Server-initiated requests toward the client.
//!
//! Every call is bounded by the configured timeout. An unanswered call surfaces as
//! [`SessionError::UnresolvedOutboundCall`] instead of hanging the request handler
//! that issued it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::notification::{Notification, ShowMessage};
use lsp_types::request::{ApplyWorkspaceEdit, RegisterCapability, Request, WorkDoneProgressCreate};
use lsp_types::{
	ApplyWorkspaceEditParams, ApplyWorkspaceEditResponse, MessageType, Registration, RegistrationParams,
	ShowMessageParams, WorkDoneProgressCreateParams, WorkspaceEdit,
};
use lumen_lsp::ClientSocket;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::progress::ProgressStream;

/// Handle for issuing requests and notifications to the client.
#[derive(Debug, Clone)]
pub struct Outbound {
	client: ClientSocket,
	timeout: Duration,
	registered: Arc<Mutex<HashSet<String>>>,
}

impl Outbound {
	/// Creates a handle whose calls time out after `timeout`.
	#[must_use]
	pub fn new(client: ClientSocket, timeout: Duration) -> Self {
		Self {
			client,
			timeout,
			registered: Arc::default(),
		}
	}

	/// The underlying socket.
	#[must_use]
	pub fn client(&self) -> &ClientSocket {
		&self.client
	}

	/// Sends request `R` and waits for the answer.
	///
	/// # Errors
	///
	/// - [`SessionError::UnresolvedOutboundCall`] if no answer arrives in time.
	/// - [`SessionError::Outbound`] if the client answers with an error or the session ends.
	pub async fn call<R: Request>(&self, params: R::Params) -> Result<R::Result, SessionError> {
		debug!(method = R::METHOD, "outbound request");
		match tokio::time::timeout(self.timeout, self.client.request::<R>(params)).await {
			Ok(Ok(result)) => Ok(result),
			Ok(Err(source)) => Err(SessionError::Outbound {
				method: R::METHOD,
				source,
			}),
			Err(_) => Err(SessionError::UnresolvedOutboundCall {
				method: R::METHOD,
				timeout: self.timeout,
			}),
		}
	}

	/// Sends notification `N`.
	///
	/// # Errors
	///
	/// [`SessionError::Outbound`] if the session ended.
	pub fn notify<N: Notification>(&self, params: N::Params) -> Result<(), SessionError> {
		self.client
			.notify::<N>(params)
			.map_err(|source| SessionError::Outbound {
				method: N::METHOD,
				source,
			})
	}

	/// Shows a message in the client UI.
	///
	/// # Errors
	///
	/// [`SessionError::Outbound`] if the session ended.
	pub fn show_message(&self, typ: MessageType, message: impl Into<String>) -> Result<(), SessionError> {
		self.notify::<ShowMessage>(ShowMessageParams {
			typ,
			message: message.into(),
		})
	}

	/// Asks the client to apply a workspace edit and returns its verdict.
	///
	/// # Errors
	///
	/// See [`Outbound::call`]. A client declining the edit is not an error.
	pub async fn apply_edit(&self, label: Option<String>, edit: WorkspaceEdit) -> Result<ApplyWorkspaceEditResponse, SessionError> {
		let response = self.call::<ApplyWorkspaceEdit>(ApplyWorkspaceEditParams { label, edit }).await?;
		if !response.applied {
			debug!(reason = ?response.failure_reason, "client declined workspace edit");
		}
		Ok(response)
	}

	/// Registers capabilities dynamically.
	///
	/// Registration ids must be unique within one call. Reusing an id that an
	/// earlier call of this session registered is allowed but logged.
	///
	/// # Errors
	///
	/// - [`SessionError::DuplicateRegistration`] before anything is sent.
	/// - See [`Outbound::call`].
	pub async fn register_capabilities(&self, registrations: Vec<Registration>) -> Result<(), SessionError> {
		let mut ids = HashSet::with_capacity(registrations.len());
		for registration in &registrations {
			if !ids.insert(registration.id.clone()) {
				return Err(SessionError::DuplicateRegistration(registration.id.clone()));
			}
		}
		{
			let registered = self.registered.lock();
			for id in ids.iter().filter(|id| registered.contains(*id)) {
				warn!(id = %id, "registration id reused within this session");
			}
		}

		self.call::<RegisterCapability>(RegistrationParams { registrations }).await?;
		self.registered.lock().extend(ids);
		Ok(())
	}

	/// Starts a progress operation, creating its token first when the client
	/// supports `window/workDoneProgress/create`.
	///
	/// # Errors
	///
	/// See [`Outbound::call`].
	pub async fn progress(&self, create_token: bool) -> Result<ProgressStream, SessionError> {
		let stream = ProgressStream::new(self.client.clone());
		if create_token {
			self.call::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
				token: stream.token().clone(),
			})
			.await?;
		}
		Ok(stream)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn registration(id: &str) -> Registration {
		Registration {
			id: id.into(),
			method: "workspace/didChangeWatchedFiles".into(),
			register_options: Some(json!({ "watchers": [{ "globPattern": "**/*" }] })),
		}
	}

	#[tokio::test]
	async fn duplicate_ids_in_one_call_are_rejected_before_sending() {
		let outbound = Outbound::new(ClientSocket::new_closed(), Duration::from_secs(1));
		let err = outbound
			.register_capabilities(vec![registration("a"), registration("a")])
			.await
			.unwrap_err();
		assert!(matches!(err, SessionError::DuplicateRegistration(id) if id == "a"));
	}

	#[tokio::test]
	async fn calls_fail_once_the_session_is_gone() {
		let outbound = Outbound::new(ClientSocket::new_closed(), Duration::from_secs(1));
		let err = outbound
			.apply_edit(Some("label".into()), WorkspaceEdit::default())
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			SessionError::Outbound {
				method: "workspace/applyEdit",
				source: lumen_lsp::Error::ServiceStopped,
			}
		));
		assert!(outbound.show_message(MessageType::INFO, "hello").is_err());
	}

	#[tokio::test]
	async fn token_creation_fails_like_any_other_call() {
		let outbound = Outbound::new(ClientSocket::new_closed(), Duration::from_secs(1));
		let err = outbound.progress(true).await.unwrap_err();
		assert!(matches!(
			err,
			SessionError::Outbound {
				method: "window/workDoneProgress/create",
				source: lumen_lsp::Error::ServiceStopped,
			}
		));

		// Without creation nothing is sent until `begin`.
		assert!(outbound.progress(false).await.is_ok());
	}
}
