//! Handles for talking to the main loop from services and background tasks.

use lsp_types::notification::Notification;
use lsp_types::request::Request;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};

use crate::event::AnyEvent;
use crate::message::Message;
use crate::types::{AnyNotification, AnyRequest, AnyResponse, RequestId};
use crate::{Error, Result};

/// Internal events sent from sockets to the main loop.
#[derive(Debug)]
pub(crate) enum MainLoopEvent {
	/// A message to write as-is.
	Outgoing(Message),
	/// A request that still needs an outbound id, with its resolution slot.
	OutgoingRequest(AnyRequest, oneshot::Sender<AnyResponse>),
	/// A loopback event for the service.
	Any(AnyEvent),
}

/// The untyped channel into a main loop.
#[derive(Debug, Clone)]
pub(crate) struct PeerSocket {
	pub(crate) tx: mpsc::UnboundedSender<MainLoopEvent>,
}

impl PeerSocket {
	/// Creates a socket whose main loop is already gone.
	pub(crate) fn new_closed() -> Self {
		let (tx, _rx) = mpsc::unbounded_channel();
		Self { tx }
	}

	pub(crate) fn send(&self, v: MainLoopEvent) -> Result<()> {
		self.tx.send(v).map_err(|_| Error::ServiceStopped)
	}

	async fn request<R: Request>(&self, params: R::Params) -> Result<R::Result> {
		let params = serde_json::to_value(params)?;
		// The placeholder id is replaced by the main loop.
		let req = AnyRequest::new(RequestId::Number(0), R::METHOD, params);
		let (tx, rx) = oneshot::channel();
		self.send(MainLoopEvent::OutgoingRequest(req, tx))?;
		// A dropped sender means the loop shut down before the peer answered.
		let resp = rx.await.map_err(|_| Error::ServiceStopped)?;
		match resp.error {
			None => Ok(serde_json::from_value(resp.result.unwrap_or(JsonValue::Null))?),
			Some(err) => Err(Error::Response(err)),
		}
	}

	fn notify<N: Notification>(&self, params: N::Params) -> Result<()> {
		let params = serde_json::to_value(params)?;
		let notif = AnyNotification::new(N::METHOD, params);
		self.send(MainLoopEvent::Outgoing(Message::Notification(notif)))
	}

	fn emit<E: Send + 'static>(&self, event: E) -> Result<()> {
		self.send(MainLoopEvent::Any(AnyEvent::new(event)))
	}
}

macro_rules! define_socket {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone)]
		pub struct $name(pub(crate) PeerSocket);

		impl $name {
			/// Creates a socket that is not connected to any main loop.
			///
			/// Every operation fails with [`Error::ServiceStopped`].
			#[must_use]
			pub fn new_closed() -> Self {
				Self(PeerSocket::new_closed())
			}

			/// Sends a request to the peer and waits for its response.
			///
			/// Holding no locks across this call is the caller's responsibility: the
			/// response can only arrive once the main loop makes progress.
			///
			/// # Errors
			///
			/// - [`Error::ServiceStopped`] if the main loop stopped before a response arrived.
			/// - [`Error::Response`] if the peer answered with an error.
			/// - [`Error::Deserialize`] if the result does not match `R::Result`.
			pub async fn request<R: Request>(&self, params: R::Params) -> Result<R::Result> {
				self.0.request::<R>(params).await
			}

			/// Sends a notification to the peer.
			///
			/// # Errors
			///
			/// [`Error::ServiceStopped`] if the main loop stopped.
			pub fn notify<N: Notification>(&self, params: N::Params) -> Result<()> {
				self.0.notify::<N>(params)
			}

			/// Delivers an arbitrary event to the local service, in order with other
			/// events and notifications.
			///
			/// # Errors
			///
			/// [`Error::ServiceStopped`] if the main loop stopped.
			pub fn emit<E: Send + 'static>(&self, event: E) -> Result<()> {
				self.0.emit(event)
			}
		}
	};
}

define_socket!(
	/// The socket a Language Server uses to talk to its client.
	ClientSocket
);

define_socket!(
	/// The socket a Language Client uses to talk to its server.
	ServerSocket
);

#[cfg(test)]
mod tests;
