//! Service main loop driver for Language Servers and Clients.

use std::collections::HashMap;
use std::future::{Future, poll_fn};
use std::ops::ControlFlow;
use std::pin::{Pin, pin};
use std::task::{Context, Poll, ready};

use futures::StreamExt;
use pin_project_lite::pin_project;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::message::{Message, read_frame};
use crate::socket::{ClientSocket, MainLoopEvent, PeerSocket, ServerSocket};
use crate::types::{AnyResponse, ErrorCode, RequestId, ResponseError};
use crate::{Error, LspService, Result};

/// Macro to define getter methods for accessing inner service fields.
#[macro_export]
macro_rules! define_getters {
    (impl[$($generic:tt)*] $ty:ty, $field:ident : $field_ty:ty) => {
        impl<$($generic)*> $ty {
            /// Get a reference to the inner service.
            #[must_use]
            pub fn get_ref(&self) -> &$field_ty {
                &self.$field
            }

            /// Get a mutable reference to the inner service.
            #[must_use]
            pub fn get_mut(&mut self) -> &mut $field_ty {
                &mut self.$field
            }

            /// Consume self, returning the inner service.
            #[must_use]
            pub fn into_inner(self) -> $field_ty {
                self.$field
            }
        }
    };
}

/// Service main loop driver for either Language Servers or Language Clients.
///
/// The loop owns the service. Notifications and events are handed to it one at a
/// time, in arrival order. Each request is turned into a future by the service and
/// spawned onto the runtime, so slow requests never hold up the loop.
///
/// Two id tables are kept apart: inbound request ids only ever appear in spawned
/// request futures (and in middleware such as [`Concurrency`](crate::concurrency::Concurrency)),
/// while `outgoing` holds the one-shot slots of requests this side issued.
pub struct MainLoop<S: LspService> {
	/// The wrapped LSP service.
	service: S,
	/// Receiver for internal events from sockets.
	rx: mpsc::UnboundedReceiver<MainLoopEvent>,
	/// Counter for generating outgoing request IDs.
	outgoing_id: i32,
	/// Pending outgoing requests awaiting responses.
	outgoing: HashMap<RequestId, oneshot::Sender<AnyResponse>>,
	/// Concurrent request handlers in flight.
	tasks: tokio::task::JoinSet<AnyResponse>,
}

define_getters!(impl[S: LspService] MainLoop<S>, service: S);

impl<S> MainLoop<S>
where
	S: LspService<Response = JsonValue>,
	S::Future: Send + 'static,
	ResponseError: From<S::Error>,
{
	/// Create a Language Server main loop.
	#[must_use]
	pub fn new_server(builder: impl FnOnce(ClientSocket) -> S) -> (Self, ClientSocket) {
		let (this, socket) = Self::new(|socket| builder(ClientSocket(socket)));
		(this, ClientSocket(socket))
	}

	/// Create a Language Client main loop.
	#[must_use]
	pub fn new_client(builder: impl FnOnce(ServerSocket) -> S) -> (Self, ServerSocket) {
		let (this, socket) = Self::new(|socket| builder(ServerSocket(socket)));
		(this, ServerSocket(socket))
	}

	fn new(builder: impl FnOnce(PeerSocket) -> S) -> (Self, PeerSocket) {
		let (tx, rx) = mpsc::unbounded_channel();
		let socket = PeerSocket { tx };
		let this = Self {
			service: builder(socket.clone()),
			rx,
			outgoing_id: 0,
			outgoing: HashMap::new(),
			tasks: tokio::task::JoinSet::new(),
		};
		(this, socket)
	}

	/// Drive the service main loop to provide the service.
	///
	/// Shortcut to [`MainLoop::run`] that accept an `impl AsyncRead` and implicit wrap it in a
	/// [`BufReader`].
	#[allow(clippy::missing_errors_doc, reason = "errors documented in Self::run")]
	pub async fn run_buffered(self, input: impl AsyncRead + Unpin, output: impl AsyncWrite + Unpin) -> Result<()> {
		self.run(BufReader::new(input), output).await
	}

	/// Drive the service main loop to provide the service.
	///
	/// Returns `Ok(())` when the peer closes the input stream, when every socket is
	/// dropped, or when the service breaks the loop successfully (e.g. on `exit`).
	/// Pending outgoing requests are dropped on return, which resolves their
	/// awaiting callers with [`Error::ServiceStopped`].
	///
	/// # Errors
	///
	/// - `Error::Io` when the underlying `input` or `output` raises an error.
	/// - `Error::Protocol` when the framing of the input stream is broken.
	/// - Other errors raised from service handlers.
	pub async fn run(mut self, input: impl AsyncBufRead + Unpin, mut output: impl AsyncWrite + Unpin) -> Result<()> {
		// Reading through a stream keeps a partially read frame alive when another
		// branch of the select below wins.
		let mut incoming = pin!(futures::stream::unfold(input, |mut input| async move {
			let frame = read_frame(&mut input).await;
			Some((frame, input))
		}));

		let ret = loop {
			let ctl = tokio::select! {
				biased;

				resp = self.tasks.join_next(), if !self.tasks.is_empty() => match resp {
					Some(Ok(resp)) => ControlFlow::Continue(Some(Message::Response(resp))),
					Some(Err(e)) => {
						error!(error = %e, "request task panicked or was aborted");
						ControlFlow::Continue(None)
					}
					None => ControlFlow::Continue(None),
				},

				event = self.rx.recv() => match event {
					Some(e) => self.dispatch_event(e),
					None => break Ok(()),
				},

				frame = incoming.next() => match frame {
					Some(Ok(body)) => self.dispatch_frame(&body).await,
					Some(Err(Error::Eof)) | None => {
						info!("peer closed the input stream");
						break Ok(());
					}
					Some(Err(e)) => break Err(e),
				},
			};

			match ctl {
				ControlFlow::Continue(Some(msg)) => msg.write(&mut output).await?,
				ControlFlow::Continue(None) => {}
				ControlFlow::Break(ret) => break ret,
			}
		};

		if !self.outgoing.is_empty() {
			debug!(pending = self.outgoing.len(), "discarding unresolved outgoing requests");
		}
		output.shutdown().await?;
		ret
	}

	async fn dispatch_frame(&mut self, body: &[u8]) -> ControlFlow<Result<()>, Option<Message>> {
		match Message::decode(body) {
			Ok(msg) => self.dispatch_message(msg).await,
			Err(err) => match err.id {
				Some(id) => {
					warn!(id = %id, reason = %err.reason, "undecodable request");
					let error = ResponseError::new(ErrorCode::PARSE_ERROR, err.reason);
					ControlFlow::Continue(Some(Message::Response(AnyResponse::new_err(id, error))))
				}
				None => {
					error!(reason = %err.reason, "dropping undecodable message");
					ControlFlow::Continue(None)
				}
			},
		}
	}

	/// Routes an incoming message to the appropriate handler.
	async fn dispatch_message(&mut self, msg: Message) -> ControlFlow<Result<()>, Option<Message>> {
		match msg {
			Message::Request(req) => {
				if let Err(err) = poll_fn(|cx| self.service.poll_ready(cx)).await {
					let resp = AnyResponse::new_err(req.id, err.into());
					return ControlFlow::Continue(Some(Message::Response(resp)));
				}
				let id = req.id.clone();
				let fut = self.service.call(req);
				self.tasks.spawn(RequestFuture { fut, id: Some(id) });
			}
			Message::Response(resp) => match self.outgoing.remove(&resp.id) {
				Some(resp_tx) => {
					// The awaiting side may have given up already.
					let _: Result<_, _> = resp_tx.send(resp);
				}
				None => warn!(id = %resp.id, "response to an unknown outgoing request"),
			},
			Message::Notification(notif) => {
				self.service.notify(notif)?;
			}
		}
		ControlFlow::Continue(None)
	}

	/// Routes an internal event (outgoing message or user event).
	fn dispatch_event(&mut self, event: MainLoopEvent) -> ControlFlow<Result<()>, Option<Message>> {
		match event {
			MainLoopEvent::OutgoingRequest(mut req, resp_tx) => {
				req.id = RequestId::Number(self.outgoing_id);
				self.outgoing_id = self.outgoing_id.wrapping_add(1);
				if self.outgoing.insert(req.id.clone(), resp_tx).is_some() {
					return ControlFlow::Break(Err(Error::Protocol(format!("outgoing request id {} reused", req.id))));
				}
				ControlFlow::Continue(Some(Message::Request(req)))
			}
			MainLoopEvent::Outgoing(msg) => ControlFlow::Continue(Some(msg)),
			MainLoopEvent::Any(event) => {
				self.service.emit(event)?;
				ControlFlow::Continue(None)
			}
		}
	}
}

pin_project! {
	struct RequestFuture<Fut> {
		#[pin]
		fut: Fut,
		id: Option<RequestId>,
	}
}

impl<Fut, Error> Future for RequestFuture<Fut>
where
	Fut: Future<Output = Result<JsonValue, Error>>,
	ResponseError: From<Error>,
{
	type Output = AnyResponse;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		let (mut result, mut error) = (None, None);
		match ready!(this.fut.poll(cx)) {
			Ok(v) => result = Some(v),
			Err(err) => error = Some(err.into()),
		}
		Poll::Ready(AnyResponse {
			id: this.id.take().expect("Future is consumed"),
			result,
			error,
		})
	}
}
