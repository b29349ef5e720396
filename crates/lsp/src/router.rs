//! Dispatch requests, notifications and events to handlers by method or type.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::{Future, ready};
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};

use lsp_types::notification::Notification;
use lsp_types::request::Request;
use serde_json::Value as JsonValue;
use tower_service::Service;
use tracing::{debug, warn};

use crate::{AnyEvent, AnyNotification, AnyRequest, ErrorCode, LspService, ResponseError, Result};

type BoxReqFuture = Pin<Box<dyn Future<Output = Result<JsonValue, ResponseError>> + Send>>;
type BoxReqHandler<St> = Box<dyn Fn(&mut St, AnyRequest) -> BoxReqFuture + Send>;
type BoxNotifHandler<St> = Box<dyn Fn(&mut St, AnyNotification) -> ControlFlow<Result<()>> + Send>;
type BoxEventHandler<St> = Box<dyn Fn(&mut St, AnyEvent) -> ControlFlow<Result<()>> + Send>;

/// The "root" service dispatching messages to handlers over a shared state `St`.
///
/// Request handlers run on the main loop only long enough to produce a future; the
/// future itself runs as a separate task and must not borrow `St`. Clone whatever it
/// needs (usually `Arc`s) out of the state first.
///
/// Unknown requests are answered with [`ErrorCode::METHOD_NOT_FOUND`]. Unknown
/// notifications starting with `$/` are ignored; others go to
/// [`Router::unhandled_notification`], which by default logs and continues.
pub struct Router<St> {
	state: St,
	req_handlers: HashMap<&'static str, BoxReqHandler<St>>,
	notif_handlers: HashMap<&'static str, BoxNotifHandler<St>>,
	event_handlers: HashMap<TypeId, BoxEventHandler<St>>,
	unhandled_req: BoxReqHandler<St>,
	unhandled_notif: BoxNotifHandler<St>,
	unhandled_event: BoxEventHandler<St>,
}

impl<St: Default> Default for Router<St> {
	fn default() -> Self {
		Self::new(St::default())
	}
}

impl<St> Router<St> {
	/// Create an empty router over `state`.
	#[must_use]
	pub fn new(state: St) -> Self {
		Self {
			state,
			req_handlers: HashMap::new(),
			notif_handlers: HashMap::new(),
			event_handlers: HashMap::new(),
			unhandled_req: Box::new(|_, req| {
				Box::pin(ready(Err(ResponseError::new(
					ErrorCode::METHOD_NOT_FOUND,
					format!("no such method: {}", req.method),
				))))
			}),
			unhandled_notif: Box::new(|_, notif| {
				debug!(method = %notif.method, "ignoring unhandled notification");
				ControlFlow::Continue(())
			}),
			unhandled_event: Box::new(|_, event| {
				ControlFlow::Break(Err(crate::Error::Routing(format!("unhandled event: {}", event.type_name()))))
			}),
		}
	}

	/// The shared state.
	#[must_use]
	pub fn state(&self) -> &St {
		&self.state
	}

	/// Add an asynchronous request handler for a specific LSP request `R`.
	///
	/// Params that fail to decode are answered with [`ErrorCode::INVALID_PARAMS`]
	/// without calling `handler`.
	pub fn request<R: Request, Fut>(&mut self, handler: impl Fn(&mut St, R::Params) -> Fut + Send + 'static) -> &mut Self
	where
		Fut: Future<Output = Result<R::Result, ResponseError>> + Send + 'static,
	{
		self.req_handlers.insert(
			R::METHOD,
			Box::new(move |state, req| match serde_json::from_value::<R::Params>(req.params) {
				Ok(params) => {
					let fut = handler(state, params);
					Box::pin(async move {
						let result = fut.await?;
						serde_json::to_value(result)
							.map_err(|e| ResponseError::new(ErrorCode::INTERNAL_ERROR, format!("failed to serialize result: {e}")))
					})
				}
				Err(err) => Box::pin(ready(Err(ResponseError::new(
					ErrorCode::INVALID_PARAMS,
					format!("invalid params for {}: {err}", R::METHOD),
				)))),
			}),
		);
		self
	}

	/// Add a synchronous notification handler for a specific LSP notification `N`.
	///
	/// Params that fail to decode are logged and the notification is dropped; the
	/// protocol gives no way to report the failure back.
	pub fn notification<N: Notification>(
		&mut self,
		handler: impl Fn(&mut St, N::Params) -> ControlFlow<Result<()>> + Send + 'static,
	) -> &mut Self {
		self.notif_handlers.insert(
			N::METHOD,
			Box::new(move |state, notif| match serde_json::from_value::<N::Params>(notif.params) {
				Ok(params) => handler(state, params),
				Err(err) => {
					warn!(method = N::METHOD, error = %err, "dropping notification with invalid params");
					ControlFlow::Continue(())
				}
			}),
		);
		self
	}

	/// Add a synchronous event handler for event type `E`.
	pub fn event<E: Send + 'static>(&mut self, handler: impl Fn(&mut St, E) -> ControlFlow<Result<()>> + Send + 'static) -> &mut Self {
		self.event_handlers.insert(
			TypeId::of::<E>(),
			Box::new(move |state, event| match event.downcast::<E>() {
				Ok(event) => handler(state, event),
				Err(event) => ControlFlow::Break(Err(crate::Error::Routing(format!(
					"event type mismatch: {}",
					event.type_name()
				)))),
			}),
		);
		self
	}

	/// Set a catch-all request handler for methods without a specific handler.
	pub fn unhandled_request<Fut>(&mut self, handler: impl Fn(&mut St, AnyRequest) -> Fut + Send + 'static) -> &mut Self
	where
		Fut: Future<Output = Result<JsonValue, ResponseError>> + Send + 'static,
	{
		self.unhandled_req = Box::new(move |state, req| Box::pin(handler(state, req)));
		self
	}

	/// Set a catch-all notification handler for methods without a specific handler.
	///
	/// Notifications starting with `$/` never reach it.
	pub fn unhandled_notification(
		&mut self,
		handler: impl Fn(&mut St, AnyNotification) -> ControlFlow<Result<()>> + Send + 'static,
	) -> &mut Self {
		self.unhandled_notif = Box::new(handler);
		self
	}

	/// Set a catch-all event handler for event types without a specific handler.
	pub fn unhandled_event(&mut self, handler: impl Fn(&mut St, AnyEvent) -> ControlFlow<Result<()>> + Send + 'static) -> &mut Self {
		self.unhandled_event = Box::new(handler);
		self
	}
}

impl<St> Service<AnyRequest> for Router<St> {
	type Response = JsonValue;
	type Error = ResponseError;
	type Future = BoxReqFuture;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: AnyRequest) -> Self::Future {
		let handler = self.req_handlers.get(req.method.as_str()).unwrap_or(&self.unhandled_req);
		handler(&mut self.state, req)
	}
}

impl<St> LspService for Router<St> {
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>> {
		match self.notif_handlers.get(notif.method.as_str()) {
			Some(handler) => handler(&mut self.state, notif),
			None if notif.method.starts_with("$/") => ControlFlow::Continue(()),
			None => (self.unhandled_notif)(&mut self.state, notif),
		}
	}

	fn emit(&mut self, event: AnyEvent) -> ControlFlow<Result<()>> {
		match self.event_handlers.get(&event.inner_type_id()) {
			Some(handler) => handler(&mut self.state, event),
			None => (self.unhandled_event)(&mut self.state, event),
		}
	}
}

#[cfg(test)]
mod tests {
	use futures::executor::block_on;
	use lsp_types::notification::{DidCloseTextDocument, Initialized};
	use lsp_types::request::Shutdown;
	use serde_json::json;

	use super::*;
	use crate::RequestId;

	#[derive(Default)]
	struct Counter {
		notified: usize,
		events: Vec<u32>,
	}

	fn router() -> Router<Counter> {
		let mut router = Router::new(Counter::default());
		router
			.request::<Shutdown, _>(|_, ()| async { Ok(()) })
			.notification::<Initialized>(|st, _| {
				st.notified += 1;
				ControlFlow::Continue(())
			})
			.event::<u32>(|st, v| {
				st.events.push(v);
				ControlFlow::Continue(())
			});
		router
	}

	#[test]
	fn dispatches_known_request() {
		let mut router = router();
		let resp = block_on(router.call(AnyRequest::new(RequestId::Number(1), "shutdown", JsonValue::Null)));
		assert_eq!(resp.unwrap(), JsonValue::Null);
	}

	#[test]
	fn unknown_request_is_method_not_found() {
		let mut router = router();
		let err = block_on(router.call(AnyRequest::new(RequestId::Number(1), "nope", JsonValue::Null))).unwrap_err();
		assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
	}

	#[test]
	fn invalid_params_are_rejected() {
		let mut router = Router::new(());
		router.request::<lsp_types::request::HoverRequest, _>(|_, _| async { Ok(None) });
		let req = AnyRequest::new(RequestId::Number(1), "textDocument/hover", json!({"bogus": true}));
		let err = block_on(router.call(req)).unwrap_err();
		assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
	}

	#[test]
	fn notifications_and_events_reach_state() {
		let mut router = router();
		assert!(router.notify(AnyNotification::new("initialized", json!({}))).is_continue());
		assert!(router.notify(AnyNotification::new("$/setTrace", json!({}))).is_continue());
		assert!(router.notify(AnyNotification::new("custom/unknown", json!({}))).is_continue());
		// Bad params are dropped rather than ending the loop.
		assert!(router.notify(AnyNotification::new(DidCloseTextDocument::METHOD, json!(1))).is_continue());
		assert!(router.emit(AnyEvent::new(7u32)).is_continue());

		assert_eq!(router.state().notified, 1);
		assert_eq!(router.state().events, vec![7]);
		assert!(router.emit(AnyEvent::new("unrouted")).is_break());
	}
}
