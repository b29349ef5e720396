//! Incoming request multiplexing and cancellation.
//!
//! Every inbound request future is made abortable and remembered by id until it
//! settles. A `$/cancelRequest` notification aborts the matching future, which then
//! resolves to a [`ErrorCode::REQUEST_CANCELLED`] response. This table only ever holds
//! ids chosen by the peer; ids of requests this side issues live in the main loop.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures::future::{AbortHandle, Abortable, Aborted};
use lsp_types::CancelParams;
use lsp_types::notification::{Cancel, Notification};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, warn};

use crate::{AnyEvent, AnyNotification, AnyRequest, ErrorCode, LspService, RequestId, ResponseError, Result};

type Ongoing = Arc<Mutex<HashMap<RequestId, (u64, AbortHandle)>>>;

/// The middleware for incoming request cancellation.
///
/// See [module level documentations](self) for details.
pub struct Concurrency<S> {
	service: S,
	ongoing: Ongoing,
	next_seq: u64,
}

define_getters!(impl[S] Concurrency<S>, service: S);

impl<S> Concurrency<S> {
	/// Number of requests currently in flight.
	#[must_use]
	pub fn in_flight(&self) -> usize {
		self.ongoing.lock().len()
	}

	fn cancel(&self, id: &RequestId) {
		match self.ongoing.lock().remove(id) {
			Some((_, handle)) => {
				debug!(id = %id, "cancelling request");
				handle.abort();
			}
			None => debug!(id = %id, "cancellation for a request that already settled"),
		}
	}
}

impl<S> Service<AnyRequest> for Concurrency<S>
where
	S: LspService,
	S::Error: From<ResponseError>,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = ResponseFuture<S::Future>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.service.poll_ready(cx)
	}

	fn call(&mut self, req: AnyRequest) -> Self::Future {
		let id = req.id.clone();
		let seq = self.next_seq;
		self.next_seq = self.next_seq.wrapping_add(1);

		let (handle, registration) = AbortHandle::new_pair();
		if self.ongoing.lock().insert(id.clone(), (seq, handle)).is_some() {
			warn!(id = %id, "peer reused the id of an in-flight request");
		}
		let fut = self.service.call(req);
		ResponseFuture {
			fut: Abortable::new(fut, registration),
			guard: OngoingGuard {
				ongoing: self.ongoing.clone(),
				id,
				seq,
			},
		}
	}
}

impl<S> LspService for Concurrency<S>
where
	S: LspService,
	S::Error: From<ResponseError>,
{
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>> {
		if notif.method == Cancel::METHOD {
			match serde_json::from_value::<CancelParams>(notif.params.clone()) {
				Ok(params) => self.cancel(&params.id.into()),
				Err(err) => warn!(error = %err, "invalid $/cancelRequest params"),
			}
		}
		self.service.notify(notif)
	}

	fn emit(&mut self, event: AnyEvent) -> ControlFlow<Result<()>> {
		self.service.emit(event)
	}
}

/// Removes a settled (or dropped) request from the in-flight table.
struct OngoingGuard {
	ongoing: Ongoing,
	id: RequestId,
	seq: u64,
}

impl Drop for OngoingGuard {
	fn drop(&mut self) {
		let mut ongoing = self.ongoing.lock();
		// A reused id may have replaced this entry; leave the newer one alone.
		if ongoing.get(&self.id).is_some_and(|(seq, _)| *seq == self.seq) {
			ongoing.remove(&self.id);
		}
	}
}

pin_project! {
	/// The [`Future`] type used by the [`Concurrency`] middleware.
	pub struct ResponseFuture<Fut> {
		#[pin]
		fut: Abortable<Fut>,
		guard: OngoingGuard,
	}
}

impl<Fut, Response, Error> Future for ResponseFuture<Fut>
where
	Fut: Future<Output = Result<Response, Error>>,
	Error: From<ResponseError>,
{
	type Output = Fut::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		match ready!(this.fut.poll(cx)) {
			Ok(ret) => Poll::Ready(ret),
			Err(Aborted) => Poll::Ready(Err(
				ResponseError::new(ErrorCode::REQUEST_CANCELLED, "client cancelled the request").into()
			)),
		}
	}
}

/// A [`tower_layer::Layer`] which builds [`Concurrency`].
#[derive(Clone, Default)]
#[must_use]
pub struct ConcurrencyLayer {
	_private: (),
}

impl<S> Layer<S> for ConcurrencyLayer {
	type Service = Concurrency<S>;

	fn layer(&self, inner: S) -> Self::Service {
		Concurrency {
			service: inner,
			ongoing: Ongoing::default(),
			next_seq: 0,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::{Value as JsonValue, json};

	use super::*;
	use crate::router::Router;

	fn service() -> Concurrency<Router<()>> {
		let mut router = Router::new(());
		router.unhandled_request(|_, req| async move {
			if req.method == "slow" {
				tokio::time::sleep(Duration::from_secs(3600)).await;
			}
			Ok(JsonValue::Null)
		});
		ConcurrencyLayer::default().layer(router)
	}

	#[tokio::test]
	async fn cancel_request_aborts_in_flight_future() {
		let mut svc = service();
		let fut = svc.call(AnyRequest::new(RequestId::Number(4), "slow", JsonValue::Null));
		assert_eq!(svc.in_flight(), 1);

		let cancel = AnyNotification::new(Cancel::METHOD, json!({ "id": 4 }));
		assert!(svc.notify(cancel).is_continue());

		let err = fut.await.unwrap_err();
		assert_eq!(err.code, ErrorCode::REQUEST_CANCELLED);
		assert_eq!(svc.in_flight(), 0);
	}

	#[tokio::test]
	async fn settled_requests_leave_the_table() {
		let mut svc = service();
		let fut = svc.call(AnyRequest::new(RequestId::String("a".into()), "fast", JsonValue::Null));
		assert_eq!(fut.await.unwrap(), JsonValue::Null);
		assert_eq!(svc.in_flight(), 0);

		// Cancelling an id that already finished is harmless.
		let cancel = AnyNotification::new(Cancel::METHOD, json!({ "id": "a" }));
		assert!(svc.notify(cancel).is_continue());
	}
}
