//! Catch panics of underlying handlers and turn them into error responses.
//!
//! A panicking request handler answers its request with
//! [`ErrorCode::INTERNAL_ERROR`]. A panicking notification or event handler is
//! logged and the main loop keeps running.

use std::any::Any;
use std::future::{Future, Ready, ready};
use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use pin_project_lite::pin_project;
use tower_layer::Layer;
use tower_service::Service;
use tracing::error;

use crate::{AnyEvent, AnyNotification, AnyRequest, ErrorCode, LspService, ResponseError, Result};

/// The middleware catching panics of underlying handlers.
///
/// See [module level documentations](self) for details.
pub struct CatchUnwind<S> {
	service: S,
}

define_getters!(impl[S] CatchUnwind<S>, service: S);

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		msg
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg
	} else {
		"unknown panic payload"
	}
}

fn internal_error(method: &str, payload: &(dyn Any + Send)) -> ResponseError {
	let msg = panic_message(payload);
	error!(method = %method, panic = msg, "request handler panicked");
	ResponseError::new(ErrorCode::INTERNAL_ERROR, format!("handler of {method} panicked: {msg}"))
}

impl<S> Service<AnyRequest> for CatchUnwind<S>
where
	S: LspService,
	S::Error: From<ResponseError>,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = ResponseFuture<S::Future, S::Response, S::Error>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.service.poll_ready(cx)
	}

	fn call(&mut self, req: AnyRequest) -> Self::Future {
		let method = req.method.clone();
		match catch_unwind(AssertUnwindSafe(|| self.service.call(req))) {
			Ok(fut) => ResponseFuture::Poll {
				fut: AssertUnwindSafe(fut).catch_unwind(),
				method,
			},
			Err(payload) => ResponseFuture::Ready {
				fut: ready(Err(internal_error(&method, &*payload).into())),
			},
		}
	}
}

pin_project! {
	/// The [`Future`] type used by the [`CatchUnwind`] middleware.
	#[project = ResponseFutureProj]
	pub enum ResponseFuture<Fut, Response, Error> {
		/// The handler produced a future that may still panic.
		Poll {
			#[pin]
			fut: futures::future::CatchUnwind<AssertUnwindSafe<Fut>>,
			method: String,
		},
		/// The handler panicked before producing a future.
		Ready {
			#[pin]
			fut: Ready<Result<Response, Error>>,
		},
	}
}

impl<Fut, Response, Error> Future for ResponseFuture<Fut, Response, Error>
where
	Fut: Future<Output = Result<Response, Error>>,
	Error: From<ResponseError>,
{
	type Output = Fut::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match self.project() {
			ResponseFutureProj::Poll { fut, method } => fut.poll(cx).map(|ret| match ret {
				Ok(ret) => ret,
				Err(payload) => Err(internal_error(method, &*payload).into()),
			}),
			ResponseFutureProj::Ready { fut } => fut.poll(cx),
		}
	}
}

impl<S> LspService for CatchUnwind<S>
where
	S: LspService,
	S::Error: From<ResponseError>,
{
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>> {
		let method = notif.method.clone();
		catch_unwind(AssertUnwindSafe(|| self.service.notify(notif))).unwrap_or_else(|payload| {
			error!(method = %method, panic = panic_message(&*payload), "notification handler panicked");
			ControlFlow::Continue(())
		})
	}

	fn emit(&mut self, event: AnyEvent) -> ControlFlow<Result<()>> {
		let type_name = event.type_name();
		catch_unwind(AssertUnwindSafe(|| self.service.emit(event))).unwrap_or_else(|payload| {
			error!(event = type_name, panic = panic_message(&*payload), "event handler panicked");
			ControlFlow::Continue(())
		})
	}
}

/// A [`tower_layer::Layer`] which builds [`CatchUnwind`].
#[derive(Clone, Default)]
#[must_use]
pub struct CatchUnwindLayer {
	_private: (),
}

impl<S> Layer<S> for CatchUnwindLayer {
	type Service = CatchUnwind<S>;

	fn layer(&self, inner: S) -> Self::Service {
		CatchUnwind { service: inner }
	}
}
