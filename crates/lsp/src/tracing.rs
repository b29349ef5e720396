//! Attach [`tracing::Span`]s over underlying handlers.
//!
//! Requests are instrumented for their whole lifetime, including the time spent
//! awaiting outbound calls. Notifications and events get a span around their
//! synchronous handler.
use std::ops::ControlFlow;
use std::task::{Context, Poll};

use tower_layer::Layer;
use tower_service::Service;
use tracing::instrument::Instrumented;
use tracing::{Instrument, info_span};

use crate::{AnyEvent, AnyNotification, AnyRequest, LspService, Result};

/// The middleware attaching [`tracing::Span`]s over underlying handlers.
///
/// See [module level documentations](self) for details.
pub struct Tracing<S> {
	service: S,
}

define_getters!(impl[S] Tracing<S>, service: S);

impl<S: LspService> Service<AnyRequest> for Tracing<S> {
	type Response = S::Response;
	type Error = S::Error;
	type Future = Instrumented<S::Future>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.service.poll_ready(cx)
	}

	fn call(&mut self, req: AnyRequest) -> Self::Future {
		let span = info_span!("request", method = %req.method, id = %req.id);
		let fut = {
			let _guard = span.enter();
			self.service.call(req)
		};
		fut.instrument(span)
	}
}

impl<S: LspService> LspService for Tracing<S> {
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>> {
		let _guard = info_span!("notification", method = %notif.method).entered();
		self.service.notify(notif)
	}

	fn emit(&mut self, event: AnyEvent) -> ControlFlow<Result<()>> {
		let _guard = info_span!("event", event = event.type_name()).entered();
		self.service.emit(event)
	}
}

/// A [`tower_layer::Layer`] which builds [`Tracing`].
#[derive(Clone, Default)]
#[must_use]
pub struct TracingLayer {
	_private: (),
}

impl<S> Layer<S> for TracingLayer {
	type Service = Tracing<S>;

	fn layer(&self, inner: S) -> Self::Service {
		Tracing { service: inner }
	}
}
