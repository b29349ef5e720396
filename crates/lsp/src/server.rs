//! Language Server lifecycle.
//!
//! Enforces the `initialize` / `shutdown` / `exit` protocol around the wrapped
//! service:
//!
//! - Requests before `initialize` fail with [`ErrorCode::SERVER_NOT_INITIALIZED`]
//!   and notifications before it are dropped.
//! - A second `initialize`, and any request after `shutdown`, fail with
//!   [`ErrorCode::INVALID_REQUEST`].
//! - `exit` stops the main loop.

use std::future::{Ready, ready};
use std::ops::ControlFlow;
use std::task::{Context, Poll};

use futures::future::Either;
use lsp_types::notification::{Exit, Initialized, Notification};
use lsp_types::request::{Initialize, Request, Shutdown};
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, info, warn};

use crate::{AnyEvent, AnyNotification, AnyRequest, ErrorCode, LspService, ResponseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Uninitialized,
	Initializing,
	Ready,
	ShuttingDown,
}

/// The middleware handling Language Server lifecycle.
///
/// See [module level documentations](self) for details.
pub struct Lifecycle<S> {
	service: S,
	state: State,
}

define_getters!(impl[S] Lifecycle<S>, service: S);

impl<S> Lifecycle<S> {
	/// Whether `shutdown` has been received.
	#[must_use]
	pub fn is_shutting_down(&self) -> bool {
		self.state == State::ShuttingDown
	}
}

impl<S> Service<AnyRequest> for Lifecycle<S>
where
	S: LspService,
	S::Error: From<ResponseError>,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = Either<Ready<Result<S::Response, S::Error>>, S::Future>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.service.poll_ready(cx)
	}

	fn call(&mut self, req: AnyRequest) -> Self::Future {
		let rejection = match (self.state, req.method.as_str()) {
			(State::Uninitialized, Initialize::METHOD) => {
				self.state = State::Initializing;
				None
			}
			(_, Initialize::METHOD) => Some(ResponseError::new(ErrorCode::INVALID_REQUEST, "server is already initialized")),
			(State::Uninitialized, _) => Some(ResponseError::new(ErrorCode::SERVER_NOT_INITIALIZED, "server is not initialized")),
			(State::ShuttingDown, _) => Some(ResponseError::new(ErrorCode::INVALID_REQUEST, "server is shutting down")),
			(_, Shutdown::METHOD) => {
				info!("shutdown requested");
				self.state = State::ShuttingDown;
				None
			}
			_ => None,
		};
		match rejection {
			Some(err) => {
				debug!(method = %req.method, id = %req.id, code = %err.code, "rejecting request");
				Either::Left(ready(Err(err.into())))
			}
			None => Either::Right(self.service.call(req)),
		}
	}
}

impl<S> LspService for Lifecycle<S>
where
	S: LspService,
	S::Error: From<ResponseError>,
{
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>> {
		match notif.method.as_str() {
			Exit::METHOD => {
				if self.state != State::ShuttingDown {
					warn!("exit received without a prior shutdown");
				}
				self.service.notify(notif)?;
				ControlFlow::Break(Ok(()))
			}
			_ if self.state == State::Uninitialized => {
				debug!(method = %notif.method, "dropping notification before initialize");
				ControlFlow::Continue(())
			}
			Initialized::METHOD => {
				if self.state == State::Initializing {
					self.state = State::Ready;
				}
				self.service.notify(notif)
			}
			_ => self.service.notify(notif),
		}
	}

	fn emit(&mut self, event: AnyEvent) -> ControlFlow<Result<()>> {
		self.service.emit(event)
	}
}

/// A [`tower_layer::Layer`] which builds [`Lifecycle`].
#[derive(Clone, Default)]
#[must_use]
pub struct LifecycleLayer {
	_private: (),
}

impl<S> Layer<S> for LifecycleLayer {
	type Service = Lifecycle<S>;

	fn layer(&self, inner: S) -> Self::Service {
		Lifecycle {
			service: inner,
			state: State::Uninitialized,
		}
	}
}
