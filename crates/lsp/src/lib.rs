//! Asynchronous [Language Server Protocol (LSP)][lsp] framework based on [tower].
//!
//! [lsp]: https://microsoft.github.io/language-server-protocol/overviews/lsp/overview/
//! [tower]: https://github.com/tower-rs/tower
//!
//! This crate is centered at a core service trait [`LspService`] for either Language Servers or
//! Language Clients. The main loop driver [`MainLoop`] executes the service over a
//! `Content-Length` framed byte stream. The additional features, called middleware, are
//! pluggable and can be layered using the [`tower_layer`] abstraction:
//! - [`concurrency::Concurrency`]: Incoming request multiplexing and cancellation.
//! - [`panic::CatchUnwind`]: Turn panics into errors.
//! - [`tracing::Tracing`]: Logger spans with methods instrumenting handlers.
//! - [`server::Lifecycle`]: Server initialization, shutting down, and exit handling.
//! - [`router::Router`]: "Root" service to dispatch requests, notifications and events.
//!
//! Requests run concurrently as independent tasks; notifications and events are handed to the
//! service one at a time in arrival order, so they may mutate state that later messages depend
//! on. Requests issued *by* this side through a [`ClientSocket`] or [`ServerSocket`] get ids from
//! a table owned by the main loop, separate from the ids the peer chooses.
//!
//! ## Cargo features
//!
//! - `position`: Ropey-based position conversion between LSP positions and char offsets.
//!   *Enabled by default.*
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
use std::io;
use std::ops::ControlFlow;

/// Re-export of the [`lsp_types`] dependency of this crate.
pub use lsp_types;
pub use serde_json::Value as JsonValue;
use tower_service::Service;

mod event;
#[macro_use]
mod mainloop;
pub mod message;
mod socket;
mod types;

pub use event::AnyEvent;
pub use mainloop::MainLoop;
pub use message::{DecodeError, Message};
pub use socket::{ClientSocket, ServerSocket};
pub use types::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, RequestId, ResponseError};

pub mod concurrency;
pub mod panic;
pub mod router;
pub mod server;
pub mod tracing;

mod encoding;

pub use encoding::OffsetEncoding;

#[cfg(feature = "position")]
#[cfg_attr(docsrs, doc(cfg(feature = "position")))]
pub mod position;
#[cfg(feature = "position")]
pub use position::{
	char_range_to_lsp_range, char_to_lsp_position, lsp_position_to_char, lsp_position_to_char_clamped,
	lsp_range_to_char_range,
};

/// `Result` defaulting to this crate's [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the main loop and of sockets.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The main loop is gone; nothing more can be sent or received.
	#[error("service stopped")]
	ServiceStopped,
	/// A payload did not match the expected type.
	#[error("deserialization failed: {0}")]
	Deserialize(#[from] serde_json::Error),
	/// The peer answered a request with an error object.
	#[error("{0}")]
	Response(#[from] ResponseError),
	/// Broken framing or another violation of the protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// Reading or writing the transport failed.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// The input stream ended.
	#[error("the underlying channel reached EOF")]
	Eof,
	/// An event, or a notification outside `$/`, had no handler.
	///
	/// Installing [`router::Router::unhandled_event`] and
	/// [`router::Router::unhandled_notification`] rules this out.
	#[error("{0}")]
	Routing(String),
}

/// A Language Server or Language Client as seen by [`MainLoop`].
///
/// Requests go through [`Service::call`] and may complete in any order. Notifications
/// and events go through the synchronous methods below, one at a time and in arrival
/// order, so a handler sees every earlier message's effect.
pub trait LspService: Service<AnyRequest> {
	/// Handles one notification.
	///
	/// `Break` stops the main loop with the carried result.
	fn notify(&mut self, notif: AnyNotification) -> ControlFlow<Result<()>>;

	/// Handles one event sent through [`ClientSocket::emit`] or [`ServerSocket::emit`].
	///
	/// `Break` stops the main loop with the carried result.
	fn emit(&mut self, event: AnyEvent) -> ControlFlow<Result<()>>;
}
