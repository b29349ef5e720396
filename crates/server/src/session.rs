//! The session: handlers over shared state, and the middleware stack that serves them.
//!
//! Notification handlers run on the main loop in arrival order and are the only
//! writers of document state. Request handlers grab what they need (a snapshot, an
//! [`Outbound`] handle) synchronously and then run as independent tasks.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::notification::{
	DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, Exit, Initialized, PublishDiagnostics,
};
use lsp_types::request::{Completion, HoverRequest, Initialize, Shutdown};
use lsp_types::{
	CompletionOptions, HoverProviderCapability, InitializeParams, InitializeResult, MessageType,
	PublishDiagnosticsParams, ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
	TextDocumentSyncOptions,
};
use lumen_lsp::concurrency::ConcurrencyLayer;
use lumen_lsp::panic::CatchUnwindLayer;
use lumen_lsp::router::Router;
use lumen_lsp::server::LifecycleLayer;
use lumen_lsp::tracing::TracingLayer;
use lumen_lsp::{ClientSocket, MainLoop, OffsetEncoding, ResponseError};
use tokio::io::{AsyncRead, AsyncWrite};
use tower::ServiceBuilder;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::diagnostics::{DiagnosticsComputed, DiagnosticsScheduler};
use crate::features::{DefaultFeatures, FeatureProvider};
use crate::outbound::Outbound;
use crate::triggers::{self, TestApplyEdit, TestProgress, TestRegisterCapability};
use crate::vfs::DocumentStore;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "lumen-server";

/// State shared by every handler of one session.
pub struct SessionState {
	client: ClientSocket,
	config: ServerConfig,
	store: Arc<DocumentStore>,
	diagnostics: DiagnosticsScheduler,
	features: Arc<dyn FeatureProvider>,
	outbound: Outbound,
	encoding: OffsetEncoding,
	supports_progress_create: bool,
}

impl SessionState {
	/// Creates the state of a fresh, uninitialized session.
	#[must_use]
	pub fn new(client: ClientSocket, config: ServerConfig, features: Arc<dyn FeatureProvider>) -> Self {
		let store = Arc::new(DocumentStore::new());
		let diagnostics = DiagnosticsScheduler::new(Arc::clone(&store), client.clone(), &config.diagnostic_source);
		let outbound = Outbound::new(client.clone(), config.request_timeout());
		Self {
			client,
			config,
			store,
			diagnostics,
			features,
			outbound,
			encoding: OffsetEncoding::default(),
			supports_progress_create: false,
		}
	}

	/// The effective configuration.
	#[must_use]
	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	/// The open documents.
	#[must_use]
	pub fn store(&self) -> &Arc<DocumentStore> {
		&self.store
	}

	/// The negotiated position encoding.
	#[must_use]
	pub fn encoding(&self) -> OffsetEncoding {
		self.encoding
	}

	fn initialize(&mut self, params: &InitializeParams) -> InitializeResult {
		if let Some(options) = &params.initialization_options {
			if let Err(err) = self.config.merge_json(options) {
				warn!(error = %err, "ignoring initializationOptions");
			}
		}

		let offered = params
			.capabilities
			.general
			.as_ref()
			.and_then(|general| general.position_encodings.as_deref());
		self.encoding = OffsetEncoding::negotiate(offered);
		self.supports_progress_create = params
			.capabilities
			.window
			.as_ref()
			.and_then(|window| window.work_done_progress)
			.unwrap_or(false);
		self.diagnostics.configure(&self.config.diagnostic_source, self.encoding);
		self.outbound = Outbound::new(self.client.clone(), self.config.request_timeout());

		info!(
			encoding = ?self.encoding,
			progress_create = self.supports_progress_create,
			debounce_ms = self.config.debounce_ms,
			"session initialized",
		);

		InitializeResult {
			capabilities: ServerCapabilities {
				position_encoding: Some(self.encoding.to_lsp()),
				text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
					open_close: Some(true),
					change: Some(TextDocumentSyncKind::INCREMENTAL),
					..TextDocumentSyncOptions::default()
				})),
				hover_provider: Some(HoverProviderCapability::Simple(true)),
				completion_provider: Some(CompletionOptions::default()),
				..ServerCapabilities::default()
			},
			server_info: Some(ServerInfo {
				name: SERVER_NAME.into(),
				version: Some(env!("CARGO_PKG_VERSION").into()),
			}),
		}
	}

	fn publish(&mut self, computed: DiagnosticsComputed) {
		if !self.diagnostics.complete(&computed) {
			return;
		}
		debug!(
			uri = computed.uri.as_str(),
			version = computed.version,
			count = computed.diagnostics.len(),
			"publishing diagnostics",
		);
		let params = PublishDiagnosticsParams::new(computed.uri, computed.diagnostics, Some(computed.version));
		if let Err(err) = self.outbound.notify::<PublishDiagnostics>(params) {
			warn!(error = %err, "failed to publish diagnostics");
		}
	}
}

/// Builds the router of one session.
#[must_use]
pub fn router(client: ClientSocket, config: ServerConfig, features: Arc<dyn FeatureProvider>) -> Router<SessionState> {
	let mut router = Router::new(SessionState::new(client, config, features));
	router
		.request::<Initialize, _>(|st, params| {
			let result = st.initialize(&params);
			async move { Ok(result) }
		})
		.request::<Shutdown, _>(|st, ()| {
			debug!(open = st.store.len(), pending = st.diagnostics.pending_len(), "cancelling pending diagnostics");
			st.diagnostics.cancel_all();
			async move { Ok(()) }
		})
		.request::<HoverRequest, _>(|st, params| {
			let position = params.text_document_position_params.position;
			let snapshot = st.store.snapshot(&params.text_document_position_params.text_document.uri);
			let features = Arc::clone(&st.features);
			let encoding = st.encoding;
			async move { Ok(snapshot.and_then(|doc| features.hover(&doc, position, encoding))) }
		})
		.request::<Completion, _>(|st, params| {
			let position = params.text_document_position.position;
			let snapshot = st.store.snapshot(&params.text_document_position.text_document.uri);
			let features = Arc::clone(&st.features);
			let encoding = st.encoding;
			async move { Ok(snapshot.and_then(|doc| features.completion(&doc, position, encoding))) }
		})
		.request::<TestProgress, _>(|st, _| {
			let outbound = st.outbound.clone();
			let create_token = st.supports_progress_create;
			async move { triggers::run_progress(outbound, create_token).await.map_err(ResponseError::from) }
		})
		.request::<TestApplyEdit, _>(|st, params| {
			let outbound = st.outbound.clone();
			async move { triggers::run_apply_edit(outbound, params).await.map_err(ResponseError::from) }
		})
		.request::<TestRegisterCapability, _>(|st, _| {
			let outbound = st.outbound.clone();
			async move { triggers::run_register_capability(outbound).await.map_err(ResponseError::from) }
		})
		.notification::<Initialized>(|_, _| {
			debug!("client initialized");
			ControlFlow::Continue(())
		})
		.notification::<Exit>(|_, ()| {
			info!("exit received");
			ControlFlow::Continue(())
		})
		.notification::<DidOpenTextDocument>(|st, params| {
			let snapshot = st.store.open(params.text_document);
			st.diagnostics.schedule(&snapshot.uri, Duration::ZERO);
			if st.config.show_open_message {
				let message = format!("Document opened: {}", snapshot.uri.as_str());
				if let Err(err) = st.outbound.show_message(MessageType::INFO, message) {
					warn!(error = %err, "failed to show open message");
				}
			}
			ControlFlow::Continue(())
		})
		.notification::<DidChangeTextDocument>(|st, params| {
			let uri = params.text_document.uri;
			let version = params.text_document.version;
			match st.store.apply_change(&uri, version, &params.content_changes, st.encoding) {
				Ok(_) => {
					st.diagnostics.schedule(&uri, st.config.debounce());
				}
				Err(err) => warn!(uri = uri.as_str(), version, error = %err, "ignoring change"),
			}
			ControlFlow::Continue(())
		})
		.notification::<DidCloseTextDocument>(|st, params| {
			let uri = params.text_document.uri;
			st.diagnostics.forget(&uri);
			if !st.store.close(&uri) {
				debug!(uri = uri.as_str(), "closing a document that was not open");
			}
			ControlFlow::Continue(())
		})
		.event::<DiagnosticsComputed>(|st, computed| {
			st.publish(computed);
			ControlFlow::Continue(())
		});
	router
}

/// Serves one session with [`DefaultFeatures`] until the client exits or closes the stream.
///
/// # Errors
///
/// Transport failures and broken framing. A clean `exit` or EOF is `Ok`.
pub async fn serve(
	config: ServerConfig,
	input: impl AsyncRead + Unpin,
	output: impl AsyncWrite + Unpin,
) -> lumen_lsp::Result<()> {
	serve_with(config, Arc::new(DefaultFeatures), input, output).await
}

/// Serves one session with custom language features.
///
/// # Errors
///
/// See [`serve`].
pub async fn serve_with(
	config: ServerConfig,
	features: Arc<dyn FeatureProvider>,
	input: impl AsyncRead + Unpin,
	output: impl AsyncWrite + Unpin,
) -> lumen_lsp::Result<()> {
	let (mainloop, _client) = MainLoop::new_server(|client| {
		ServiceBuilder::new()
			.layer(TracingLayer::default())
			.layer(LifecycleLayer::default())
			.layer(CatchUnwindLayer::default())
			.layer(ConcurrencyLayer::default())
			.service(router(client, config, features))
	});
	mainloop.run_buffered(input, output).await
}
