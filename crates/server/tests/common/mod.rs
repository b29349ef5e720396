//! A scripted LSP client driving a full session over an in-memory pipe.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use lsp_types::PublishDiagnosticsParams;
use lumen_lsp::{AnyNotification, AnyRequest, AnyResponse, JsonValue, Message, RequestId, ResponseError};
use lumen_server::ServerConfig;
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Upper bound for anything the server is expected to do.
pub const WAIT: Duration = Duration::from_secs(5);

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<AnyResponse>>>>;

pub struct TestClient {
	outgoing: mpsc::UnboundedSender<Message>,
	pending: Pending,
	notifications: mpsc::UnboundedReceiver<AnyNotification>,
	server_requests: mpsc::UnboundedReceiver<AnyRequest>,
	next_id: AtomicI32,
	pub server: JoinHandle<lumen_lsp::Result<()>>,
}

impl TestClient {
	/// Starts a session with `config`.
	pub fn spawn(config: ServerConfig) -> Self {
		let (client_end, server_end) = tokio::io::duplex(1024 * 1024);
		let (server_read, server_write) = tokio::io::split(server_end);
		let server = tokio::spawn(lumen_server::serve(config, server_read, server_write));

		let (reader, mut writer) = tokio::io::split(client_end);
		let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
		tokio::spawn(async move {
			while let Some(msg) = outgoing_rx.recv().await {
				if msg.write(&mut writer).await.is_err() {
					break;
				}
			}
			let _ = writer.shutdown().await;
		});

		let pending = Pending::default();
		let (notif_tx, notifications) = mpsc::unbounded_channel();
		let (req_tx, server_requests) = mpsc::unbounded_channel();
		let routes = Arc::clone(&pending);
		tokio::spawn(async move {
			let mut reader = BufReader::new(reader);
			while let Ok(msg) = Message::read(&mut reader).await {
				match msg {
					Message::Response(resp) => {
						if let Some(tx) = routes.lock().remove(&resp.id) {
							let _ = tx.send(resp);
						}
					}
					Message::Notification(notif) => {
						let _ = notif_tx.send(notif);
					}
					Message::Request(req) => {
						let _ = req_tx.send(req);
					}
				}
			}
		});

		Self {
			outgoing,
			pending,
			notifications,
			server_requests,
			next_id: AtomicI32::new(1),
			server,
		}
	}

	/// Starts a session with test-friendly timings.
	pub fn spawn_default() -> Self {
		Self::spawn(ServerConfig {
			debounce_ms: 50,
			..ServerConfig::default()
		})
	}

	/// Closes the client's end of the pipe and returns the server task.
	pub fn hang_up(self) -> JoinHandle<lumen_lsp::Result<()>> {
		self.server
	}

	pub fn send(&self, msg: Message) {
		self.outgoing.send(msg).expect("writer task is gone");
	}

	/// Sends a request and returns its id and the slot its response lands in.
	pub fn start_request(&self, method: &str, params: JsonValue) -> (RequestId, oneshot::Receiver<AnyResponse>) {
		let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id.clone(), tx);
		self.send(Message::Request(AnyRequest::new(id.clone(), method, params)));
		(id, rx)
	}

	pub async fn request(&self, method: &str, params: JsonValue) -> AnyResponse {
		let (_, rx) = self.start_request(method, params);
		response(rx).await
	}

	pub fn notify(&self, method: &str, params: JsonValue) {
		self.send(Message::Notification(AnyNotification::new(method, params)));
	}

	pub fn respond(&self, id: RequestId, result: JsonValue) {
		self.send(Message::Response(AnyResponse::new_ok(id, result)));
	}

	pub fn respond_err(&self, id: RequestId, error: ResponseError) {
		self.send(Message::Response(AnyResponse::new_err(id, error)));
	}

	/// `initialize` with `params`, then `initialized`.
	pub async fn initialize_with(&self, params: JsonValue) -> JsonValue {
		let result = ok(self.request("initialize", params).await);
		self.notify("initialized", json!({}));
		result
	}

	pub async fn initialize(&self) -> JsonValue {
		self.initialize_with(json!({ "processId": null, "capabilities": {} })).await
	}

	pub fn open(&self, uri: &str, version: i32, text: &str) {
		self.notify(
			"textDocument/didOpen",
			json!({
				"textDocument": { "uri": uri, "languageId": "plaintext", "version": version, "text": text }
			}),
		);
	}

	pub fn change(&self, uri: &str, version: i32, changes: JsonValue) {
		self.notify(
			"textDocument/didChange",
			json!({ "textDocument": { "uri": uri, "version": version }, "contentChanges": changes }),
		);
	}

	pub fn replace(&self, uri: &str, version: i32, text: &str) {
		self.change(uri, version, json!([{ "text": text }]));
	}

	pub fn close(&self, uri: &str) {
		self.notify("textDocument/didClose", json!({ "textDocument": { "uri": uri } }));
	}

	pub async fn hover(&self, uri: &str, line: u32, character: u32) -> JsonValue {
		ok(self
			.request(
				"textDocument/hover",
				json!({ "textDocument": { "uri": uri }, "position": { "line": line, "character": character } }),
			)
			.await)
	}

	pub async fn next_notification(&mut self) -> AnyNotification {
		tokio::time::timeout(WAIT, self.notifications.recv())
			.await
			.expect("no notification in time")
			.expect("reader task is gone")
	}

	/// Skips notifications until one with `method` arrives.
	pub async fn notification(&mut self, method: &str) -> AnyNotification {
		loop {
			let notif = self.next_notification().await;
			if notif.method == method {
				return notif;
			}
		}
	}

	/// Asserts that no `method` notification arrives within `window`.
	pub async fn assert_quiet(&mut self, method: &str, window: Duration) {
		let deadline = tokio::time::Instant::now() + window;
		loop {
			match tokio::time::timeout_at(deadline, self.notifications.recv()).await {
				Err(_) | Ok(None) => return,
				Ok(Some(notif)) => assert_ne!(notif.method, method, "unexpected {method}: {:?}", notif.params),
			}
		}
	}

	/// Everything received so far, without waiting.
	pub fn drain_notifications(&mut self) -> Vec<AnyNotification> {
		let mut out = Vec::new();
		while let Ok(notif) = self.notifications.try_recv() {
			out.push(notif);
		}
		out
	}

	pub async fn diagnostics(&mut self) -> PublishDiagnosticsParams {
		let notif = self.notification("textDocument/publishDiagnostics").await;
		serde_json::from_value(notif.params).expect("malformed publishDiagnostics")
	}

	/// Waits for diagnostics of `uri` at `version`, skipping older publications.
	pub async fn diagnostics_for(&mut self, uri: &str, version: i32) -> PublishDiagnosticsParams {
		loop {
			let params = self.diagnostics().await;
			if params.uri.as_str() == uri && params.version == Some(version) {
				return params;
			}
		}
	}

	pub async fn server_request(&mut self) -> AnyRequest {
		tokio::time::timeout(WAIT, self.server_requests.recv())
			.await
			.expect("no server request in time")
			.expect("reader task is gone")
	}
}

pub async fn response(rx: oneshot::Receiver<AnyResponse>) -> AnyResponse {
	tokio::time::timeout(WAIT, rx)
		.await
		.expect("no response in time")
		.expect("response slot dropped")
}

/// The result of a successful response; `null` results come back as [`JsonValue::Null`].
pub fn ok(resp: AnyResponse) -> JsonValue {
	if let Some(err) = resp.error {
		panic!("request {:?} failed: {err}", resp.id);
	}
	resp.result.unwrap_or(JsonValue::Null)
}

pub fn err(resp: AnyResponse) -> ResponseError {
	resp.error.unwrap_or_else(|| panic!("request {:?} unexpectedly succeeded", resp.id))
}
