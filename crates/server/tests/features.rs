mod common;

use std::time::Duration;

use common::{TestClient, ok};
use futures::future::join_all;
use lumen_lsp::JsonValue;
use lumen_server::ServerConfig;
use pretty_assertions::assert_eq;
use serde_json::json;

const URI: &str = "file:///hover_test.txt";

#[tokio::test]
async fn hover_shows_the_word_under_the_cursor() {
	let client = TestClient::spawn_default();
	client.initialize().await;
	client.open(URI, 1, "hello world");

	let hover = client.hover(URI, 0, 7).await;
	assert_eq!(hover["contents"]["kind"], json!("markdown"));
	assert!(hover["contents"]["value"].as_str().unwrap().contains("world"));
	assert_eq!(
		hover["range"],
		json!({ "start": { "line": 0, "character": 6 }, "end": { "line": 0, "character": 11 } })
	);
}

#[tokio::test]
async fn hover_degrades_to_null() {
	let client = TestClient::spawn_default();
	client.initialize().await;
	client.open(URI, 1, "hello   world");

	assert_eq!(client.hover("file:///unknown.txt", 0, 0).await, JsonValue::Null);
	assert_eq!(client.hover(URI, 0, 6).await, JsonValue::Null);
	assert_eq!(client.hover(URI, 9, 0).await, JsonValue::Null);
}

#[tokio::test]
async fn completion_offers_document_words() {
	let client = TestClient::spawn_default();
	client.initialize().await;
	client.open(URI, 1, "alpha alphabet beta\nalp");

	let result = ok(client
		.request(
			"textDocument/completion",
			json!({ "textDocument": { "uri": URI }, "position": { "line": 1, "character": 3 } }),
		)
		.await);
	let labels: Vec<&str> = result
		.as_array()
		.unwrap()
		.iter()
		.map(|item| item["label"].as_str().unwrap())
		.collect();
	assert_eq!(labels, ["alpha", "alphabet"]);
}

#[tokio::test]
async fn opening_a_document_shows_a_message() {
	let mut client = TestClient::spawn_default();
	client.initialize().await;
	client.open("file:///test.txt", 1, "This is a TODO comment");

	let notif = client.notification("window/showMessage").await;
	let message = notif.params["message"].as_str().unwrap();
	assert!(message.to_lowercase().contains("opened"), "{message}");
	assert!(message.contains("file:///test.txt"), "{message}");
}

#[tokio::test]
async fn open_message_can_be_disabled() {
	let mut client = TestClient::spawn(ServerConfig {
		show_open_message: false,
		..ServerConfig::default()
	});
	client.initialize().await;
	client.open("file:///test.txt", 1, "quiet");

	client.diagnostics_for("file:///test.txt", 1).await;
	client.assert_quiet("window/showMessage", Duration::from_millis(200)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_hovers_with_interleaved_changes() {
	let client = TestClient::spawn_default();
	client.initialize().await;
	client.open(URI, 1, "hover target text");

	let hovers = (0..75).map(|i| {
		if i % 10 == 0 {
			client.replace(URI, 2 + i / 10, "hover target text again");
		}
		client.hover(URI, 0, 2)
	});
	let results = tokio::time::timeout(Duration::from_secs(10), join_all(hovers))
		.await
		.expect("hovers did not complete in time");

	assert_eq!(results.len(), 75);
	for hover in results {
		assert!(hover["contents"]["value"].as_str().unwrap().contains("hover"));
	}
}
