//! Transport framing and envelope codec.
//!
//! Every message on the wire is a `Content-Length` framed JSON body:
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"initialized","params":{}}
//! ```
//!
//! Framing failures are fatal for the connection because the stream position is
//! lost. A body that is framed correctly but does not decode is recoverable: see
//! [`DecodeError`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{AnyNotification, AnyRequest, AnyResponse, RequestId};
use crate::{Error, Result};

const CONTENT_LENGTH: &str = "Content-Length";

/// A decoded JSON-RPC message of either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// A request expecting a response.
	Request(AnyRequest),
	/// A response to an earlier request.
	Response(AnyResponse),
	/// A one-way notification.
	Notification(AnyNotification),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
enum Version {
	#[default]
	#[serde(rename = "2.0")]
	V2,
}

#[derive(Serialize, Deserialize)]
struct RawMessage<T> {
	#[serde(default)]
	jsonrpc: Version,
	#[serde(flatten)]
	inner: T,
}

/// A framed body that could not be decoded into a [`Message`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("undecodable message: {reason}")]
pub struct DecodeError {
	/// The request id, when the body was a request whose id could still be read.
	pub id: Option<RequestId>,
	/// Why decoding failed.
	pub reason: String,
}

impl Message {
	/// Decodes a framed body.
	///
	/// # Errors
	///
	/// Returns [`DecodeError`] when the body is not JSON or not a JSON-RPC envelope.
	/// The id is recovered only for bodies that look like requests, so callers never
	/// answer a malformed response with another response.
	pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
		let value: JsonValue = serde_json::from_slice(body).map_err(|e| DecodeError {
			id: None,
			reason: e.to_string(),
		})?;
		let id = value
			.get("method")
			.and(value.get("id"))
			.and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
		serde_json::from_value::<RawMessage<Self>>(value)
			.map(|raw| raw.inner)
			.map_err(|e| DecodeError {
				id,
				reason: e.to_string(),
			})
	}

	/// Encodes this message as a JSON body without framing.
	///
	/// # Errors
	///
	/// Fails only if a payload cannot be represented as JSON.
	pub fn encode(&self) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(&RawMessage {
			jsonrpc: Version::V2,
			inner: self,
		})?)
	}

	/// Reads and decodes one message.
	///
	/// Decoding failures are reported as [`Error::Protocol`]. The main loop uses
	/// [`read_frame`] and [`Message::decode`] separately to recover from them.
	///
	/// # Errors
	///
	/// See [`read_frame`].
	pub async fn read(input: &mut (impl AsyncBufRead + Unpin)) -> Result<Self> {
		let body = read_frame(input).await?;
		Self::decode(&body).map_err(|e| Error::Protocol(e.to_string()))
	}

	/// Encodes, frames and writes this message, then flushes `output`.
	///
	/// # Errors
	///
	/// Returns [`Error::Io`] when writing fails.
	pub async fn write(&self, output: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
		let body = self.encode()?;
		let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
		output.write_all(header.as_bytes()).await?;
		output.write_all(&body).await?;
		output.flush().await?;
		Ok(())
	}
}

/// Reads one framed body from `input`.
///
/// Headers other than `Content-Length` are ignored. Blank lines before the first
/// header are skipped.
///
/// # Errors
///
/// - [`Error::Eof`] when the stream ends before a header starts.
/// - [`Error::Protocol`] on a malformed header, a missing `Content-Length`, or a
///   stream that ends before the declared body length.
/// - [`Error::Io`] when the stream fails.
pub async fn read_frame(input: &mut (impl AsyncBufRead + Unpin)) -> Result<Vec<u8>> {
	let mut line = String::new();
	let mut content_len = None;
	let mut saw_header = false;
	loop {
		line.clear();
		if input.read_line(&mut line).await? == 0 {
			if saw_header {
				return Err(Error::Protocol("stream ended inside message header".into()));
			}
			return Err(Error::Eof);
		}
		let header = line.trim_end_matches(['\r', '\n']);
		if header.is_empty() {
			if saw_header {
				break;
			}
			continue;
		}
		saw_header = true;
		let (name, value) = header
			.split_once(':')
			.ok_or_else(|| Error::Protocol(format!("invalid header line: {header:?}")))?;
		if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
			let len = value
				.trim()
				.parse::<usize>()
				.map_err(|_| Error::Protocol(format!("invalid {CONTENT_LENGTH}: {:?}", value.trim())))?;
			content_len = Some(len);
		}
	}

	let len = content_len.ok_or_else(|| Error::Protocol(format!("missing {CONTENT_LENGTH} header")))?;
	let limit = u64::try_from(len).map_err(|_| Error::Protocol(format!("{CONTENT_LENGTH} too large: {len}")))?;
	// The buffer grows with the bytes that actually arrive, never with the header's claim.
	let mut body = Vec::new();
	(&mut *input).take(limit).read_to_end(&mut body).await?;
	if body.len() != len {
		return Err(Error::Protocol(format!(
			"stream ended inside message body ({} of {len} bytes)",
			body.len()
		)));
	}
	Ok(body)
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tokio::io::BufReader;

	use super::*;
	use crate::types::{ErrorCode, ResponseError};

	fn framed(body: &str) -> Vec<u8> {
		format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
	}

	#[tokio::test]
	async fn reads_request_with_extra_headers() {
		let body = r#"{"jsonrpc":"2.0","id":7,"method":"textDocument/hover","params":{"x":1}}"#;
		let raw = format!(
			"Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
			body.len(),
			body
		);
		let mut input = BufReader::new(raw.as_bytes());

		let Message::Request(req) = Message::read(&mut input).await.unwrap() else {
			panic!("expected request");
		};
		assert_eq!(req.id, RequestId::Number(7));
		assert_eq!(req.method, "textDocument/hover");
		assert_eq!(req.params, json!({"x": 1}));
	}

	#[tokio::test]
	async fn classifies_all_three_shapes() {
		let mut raw = framed(r#"{"jsonrpc":"2.0","method":"exit"}"#);
		raw.extend(framed(r#"{"jsonrpc":"2.0","id":"a","result":null}"#));
		raw.extend(framed(r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"nope"}}"#));
		let mut input = BufReader::new(raw.as_slice());

		assert!(matches!(
			Message::read(&mut input).await.unwrap(),
			Message::Notification(n) if n.method == "exit" && n.params.is_null()
		));
		assert!(matches!(
			Message::read(&mut input).await.unwrap(),
			Message::Response(r) if r.id == RequestId::String("a".into()) && r.error.is_none()
		));
		let Message::Response(resp) = Message::read(&mut input).await.unwrap() else {
			panic!("expected response");
		};
		assert_eq!(resp.error.unwrap().code, ErrorCode::METHOD_NOT_FOUND);
		assert!(matches!(Message::read(&mut input).await, Err(Error::Eof)));
	}

	#[tokio::test]
	async fn missing_content_length_is_a_framing_error() {
		let raw = "Content-Type: text/plain\r\n\r\n{}";
		let mut input = BufReader::new(raw.as_bytes());
		assert!(matches!(read_frame(&mut input).await, Err(Error::Protocol(_))));
	}

	#[tokio::test]
	async fn oversized_content_length_is_not_trusted() {
		let raw = "Content-Length: 18446744073709551615\r\n\r\n{}";
		let mut input = BufReader::new(raw.as_bytes());
		assert!(matches!(read_frame(&mut input).await, Err(Error::Protocol(_))));

		let raw = format!("Content-Length: {}\r\n\r\n{{}}", usize::MAX / 2);
		let mut input = BufReader::new(raw.as_bytes());
		assert!(matches!(read_frame(&mut input).await, Err(Error::Protocol(_))));
	}

	#[tokio::test]
	async fn truncated_body_is_a_framing_error() {
		let raw = "Content-Length: 10\r\n\r\n{}";
		let mut input = BufReader::new(raw.as_bytes());
		assert!(matches!(read_frame(&mut input).await, Err(Error::Protocol(_))));
	}

	#[test]
	fn decode_recovers_request_id_from_bad_envelope() {
		let err = Message::decode(br#"{"jsonrpc":"2.0","id":12,"method":42}"#).unwrap_err();
		assert_eq!(err.id, Some(RequestId::Number(12)));

		let err = Message::decode(b"{not json").unwrap_err();
		assert_eq!(err.id, None);
	}

	#[tokio::test]
	async fn write_emits_version_and_length() {
		let msg = Message::Response(AnyResponse::new_err(
			RequestId::Number(1),
			ResponseError::new(ErrorCode::INTERNAL_ERROR, "boom"),
		));
		let mut out = Vec::new();
		msg.write(&mut out).await.unwrap();

		let text = String::from_utf8(out).unwrap();
		let (header, body) = text.split_once("\r\n\r\n").unwrap();
		assert_eq!(header, format!("Content-Length: {}", body.len()));
		let value: JsonValue = serde_json::from_str(body).unwrap();
		assert_eq!(value["jsonrpc"], "2.0");
		assert_eq!(value["error"]["code"], -32603);
		assert!(value.get("result").is_none());
	}
}
