//! JSON-RPC envelope types shared by both directions of the connection.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Identifier of a JSON-RPC request.
///
/// Inbound ids are chosen by the client, outbound ids by the main loop. The wire
/// representation overlaps, so the two are always tracked in separate tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	/// Numeric id.
	Number(i32),
	/// String id.
	String(String),
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => write!(f, "{n}"),
			Self::String(s) => write!(f, "{s:?}"),
		}
	}
}

impl From<lsp_types::NumberOrString> for RequestId {
	fn from(id: lsp_types::NumberOrString) -> Self {
		match id {
			lsp_types::NumberOrString::Number(n) => Self::Number(n),
			lsp_types::NumberOrString::String(s) => Self::String(s),
		}
	}
}

/// A request with untyped params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AnyRequest {
	/// The request id.
	pub id: RequestId,
	/// The method to be invoked.
	pub method: String,
	/// The method's params.
	#[serde(default, skip_serializing_if = "JsonValue::is_null")]
	pub params: JsonValue,
}

impl AnyRequest {
	/// Creates a request. Outbound requests get their real id assigned by the main loop.
	#[must_use]
	pub fn new(id: RequestId, method: impl Into<String>, params: JsonValue) -> Self {
		Self {
			id,
			method: method.into(),
			params,
		}
	}
}

/// A notification with untyped params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AnyNotification {
	/// The method to be invoked.
	pub method: String,
	/// The notification's params.
	#[serde(default, skip_serializing_if = "JsonValue::is_null")]
	pub params: JsonValue,
}

impl AnyNotification {
	/// Creates a notification.
	#[must_use]
	pub fn new(method: impl Into<String>, params: JsonValue) -> Self {
		Self {
			method: method.into(),
			params,
		}
	}
}

/// A response with either an untyped result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct AnyResponse {
	/// The request id this response answers.
	pub id: RequestId,
	/// The result of a successful request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// The error of a failed request.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

impl AnyResponse {
	/// Creates a successful response.
	#[must_use]
	pub fn new_ok(id: RequestId, result: JsonValue) -> Self {
		Self {
			id,
			result: Some(result),
			error: None,
		}
	}

	/// Creates an error response.
	#[must_use]
	pub fn new_err(id: RequestId, error: ResponseError) -> Self {
		Self {
			id,
			result: None,
			error: Some(error),
		}
	}
}

/// The error object of a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[non_exhaustive]
#[error("{message} ({code})")]
pub struct ResponseError {
	/// A number indicating the error type that occurred.
	pub code: ErrorCode,
	/// A short description of the error.
	pub message: String,
	/// Additional information about the error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}

impl ResponseError {
	/// Creates an error without additional data.
	#[must_use]
	pub fn new(code: ErrorCode, message: impl fmt::Display) -> Self {
		Self {
			code,
			message: message.to_string(),
			data: None,
		}
	}

	/// Attaches additional data to the error.
	#[must_use]
	pub fn with_data(mut self, data: JsonValue) -> Self {
		self.data = Some(data);
		self
	}
}

/// A JSON-RPC or LSP error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

impl ErrorCode {
	/// Invalid JSON was received.
	pub const PARSE_ERROR: Self = Self(-32700);
	/// The JSON sent is not a valid request object.
	pub const INVALID_REQUEST: Self = Self(-32600);
	/// The method does not exist or is not available.
	pub const METHOD_NOT_FOUND: Self = Self(-32601);
	/// Invalid method parameters.
	pub const INVALID_PARAMS: Self = Self(-32602);
	/// Internal JSON-RPC error.
	pub const INTERNAL_ERROR: Self = Self(-32603);
	/// A request arrived before `initialize`.
	pub const SERVER_NOT_INITIALIZED: Self = Self(-32002);
	/// Unknown error code.
	pub const UNKNOWN_ERROR_CODE: Self = Self(-32001);
	/// A request failed but was syntactically correct.
	pub const REQUEST_FAILED: Self = Self(-32803);
	/// The server cancelled the request.
	pub const SERVER_CANCELLED: Self = Self(-32802);
	/// The document changed while the request was computed.
	pub const CONTENT_MODIFIED: Self = Self(-32801);
	/// The client cancelled the request.
	pub const REQUEST_CANCELLED: Self = Self(-32800);
}
