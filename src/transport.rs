//! JSON-RPC framing and the raw message model.
//!
//! LSP messages are JSON values framed by HTTP-like headers:
//!
//! ```text
//! Content-Length: <n>\r\n
//! Content-Type: application/vscode-jsonrpc; charset=utf-8\r\n
//! \r\n
//! <n bytes of JSON>
//! ```
//!
//! This module owns both directions: [`encode_request`] and friends produce
//! framed bytes, [`parse_frame`] extracts whole messages from a caller-fed
//! byte buffer, leaving the buffer untouched while a frame is incomplete.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ProtocolError;

const CONTENT_TYPE: &str = "application/vscode-jsonrpc; charset=utf-8";

/// Request ID (can be number or string).
///
/// The client only issues numbers, but servers are free to use strings for
/// their own requests and we must echo whatever they chose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => fmt::Display::fmt(n, f),
            // Debug, so that `92` and `"92"` stay distinguishable in logs.
            RequestId::String(s) => fmt::Debug::fmt(s, f),
        }
    }
}

/// JSON-RPC request from the server (has an id, expects a response).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response. Exactly one of `result`/`error` is meaningful; an
/// absent `error` means success even when `result` is null.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    pub result: Option<Value>,
    pub error: Option<ResponseError>,
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One decoded wire message, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 96);
    out.extend_from_slice(
        format!(
            "Content-Length: {}\r\nContent-Type: {}\r\n\r\n",
            body.len(),
            CONTENT_TYPE
        )
        .as_bytes(),
    );
    out.extend_from_slice(&body);
    out
}

fn serialize_body(obj: Map<String, Value>) -> Vec<u8> {
    serde_json::to_vec(&Value::Object(obj)).expect("JSON object serialization cannot fail")
}

/// Encodes a framed request.
pub fn encode_request(id: i64, method: &str, params: Option<Value>) -> Vec<u8> {
    let mut obj = Map::new();
    obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    obj.insert("id".to_string(), Value::Number(id.into()));
    obj.insert("method".to_string(), Value::String(method.to_string()));
    if let Some(params) = params {
        obj.insert("params".to_string(), params);
    }
    frame(serialize_body(obj))
}

/// Encodes a framed notification.
pub fn encode_notification(method: &str, params: Option<Value>) -> Vec<u8> {
    let mut obj = Map::new();
    obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    obj.insert("method".to_string(), Value::String(method.to_string()));
    if let Some(params) = params {
        obj.insert("params".to_string(), params);
    }
    frame(serialize_body(obj))
}

/// Encodes a framed response bound to a peer-assigned id.
pub fn encode_response(
    id: &RequestId,
    result: Option<Value>,
    error: Option<&ResponseError>,
) -> Vec<u8> {
    let mut obj = Map::new();
    obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    obj.insert(
        "id".to_string(),
        serde_json::to_value(id).expect("request ids serialize to JSON"),
    );
    match error {
        Some(error) => {
            obj.insert(
                "error".to_string(),
                serde_json::to_value(error).expect("response errors serialize to JSON"),
            );
        }
        None => {
            obj.insert("result".to_string(), result.unwrap_or(Value::Null));
        }
    }
    frame(serialize_body(obj))
}

/// Extracts the next whole frame from `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame; no
/// bytes are consumed in that case. On success the frame's bytes are drained
/// from the buffer and its messages are returned in body order (a batch array
/// yields one message per element). Peer mistakes in the framing or JSON are
/// reported as [`ProtocolError`]s and consume nothing.
pub fn parse_frame(buf: &mut Vec<u8>) -> Result<Option<Vec<JsonRpcMessage>>, ProtocolError> {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };

    let (content_length, charset) = parse_headers(&buf[..header_end])?;
    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("utf8") {
        return Err(ProtocolError::UnsupportedCharset(charset));
    }

    let body_start = header_end + 4;
    if buf.len() < body_start + content_length {
        return Ok(None);
    }

    let body: Value = serde_json::from_slice(&buf[body_start..body_start + content_length])?;

    let mut messages = Vec::new();
    match body {
        // A batch is answered by a batch; each element stands alone.
        Value::Array(elements) => {
            for element in elements {
                if let Some(message) = classify(element)? {
                    messages.push(message);
                }
            }
        }
        other => {
            if let Some(message) = classify(other)? {
                messages.push(message);
            }
        }
    }

    buf.drain(..body_start + content_length);
    Ok(Some(messages))
}

/// Parses the header block, returning the declared content length and charset.
fn parse_headers(block: &[u8]) -> Result<(usize, String), ProtocolError> {
    let block = std::str::from_utf8(block)
        .map_err(|_| ProtocolError::MalformedHeader(String::from_utf8_lossy(block).into_owned()))?;

    let mut content_length = None;
    let mut content_type = None;

    for line in block.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(ProtocolError::MalformedHeader(line.to_string()));
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        match name.as_str() {
            "content-length" => {
                content_length = Some(value.parse::<usize>().map_err(|_| {
                    ProtocolError::InvalidContentLength(value.to_string())
                })?);
            }
            "content-type" => content_type = Some(value.to_string()),
            // Unknown headers are tolerated, per the robustness principle.
            _ => log::debug!("ignoring unknown header: {}", name),
        }
    }

    let content_length = content_length.ok_or(ProtocolError::MissingContentLength)?;

    // Some servers omit Content-Type entirely; the default is the only value
    // the protocol defines anyway.
    let content_type = content_type.unwrap_or_else(|| CONTENT_TYPE.to_string());
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or("").trim();
    if !mime.starts_with("application/vscode-jsonrpc") {
        return Err(ProtocolError::UnsupportedContentType(content_type.clone()));
    }
    let charset = parts
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_else(|| "utf-8".to_string());

    Ok((content_length, charset))
}

/// Classifies one decoded JSON object by shape.
///
/// Presence of `method` makes it a request or notification (depending on
/// `id`); absence of `method` with an `id` makes it a response. An object
/// that fits neither shape is skipped with a warning rather than killing the
/// session; real servers occasionally emit such debris.
fn classify(value: Value) -> Result<Option<JsonRpcMessage>, ProtocolError> {
    let Value::Object(mut obj) = value else {
        return Err(ProtocolError::Malformed(value));
    };

    // `jsonrpc` is verified and discarded; it carries no information.
    if let Some(version) = obj.remove("jsonrpc") {
        if version.as_str() != Some("2.0") {
            return Err(ProtocolError::VersionMismatch(version.to_string()));
        }
    }

    let method = match obj.remove("method") {
        Some(Value::String(method)) => Some(method),
        Some(other) => return Err(ProtocolError::Malformed(other)),
        None => None,
    };
    let id = obj
        .remove("id")
        .map(serde_json::from_value::<RequestId>)
        .transpose()?;
    let params = obj.remove("params").filter(|v| !v.is_null());

    Ok(match (method, id) {
        (Some(method), Some(id)) => Some(JsonRpcMessage::Request(JsonRpcRequest {
            id,
            method,
            params,
        })),
        (Some(method), None) => {
            Some(JsonRpcMessage::Notification(JsonRpcNotification { method, params }))
        }
        (None, Some(id)) => {
            let result = obj.remove("result").filter(|v| !v.is_null());
            let error = obj
                .remove("error")
                .filter(|v| !v.is_null())
                .map(serde_json::from_value::<ResponseError>)
                .transpose()?;
            Some(JsonRpcMessage::Response(JsonRpcResponse { id, result, error }))
        }
        (None, None) => {
            log::warn!("skipping message with neither method nor id");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_all(bytes: &[u8]) -> Vec<JsonRpcMessage> {
        let mut buf = bytes.to_vec();
        let mut out = Vec::new();
        while let Some(messages) = parse_frame(&mut buf).unwrap() {
            out.extend(messages);
        }
        assert!(buf.is_empty());
        out
    }

    #[test]
    fn request_round_trip() {
        let bytes = encode_request(7, "textDocument/hover", Some(json!({"x": 1})));
        let messages = parse_all(&bytes);
        assert_eq!(
            messages,
            vec![JsonRpcMessage::Request(JsonRpcRequest {
                id: RequestId::Number(7),
                method: "textDocument/hover".to_string(),
                params: Some(json!({"x": 1})),
            })]
        );
    }

    #[test]
    fn notification_round_trip() {
        let bytes = encode_notification("exit", None);
        let messages = parse_all(&bytes);
        assert_eq!(
            messages,
            vec![JsonRpcMessage::Notification(JsonRpcNotification {
                method: "exit".to_string(),
                params: None,
            })]
        );
    }

    #[test]
    fn response_round_trip() {
        let bytes = encode_response(&RequestId::Number(3), Some(json!([1, 2])), None);
        let messages = parse_all(&bytes);
        assert_eq!(
            messages,
            vec![JsonRpcMessage::Response(JsonRpcResponse {
                id: RequestId::Number(3),
                result: Some(json!([1, 2])),
                error: None,
            })]
        );
    }

    #[test]
    fn error_response_round_trip() {
        let error = ResponseError {
            code: -32601,
            message: "method not found".to_string(),
            data: None,
        };
        let bytes = encode_response(&RequestId::String("a".to_string()), None, Some(&error));
        let messages = parse_all(&bytes);
        match &messages[0] {
            JsonRpcMessage::Response(response) => {
                assert_eq!(response.id, RequestId::String("a".to_string()));
                assert_eq!(response.error.as_ref().unwrap().code, -32601);
                assert!(response.result.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn headers_are_case_insensitive() {
        let body = br#"{"jsonrpc":"2.0","method":"m"}"#;
        let mut buf = format!(
            "CONTENT-LENGTH: {}\r\ncontent-TYPE: application/vscode-jsonrpc; charset=UTF-8\r\n\r\n",
            body.len()
        )
        .into_bytes();
        buf.extend_from_slice(body);
        let messages = parse_frame(&mut buf).unwrap().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn content_type_defaults_when_absent() {
        let body = br#"{"jsonrpc":"2.0","method":"m","params":{}}"#;
        let mut buf = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        buf.extend_from_slice(body);
        let messages = parse_frame(&mut buf).unwrap().unwrap();
        match &messages[0] {
            JsonRpcMessage::Notification(notification) => assert_eq!(notification.method, "m"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn incomplete_header_leaves_buffer_untouched() {
        let mut buf = b"Content-Length: 10\r\n".to_vec();
        let before = buf.clone();
        assert!(parse_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf, before);
    }

    #[test]
    fn short_body_leaves_buffer_untouched() {
        let mut buf = b"Content-Length: 50\r\n\r\n{\"jsonrpc\":\"2.0\"".to_vec();
        let before = buf.clone();
        assert!(parse_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf, before);
    }

    #[test]
    fn missing_content_length_is_rejected() {
        let mut buf = b"Content-Type: application/vscode-jsonrpc\r\n\r\n{}".to_vec();
        match parse_frame(&mut buf) {
            Err(ProtocolError::MissingContentLength) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn non_numeric_content_length_is_rejected() {
        let mut buf = b"Content-Length: ten\r\n\r\n{}".to_vec();
        match parse_frame(&mut buf) {
            Err(ProtocolError::InvalidContentLength(value)) => assert_eq!(value, "ten"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn foreign_content_type_is_rejected() {
        let body = b"{}";
        let mut buf = format!(
            "Content-Length: {}\r\nContent-Type: text/plain\r\n\r\n",
            body.len()
        )
        .into_bytes();
        buf.extend_from_slice(body);
        match parse_frame(&mut buf) {
            Err(ProtocolError::UnsupportedContentType(_)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let body = br#"{"jsonrpc":"1.0","id":1,"result":{}}"#;
        let mut buf = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        buf.extend_from_slice(body);
        match parse_frame(&mut buf) {
            Err(ProtocolError::VersionMismatch(_)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn shapeless_object_is_skipped() {
        let body = b"{}";
        let mut buf = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        buf.extend_from_slice(body);
        let messages = parse_frame(&mut buf).unwrap().unwrap();
        assert!(messages.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn batch_preserves_order() {
        let body = serde_json::to_vec(&json!([
            {"jsonrpc": "2.0", "id": 1, "result": null},
            {"jsonrpc": "2.0", "method": "window/logMessage", "params": {"type": 3, "message": "hi"}},
        ]))
        .unwrap();
        let mut buf = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        buf.extend_from_slice(&body);
        let messages = parse_frame(&mut buf).unwrap().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], JsonRpcMessage::Response(_)));
        assert!(matches!(messages[1], JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn back_to_back_frames_parse_individually() {
        let mut buf = encode_notification("a", None);
        buf.extend_from_slice(&encode_notification("b", None));
        let first = parse_frame(&mut buf).unwrap().unwrap();
        assert!(matches!(
            &first[0],
            JsonRpcMessage::Notification(n) if n.method == "a"
        ));
        let second = parse_frame(&mut buf).unwrap().unwrap();
        assert!(matches!(
            &second[0],
            JsonRpcMessage::Notification(n) if n.method == "b"
        ));
        assert!(buf.is_empty());
    }
}
