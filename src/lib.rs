//! A sans-I/O Language Server Protocol client.
//!
//! This crate speaks the LSP dialect of JSON-RPC 2.0 without performing any
//! I/O of its own. The caller spawns the server, reads its stdout and writes
//! its stdin (or any other transport), and the [`Client`] owns everything in
//! between: framing, request/response correlation, the initialize/shutdown
//! lifecycle, and decoding server messages into typed [`Event`]s. Because
//! nothing here blocks or spawns, the same client embeds identically in a
//! synchronous editor, an async runtime or a test harness.
//!
//! ```
//! use headless_lsp::{Client, ClientOptions, Event};
//!
//! let mut client = Client::new(ClientOptions::default());
//!
//! // The initialize request is queued eagerly; write it to the server.
//! let handshake = client.drain();
//! assert!(handshake.starts_with(b"Content-Length:"));
//!
//! // Bytes read back from the server are fed in; whole frames become events.
//! let body = r#"{"jsonrpc":"2.0","id":0,"result":{"capabilities":{}}}"#;
//! let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
//! let events = client.feed(frame.as_bytes()).unwrap();
//! assert!(matches!(events[0], Event::Initialized(_)));
//! assert!(client.is_initialized());
//! ```

pub mod client;
pub mod diff;
pub mod error;
pub mod events;
pub mod transport;

pub use lsp_types as lsp;

pub use client::{Client, ClientOptions, ClientState, PendingRequest};
pub use diff::{calculate_change_events, whole_document_change};
pub use error::{Error, ProtocolError, Result};
pub use events::{Event, ReplyHandle};
pub use transport::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    ResponseError,
};
