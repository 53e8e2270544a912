//! Error types for the protocol layer.
//!
//! Underflow (a frame that has not fully arrived) is not an error; the parser
//! simply reports that it needs more bytes. Server-reported JSON-RPC errors
//! are not errors either, they are delivered as [`Event::ResponseError`]
//! values so the caller can decide what to do with them.
//!
//! [`Event::ResponseError`]: crate::events::Event::ResponseError

use thiserror::Error;

use crate::client::ClientState;

/// A violation of the wire protocol by the peer.
///
/// Protocol errors are fatal to the session: [`Client::feed`] returns the
/// error, marks the stream as poisoned and rejects all further input.
/// Constructing a fresh client is the reset path.
///
/// [`Client::feed`]: crate::client::Client::feed
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A header line did not have the `Name: value` shape, or was not ASCII.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The header block had no `Content-Length` entry.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// `Content-Length` was present but not a non-negative integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// `Content-Type` named something other than `application/vscode-jsonrpc`.
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    /// The declared charset is one we cannot decode.
    #[error("unsupported charset: {0:?}")]
    UnsupportedCharset(String),

    /// The frame body was not valid JSON, or an id/error member had the
    /// wrong shape.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// A message declared a `jsonrpc` version other than `"2.0"`.
    #[error("unsupported JSON-RPC version: {0:?}")]
    VersionMismatch(String),

    /// A frame body (or batch element) was not a JSON object, or one of its
    /// structural members had the wrong type.
    #[error("malformed message: {0}")]
    Malformed(serde_json::Value),

    /// A lifecycle response arrived in a state that cannot accept it.
    #[error("unexpected {method} response in state {state:?}")]
    UnexpectedLifecycleResponse {
        method: &'static str,
        state: ClientState,
    },

    /// The result or params of a known method failed to decode.
    #[error("malformed {method} payload: {source}")]
    InvalidPayload {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// Input was fed after an earlier protocol error ended the session.
    #[error("input rejected after an earlier protocol error")]
    Poisoned,
}

/// Any error surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A method was called in a state where it is not legal. Nothing was
    /// enqueued; this is a caller bug, not a peer bug.
    #[error("{method} is not legal in state {state:?}")]
    InvalidState {
        method: &'static str,
        state: ClientState,
    },

    /// A reply handle from a different client instance was presented.
    #[error("reply handle does not belong to this client")]
    StaleReply,
}

pub type Result<T> = std::result::Result<T, Error>;
