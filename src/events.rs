//! Typed events delivered by [`Client::feed`].
//!
//! Every inbound frame becomes exactly one event (batches become one event
//! per element). Responses are decoded according to the method of the
//! outbound request they answer; server-originated requests additionally
//! carry a one-shot [`ReplyHandle`] that [`Client::reply`] turns into a
//! correctly-shaped response frame.
//!
//! [`Client::feed`]: crate::client::Client::feed
//! [`Client::reply`]: crate::client::Client::reply

use lsp_types::{
    CallHierarchyItem, CompletionList, ConfigurationItem, DocumentSymbolResponse, FoldingRange,
    GotoDefinitionResponse, HoverContents, InitializeResult, InlayHint, Location,
    LogMessageParams, MessageActionItem, MessageType, ProgressToken, PublishDiagnosticsParams,
    Range, Registration, ShowMessageParams, SignatureInformation, TextEdit,
    WorkDoneProgressBegin, WorkDoneProgressEnd, WorkDoneProgressReport, WorkspaceEdit,
    WorkspaceFolder, WorkspaceSymbolResponse,
};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

use crate::transport::{JsonRpcMessage, RequestId};

/// Permission to answer one server-originated request.
///
/// The handle is consumed by [`Client::reply`], which enqueues a response
/// bound to the peer-assigned id. `T` is the result shape the request
/// expects; `()` serializes to a null result. Handles are deliberately not
/// cloneable, so a request cannot be answered twice.
///
/// [`Client::reply`]: crate::client::Client::reply
pub struct ReplyHandle<T> {
    pub(crate) id: RequestId,
    pub(crate) session: u64,
    pub(crate) _response: PhantomData<fn(T)>,
}

impl<T> ReplyHandle<T> {
    pub(crate) fn new(id: RequestId, session: u64) -> Self {
        Self {
            id,
            session,
            _response: PhantomData,
        }
    }

    /// The id the server assigned to its request.
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl<T> fmt::Debug for ReplyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle").field("id", &self.id).finish()
    }
}

/// Everything the server can tell us, decoded.
///
/// Response events carry the integer id of the outbound request they answer,
/// so callers can pair them with the ids returned by the request methods.
#[derive(Debug)]
pub enum Event {
    /// The server answered `initialize`; the handshake is complete and the
    /// `initialized` notification has been queued.
    Initialized(InitializeResult),
    /// The server answered `shutdown`; only `exit` is legal now.
    Shutdown,
    /// A well-formed response carrying an error instead of a result.
    ResponseError {
        id: i64,
        code: i64,
        message: String,
        data: Option<Value>,
    },
    /// `textDocument/completion` result. A bare item array is normalized
    /// into a complete list; a null result becomes `None`.
    Completion {
        id: i64,
        list: Option<CompletionList>,
    },
    /// `textDocument/hover` result; a null result becomes empty contents.
    Hover {
        id: i64,
        contents: HoverContents,
        range: Option<Range>,
    },
    /// `textDocument/signatureHelp` result; a null result becomes an empty
    /// signature list.
    SignatureHelp {
        id: i64,
        signatures: Vec<SignatureInformation>,
        active_signature: Option<u32>,
        active_parameter: Option<u32>,
    },
    /// `textDocument/definition` result: one location, several, or links.
    Definition {
        id: i64,
        result: Option<GotoDefinitionResponse>,
    },
    /// `textDocument/declaration` result.
    Declaration {
        id: i64,
        result: Option<GotoDefinitionResponse>,
    },
    /// `textDocument/typeDefinition` result.
    TypeDefinition {
        id: i64,
        result: Option<GotoDefinitionResponse>,
    },
    /// `textDocument/implementation` result.
    Implementation {
        id: i64,
        result: Option<GotoDefinitionResponse>,
    },
    /// `textDocument/references` result.
    References {
        id: i64,
        result: Option<Vec<Location>>,
    },
    /// `textDocument/documentSymbol` result, flat or hierarchical.
    DocumentSymbols {
        id: i64,
        result: Option<DocumentSymbolResponse>,
    },
    /// `textDocument/foldingRange` result.
    FoldingRanges {
        id: i64,
        result: Option<Vec<FoldingRange>>,
    },
    /// `textDocument/inlayHint` result.
    InlayHints {
        id: i64,
        result: Option<Vec<InlayHint>>,
    },
    /// `textDocument/prepareCallHierarchy` result.
    CallHierarchyItems {
        id: i64,
        result: Option<Vec<CallHierarchyItem>>,
    },
    /// `textDocument/formatting` or `textDocument/rangeFormatting` result.
    DocumentFormatting {
        id: i64,
        result: Option<Vec<TextEdit>>,
    },
    /// `textDocument/rename` result.
    WorkspaceEdit {
        id: i64,
        edit: Option<WorkspaceEdit>,
    },
    /// `textDocument/willSaveWaitUntil` result.
    WillSaveWaitUntilEdits { id: i64, edits: Vec<TextEdit> },
    /// `workspace/symbol` result.
    WorkspaceSymbols {
        id: i64,
        result: Option<WorkspaceSymbolResponse>,
    },

    /// `window/showMessage` notification.
    ShowMessage(ShowMessageParams),
    /// `window/logMessage` notification.
    LogMessage(LogMessageParams),
    /// `textDocument/publishDiagnostics` notification.
    PublishDiagnostics(PublishDiagnosticsParams),
    /// `$/progress` with `kind == "begin"` for a registered token.
    WorkDoneProgressBegin {
        token: ProgressToken,
        progress: WorkDoneProgressBegin,
    },
    /// `$/progress` with `kind == "report"` for a registered token.
    WorkDoneProgressReport {
        token: ProgressToken,
        progress: WorkDoneProgressReport,
    },
    /// `$/progress` with `kind == "end"` for a registered token. The token
    /// is dropped from the registry.
    WorkDoneProgressEnd {
        token: ProgressToken,
        progress: WorkDoneProgressEnd,
    },

    /// `window/showMessageRequest`; reply with the chosen action, or `None`
    /// if the user dismissed the message.
    ShowMessageRequest {
        typ: MessageType,
        message: String,
        actions: Option<Vec<MessageActionItem>>,
        reply: ReplyHandle<Option<MessageActionItem>>,
    },
    /// `window/workDoneProgress/create`; the token is registered so later
    /// `$/progress` notifications route to the variants above.
    WorkDoneProgressCreate {
        token: ProgressToken,
        reply: ReplyHandle<()>,
    },
    /// `workspace/workspaceFolders`; reply with the current folder set.
    WorkspaceFolders {
        reply: ReplyHandle<Option<Vec<WorkspaceFolder>>>,
    },
    /// `workspace/configuration`; reply with one settings value per item,
    /// in item order.
    ConfigurationRequest {
        items: Vec<ConfigurationItem>,
        reply: ReplyHandle<Vec<Value>>,
    },
    /// `client/registerCapability`; reply acknowledges the registration.
    RegisterCapabilityRequest {
        registrations: Vec<Registration>,
        reply: ReplyHandle<()>,
    },

    /// A message the client has no decoder for. Notifications may be
    /// ignored; unknown requests have already been answered with a
    /// method-not-found error unless auto-reply was disabled.
    Unhandled(JsonRpcMessage),
}
