//! The sans-I/O LSP client.
//!
//! The client never touches a socket, pipe or process. The caller owns the
//! transport: bytes read from the server go into [`Client::feed`], which
//! yields decoded [`Event`]s, and bytes queued by the method surface are
//! collected with [`Client::drain`] and written to the server by the caller.
//! Every operation is synchronous and returns immediately.

use lsp_types::{
    CallHierarchyClientCapabilities, ClientCapabilities, CompletionClientCapabilities,
    CompletionContext, CompletionItemCapability, CompletionItemKind,
    CompletionItemKindCapability, CompletionList, CompletionParams, CompletionResponse,
    ConfigurationParams, DidChangeConfigurationClientCapabilities,
    DidChangeConfigurationParams, DidChangeTextDocumentParams,
    DidChangeWorkspaceFoldersParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, DocumentFormattingParams, DocumentRangeFormattingParams,
    DocumentSymbolClientCapabilities, DocumentSymbolParams,
    DynamicRegistrationClientCapabilities, FoldingRangeClientCapabilities, FoldingRangeParams,
    FormattingOptions, GotoCapability, Hover, HoverClientCapabilities, HoverContents,
    InitializeParams, InitializeResult, InlayHintClientCapabilities, InlayHintParams,
    LogMessageParams, MarkupKind, NumberOrString, ParameterInformationSettings,
    ProgressParams, ProgressParamsValue, ProgressToken, PublishDiagnosticsClientCapabilities,
    PublishDiagnosticsParams, Range, ReferenceContext, ReferenceParams, RegistrationParams,
    RenameClientCapabilities, RenameParams, ShowMessageParams,
    ShowMessageRequestClientCapabilities, ShowMessageRequestParams, SignatureHelp,
    SignatureHelpClientCapabilities, SignatureInformationSettings, SymbolKind,
    SymbolKindCapability, TextDocumentClientCapabilities, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams,
    TextDocumentSaveReason, TextDocumentSyncClientCapabilities, TraceValue, Uri,
    VersionedTextDocumentIdentifier, WillSaveTextDocumentParams, WindowClientCapabilities,
    WorkDoneProgress, WorkDoneProgressCreateParams, WorkspaceClientCapabilities,
    WorkspaceFolder, WorkspaceFoldersChangeEvent, WorkspaceSymbolClientCapabilities,
    WorkspaceSymbolParams,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, ProtocolError, Result};
use crate::events::{Event, ReplyHandle};
use crate::transport::{
    self, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    ResponseError,
};

/// Distinguishes client instances so a [`ReplyHandle`] cannot be redeemed
/// against a client that did not issue it.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where the client is in the initialize/shutdown lifecycle.
///
/// Transitions are one-way; a client is never re-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Freshly constructed, `initialize` not yet queued.
    NotInitialized,
    /// `initialize` queued, waiting for the server's answer.
    WaitingForInitialized,
    /// Handshake complete; the full method surface is legal.
    Normal,
    /// `shutdown` queued, waiting for the server's answer.
    WaitingForShutdown,
    /// Shutdown acknowledged; only `exit` is legal.
    Shutdown,
    /// `exit` queued; the session is over.
    Exited,
}

/// Constructor parameters for [`Client::new`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Pid of the process hosting the client, for the server's orphan check.
    pub process_id: Option<u32>,
    /// Root of the workspace, if there is one.
    pub root_uri: Option<Uri>,
    /// Workspace folders; takes precedence over `root_uri` in modern servers.
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
    /// Server-side trace verbosity.
    pub trace: TraceValue,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            process_id: None,
            root_uri: None,
            workspace_folders: None,
            trace: TraceValue::Off,
        }
    }
}

/// Method and params of an outbound request the server has not answered yet.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: String,
    pub params: Option<Value>,
}

/// A sans-I/O LSP client: bytes in via [`feed`], bytes out via [`drain`].
///
/// [`feed`]: Client::feed
/// [`drain`]: Client::drain
pub struct Client {
    state: ClientState,
    /// Inbound bytes that do not yet form a complete frame.
    recv_buf: Vec<u8>,
    /// Outbound bytes the caller has not drained yet.
    send_buf: Vec<u8>,
    /// Outbound requests awaiting a response, keyed by the id we issued.
    pending: HashMap<i64, PendingRequest>,
    id_counter: i64,
    /// Progress tokens registered via `window/workDoneProgress/create`.
    progress_tokens: HashSet<String>,
    session: u64,
    poisoned: bool,
    reply_unknown: bool,
}

impl Client {
    /// Creates a client and immediately queues the `initialize` request, so
    /// the first [`drain`](Client::drain) already carries the handshake.
    pub fn new(options: ClientOptions) -> Self {
        let mut client = Self {
            state: ClientState::NotInitialized,
            recv_buf: Vec::new(),
            send_buf: Vec::new(),
            pending: HashMap::new(),
            id_counter: 0,
            progress_tokens: HashSet::new(),
            session: SESSION_COUNTER.fetch_add(1, Ordering::Relaxed),
            poisoned: false,
            reply_unknown: true,
        };

        let params = InitializeParams {
            process_id: options.process_id,
            root_uri: options.root_uri,
            workspace_folders: options.workspace_folders,
            trace: Some(options.trace),
            capabilities: client_capabilities(),
            ..Default::default()
        };
        client.send_request("initialize", Some(to_params(&params)));
        client.state = ClientState::WaitingForInitialized;
        client
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Whether the initialize handshake has completed.
    pub fn is_initialized(&self) -> bool {
        self.state != ClientState::NotInitialized
            && self.state != ClientState::WaitingForInitialized
    }

    /// The recorded method and params of an unanswered outbound request.
    pub fn pending_request(&self, id: i64) -> Option<&PendingRequest> {
        self.pending.get(&id)
    }

    /// Ids of all unanswered outbound requests, in no particular order.
    pub fn pending_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.pending.keys().copied()
    }

    /// Controls whether unknown server requests are automatically answered
    /// with a method-not-found error. Defaults to enabled.
    pub fn auto_reply_unknown(&mut self, enabled: bool) {
        self.reply_unknown = enabled;
    }

    /// Returns the queued outbound bytes and clears the buffer.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buf)
    }

    /// Appends received bytes and decodes every complete frame into events,
    /// in arrival order. Bytes forming a partial frame are retained for the
    /// next call. A protocol error poisons the client; all further input is
    /// rejected.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>> {
        if self.poisoned {
            return Err(ProtocolError::Poisoned.into());
        }
        self.recv_buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        match self.pump(&mut events) {
            Ok(()) => Ok(events),
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    fn pump(&mut self, events: &mut Vec<Event>) -> Result<()> {
        while let Some(messages) = transport::parse_frame(&mut self.recv_buf)? {
            for message in messages {
                log::trace!("received: {:?}", message);
                if let Some(event) = self.route(message)? {
                    events.push(event);
                }
            }
        }
        Ok(())
    }

    fn route(&mut self, message: JsonRpcMessage) -> Result<Option<Event>> {
        match message {
            JsonRpcMessage::Response(response) => self.handle_response(response),
            JsonRpcMessage::Request(request) => self.handle_request(request).map(Some),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).map(Some)
            }
        }
    }

    /// Answers a server-originated request. The handle is consumed; `()`
    /// serializes to a null result. Replies presented after `exit` are
    /// silently discarded, matching the one-way lifecycle.
    pub fn reply<T: Serialize>(&mut self, reply: ReplyHandle<T>, result: T) -> Result<()> {
        if reply.session != self.session {
            return Err(Error::StaleReply);
        }
        if self.state == ClientState::Exited {
            log::debug!("discarding reply to {} after exit", reply.id);
            return Ok(());
        }
        let result = serde_json::to_value(&result).map_err(ProtocolError::Json)?;
        self.send_buf
            .extend_from_slice(&transport::encode_response(&reply.id, Some(result), None));
        Ok(())
    }

    // ─── lifecycle ──────────────────────────────────────────────────────

    /// Sends the `shutdown` request and returns its id. Legal in `Normal`.
    pub fn shutdown(&mut self) -> Result<i64> {
        self.require_state("shutdown", ClientState::Normal)?;
        let id = self.send_request("shutdown", None);
        self.state = ClientState::WaitingForShutdown;
        Ok(id)
    }

    /// Sends the `exit` notification. Legal once `shutdown` was answered.
    pub fn exit(&mut self) -> Result<()> {
        self.require_state("exit", ClientState::Shutdown)?;
        self.send_notification("exit", Some(json!({})));
        self.state = ClientState::Exited;
        Ok(())
    }

    /// Sends `$/cancelRequest` for the most recently issued request id. The
    /// pending entry stays; the server is still expected to respond, usually
    /// with a request-cancelled error that arrives as a normal
    /// [`Event::ResponseError`].
    pub fn cancel_last_request(&mut self) -> Result<()> {
        self.require_state("$/cancelRequest", ClientState::Normal)?;
        let last = self.id_counter - 1;
        self.send_notification("$/cancelRequest", Some(json!({ "id": last })));
        Ok(())
    }

    // ─── document lifecycle notifications ───────────────────────────────

    /// Notifies the server that a document was opened.
    pub fn did_open(&mut self, text_document: TextDocumentItem) -> Result<()> {
        self.require_state("textDocument/didOpen", ClientState::Normal)?;
        let params = DidOpenTextDocumentParams { text_document };
        self.send_notification("textDocument/didOpen", Some(to_params(&params)));
        Ok(())
    }

    /// Notifies the server of document changes. Incremental change events
    /// can be produced with [`crate::diff::calculate_change_events`].
    pub fn did_change(
        &mut self,
        text_document: VersionedTextDocumentIdentifier,
        content_changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<()> {
        self.require_state("textDocument/didChange", ClientState::Normal)?;
        let params = DidChangeTextDocumentParams {
            text_document,
            content_changes,
        };
        self.send_notification("textDocument/didChange", Some(to_params(&params)));
        Ok(())
    }

    /// Notifies the server that a document is about to be saved.
    pub fn will_save(
        &mut self,
        text_document: TextDocumentIdentifier,
        reason: TextDocumentSaveReason,
    ) -> Result<()> {
        self.require_state("textDocument/willSave", ClientState::Normal)?;
        let params = WillSaveTextDocumentParams {
            text_document,
            reason,
        };
        self.send_notification("textDocument/willSave", Some(to_params(&params)));
        Ok(())
    }

    /// Notifies the server that a document was saved, optionally with the
    /// saved text.
    pub fn did_save(
        &mut self,
        text_document: TextDocumentIdentifier,
        text: Option<String>,
    ) -> Result<()> {
        self.require_state("textDocument/didSave", ClientState::Normal)?;
        let params = DidSaveTextDocumentParams {
            text_document,
            text,
        };
        self.send_notification("textDocument/didSave", Some(to_params(&params)));
        Ok(())
    }

    /// Notifies the server that a document was closed.
    pub fn did_close(&mut self, text_document: TextDocumentIdentifier) -> Result<()> {
        self.require_state("textDocument/didClose", ClientState::Normal)?;
        let params = DidCloseTextDocumentParams { text_document };
        self.send_notification("textDocument/didClose", Some(to_params(&params)));
        Ok(())
    }

    /// Pushes new settings to the server.
    pub fn did_change_configuration(&mut self, settings: Value) -> Result<()> {
        self.require_state("workspace/didChangeConfiguration", ClientState::Normal)?;
        let params = DidChangeConfigurationParams { settings };
        self.send_notification("workspace/didChangeConfiguration", Some(to_params(&params)));
        Ok(())
    }

    /// Announces added and removed workspace folders.
    pub fn did_change_workspace_folders(
        &mut self,
        added: Vec<WorkspaceFolder>,
        removed: Vec<WorkspaceFolder>,
    ) -> Result<()> {
        self.require_state("workspace/didChangeWorkspaceFolders", ClientState::Normal)?;
        let params = DidChangeWorkspaceFoldersParams {
            event: WorkspaceFoldersChangeEvent { added, removed },
        };
        self.send_notification(
            "workspace/didChangeWorkspaceFolders",
            Some(to_params(&params)),
        );
        Ok(())
    }

    // ─── requests ───────────────────────────────────────────────────────

    /// Requests completions at a position; answered by [`Event::Completion`].
    pub fn completion(
        &mut self,
        position: TextDocumentPositionParams,
        context: Option<CompletionContext>,
    ) -> Result<i64> {
        self.require_state("textDocument/completion", ClientState::Normal)?;
        let params = CompletionParams {
            text_document_position: position,
            context,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        Ok(self.send_request("textDocument/completion", Some(to_params(&params))))
    }

    /// Requests hover information; answered by [`Event::Hover`].
    pub fn hover(&mut self, position: TextDocumentPositionParams) -> Result<i64> {
        self.require_state("textDocument/hover", ClientState::Normal)?;
        Ok(self.send_request("textDocument/hover", Some(to_params(&position))))
    }

    /// Requests signature help; answered by [`Event::SignatureHelp`].
    pub fn signature_help(&mut self, position: TextDocumentPositionParams) -> Result<i64> {
        self.require_state("textDocument/signatureHelp", ClientState::Normal)?;
        Ok(self.send_request("textDocument/signatureHelp", Some(to_params(&position))))
    }

    /// Requests the definition of the symbol at a position.
    pub fn definition(&mut self, position: TextDocumentPositionParams) -> Result<i64> {
        self.require_state("textDocument/definition", ClientState::Normal)?;
        Ok(self.send_request("textDocument/definition", Some(to_params(&position))))
    }

    /// Requests the declaration of the symbol at a position.
    pub fn declaration(&mut self, position: TextDocumentPositionParams) -> Result<i64> {
        self.require_state("textDocument/declaration", ClientState::Normal)?;
        Ok(self.send_request("textDocument/declaration", Some(to_params(&position))))
    }

    /// Requests the type definition of the symbol at a position.
    pub fn type_definition(&mut self, position: TextDocumentPositionParams) -> Result<i64> {
        self.require_state("textDocument/typeDefinition", ClientState::Normal)?;
        Ok(self.send_request("textDocument/typeDefinition", Some(to_params(&position))))
    }

    /// Requests implementations of the symbol at a position.
    pub fn implementation(&mut self, position: TextDocumentPositionParams) -> Result<i64> {
        self.require_state("textDocument/implementation", ClientState::Normal)?;
        Ok(self.send_request("textDocument/implementation", Some(to_params(&position))))
    }

    /// Requests all references to the symbol at a position.
    pub fn references(
        &mut self,
        position: TextDocumentPositionParams,
        include_declaration: bool,
    ) -> Result<i64> {
        self.require_state("textDocument/references", ClientState::Normal)?;
        let params = ReferenceParams {
            text_document_position: position,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };
        Ok(self.send_request("textDocument/references", Some(to_params(&params))))
    }

    /// Requests the symbol outline of a document.
    pub fn document_symbol(&mut self, text_document: TextDocumentIdentifier) -> Result<i64> {
        self.require_state("textDocument/documentSymbol", ClientState::Normal)?;
        let params = DocumentSymbolParams {
            text_document,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        Ok(self.send_request("textDocument/documentSymbol", Some(to_params(&params))))
    }

    /// Prepares a call hierarchy at a position.
    pub fn prepare_call_hierarchy(
        &mut self,
        position: TextDocumentPositionParams,
    ) -> Result<i64> {
        self.require_state("textDocument/prepareCallHierarchy", ClientState::Normal)?;
        Ok(self.send_request("textDocument/prepareCallHierarchy", Some(to_params(&position))))
    }

    /// Requests folding ranges for a document.
    pub fn folding_range(&mut self, text_document: TextDocumentIdentifier) -> Result<i64> {
        self.require_state("textDocument/foldingRange", ClientState::Normal)?;
        let params = FoldingRangeParams {
            text_document,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        Ok(self.send_request("textDocument/foldingRange", Some(to_params(&params))))
    }

    /// Requests inlay hints for a range of a document.
    pub fn inlay_hint(
        &mut self,
        text_document: TextDocumentIdentifier,
        range: Range,
    ) -> Result<i64> {
        self.require_state("textDocument/inlayHint", ClientState::Normal)?;
        let params = InlayHintParams {
            text_document,
            range,
            work_done_progress_params: Default::default(),
        };
        Ok(self.send_request("textDocument/inlayHint", Some(to_params(&params))))
    }

    /// Requests whole-document formatting edits.
    pub fn formatting(
        &mut self,
        text_document: TextDocumentIdentifier,
        options: FormattingOptions,
    ) -> Result<i64> {
        self.require_state("textDocument/formatting", ClientState::Normal)?;
        let params = DocumentFormattingParams {
            text_document,
            options,
            work_done_progress_params: Default::default(),
        };
        Ok(self.send_request("textDocument/formatting", Some(to_params(&params))))
    }

    /// Requests formatting edits for a range.
    pub fn range_formatting(
        &mut self,
        text_document: TextDocumentIdentifier,
        range: Range,
        options: FormattingOptions,
    ) -> Result<i64> {
        self.require_state("textDocument/rangeFormatting", ClientState::Normal)?;
        let params = DocumentRangeFormattingParams {
            text_document,
            range,
            options,
            work_done_progress_params: Default::default(),
        };
        Ok(self.send_request("textDocument/rangeFormatting", Some(to_params(&params))))
    }

    /// Requests a workspace-wide rename of the symbol at a position.
    pub fn rename(
        &mut self,
        position: TextDocumentPositionParams,
        new_name: String,
    ) -> Result<i64> {
        self.require_state("textDocument/rename", ClientState::Normal)?;
        let params = RenameParams {
            text_document_position: position,
            new_name,
            work_done_progress_params: Default::default(),
        };
        Ok(self.send_request("textDocument/rename", Some(to_params(&params))))
    }

    /// Announces an imminent save and asks for pre-save edits; answered by
    /// [`Event::WillSaveWaitUntilEdits`].
    pub fn will_save_wait_until(
        &mut self,
        text_document: TextDocumentIdentifier,
        reason: TextDocumentSaveReason,
    ) -> Result<i64> {
        self.require_state("textDocument/willSaveWaitUntil", ClientState::Normal)?;
        let params = WillSaveTextDocumentParams {
            text_document,
            reason,
        };
        Ok(self.send_request("textDocument/willSaveWaitUntil", Some(to_params(&params))))
    }

    /// Searches workspace symbols matching a query.
    pub fn workspace_symbol(&mut self, query: impl Into<String>) -> Result<i64> {
        self.require_state("workspace/symbol", ClientState::Normal)?;
        let params = WorkspaceSymbolParams {
            query: query.into(),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        Ok(self.send_request("workspace/symbol", Some(to_params(&params))))
    }

    // ─── internals ──────────────────────────────────────────────────────

    fn require_state(&self, method: &'static str, expected: ClientState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                method,
                state: self.state,
            })
        }
    }

    fn send_request(&mut self, method: &str, params: Option<Value>) -> i64 {
        let id = self.id_counter;
        self.id_counter += 1;
        self.send_buf
            .extend_from_slice(&transport::encode_request(id, method, params.clone()));
        self.pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                params,
            },
        );
        id
    }

    fn send_notification(&mut self, method: &str, params: Option<Value>) {
        self.send_buf
            .extend_from_slice(&transport::encode_notification(method, params));
    }

    fn reply_handle<T>(&self, id: RequestId) -> ReplyHandle<T> {
        ReplyHandle::new(id, self.session)
    }

    /// Decodes a response according to the method that originated it.
    fn handle_response(&mut self, response: JsonRpcResponse) -> Result<Option<Event>> {
        let id = match &response.id {
            RequestId::Number(n) => *n,
            RequestId::String(_) => {
                log::warn!("dropping response with string id {}", response.id);
                return Ok(None);
            }
        };
        let Some(request) = self.pending.remove(&id) else {
            log::warn!("dropping response for unknown request id {}", id);
            return Ok(None);
        };

        if let Some(error) = response.error {
            return Ok(Some(Event::ResponseError {
                id,
                code: error.code,
                message: error.message,
                data: error.data,
            }));
        }

        let event = match request.method.as_str() {
            "initialize" => {
                if self.state != ClientState::WaitingForInitialized {
                    return Err(ProtocolError::UnexpectedLifecycleResponse {
                        method: "initialize",
                        state: self.state,
                    }
                    .into());
                }
                let result: InitializeResult =
                    decode("initialize", response.result.unwrap_or(Value::Null))?;
                // gopls rejects null params here; send an explicit empty object.
                self.send_notification("initialized", Some(json!({})));
                self.state = ClientState::Normal;
                Event::Initialized(result)
            }
            "shutdown" => {
                if self.state != ClientState::WaitingForShutdown {
                    return Err(ProtocolError::UnexpectedLifecycleResponse {
                        method: "shutdown",
                        state: self.state,
                    }
                    .into());
                }
                self.state = ClientState::Shutdown;
                Event::Shutdown
            }
            "textDocument/completion" => {
                // Servers return either a CompletionList or a bare item array.
                let list = decode_result::<CompletionResponse>(
                    "textDocument/completion",
                    response.result,
                )?
                .map(|completion| match completion {
                    CompletionResponse::Array(items) => CompletionList {
                        is_incomplete: false,
                        items,
                    },
                    CompletionResponse::List(list) => list,
                });
                Event::Completion { id, list }
            }
            "textDocument/hover" => {
                match decode_result::<Hover>("textDocument/hover", response.result)? {
                    Some(hover) => Event::Hover {
                        id,
                        contents: hover.contents,
                        range: hover.range,
                    },
                    None => Event::Hover {
                        id,
                        contents: HoverContents::Array(Vec::new()),
                        range: None,
                    },
                }
            }
            "textDocument/signatureHelp" => {
                match decode_result::<SignatureHelp>(
                    "textDocument/signatureHelp",
                    response.result,
                )? {
                    Some(help) => Event::SignatureHelp {
                        id,
                        signatures: help.signatures,
                        active_signature: help.active_signature,
                        active_parameter: help.active_parameter,
                    },
                    None => Event::SignatureHelp {
                        id,
                        signatures: Vec::new(),
                        active_signature: None,
                        active_parameter: None,
                    },
                }
            }
            "textDocument/definition" => Event::Definition {
                id,
                result: decode_result("textDocument/definition", response.result)?,
            },
            "textDocument/declaration" => Event::Declaration {
                id,
                result: decode_result("textDocument/declaration", response.result)?,
            },
            "textDocument/typeDefinition" => Event::TypeDefinition {
                id,
                result: decode_result("textDocument/typeDefinition", response.result)?,
            },
            "textDocument/implementation" => Event::Implementation {
                id,
                result: decode_result("textDocument/implementation", response.result)?,
            },
            "textDocument/references" => Event::References {
                id,
                result: decode_result("textDocument/references", response.result)?,
            },
            "textDocument/documentSymbol" => Event::DocumentSymbols {
                id,
                result: decode_result("textDocument/documentSymbol", response.result)?,
            },
            "textDocument/foldingRange" => Event::FoldingRanges {
                id,
                result: decode_result("textDocument/foldingRange", response.result)?,
            },
            "textDocument/inlayHint" => Event::InlayHints {
                id,
                result: decode_result("textDocument/inlayHint", response.result)?,
            },
            "textDocument/prepareCallHierarchy" => Event::CallHierarchyItems {
                id,
                result: decode_result("textDocument/prepareCallHierarchy", response.result)?,
            },
            "textDocument/formatting" | "textDocument/rangeFormatting" => {
                Event::DocumentFormatting {
                    id,
                    result: decode_result(&request.method, response.result)?,
                }
            }
            "textDocument/rename" => Event::WorkspaceEdit {
                id,
                edit: decode_result("textDocument/rename", response.result)?,
            },
            "textDocument/willSaveWaitUntil" => Event::WillSaveWaitUntilEdits {
                id,
                edits: decode_result("textDocument/willSaveWaitUntil", response.result)?
                    .unwrap_or_default(),
            },
            "workspace/symbol" => Event::WorkspaceSymbols {
                id,
                result: decode_result("workspace/symbol", response.result)?,
            },
            other => {
                log::debug!("no decoder for {} response", other);
                Event::Unhandled(JsonRpcMessage::Response(JsonRpcResponse {
                    id: response.id,
                    result: response.result,
                    error: None,
                }))
            }
        };
        Ok(Some(event))
    }

    /// Decodes a server-originated request into an event carrying a reply
    /// handle. Unknown methods are answered with method-not-found (unless
    /// the caller opted out) and surfaced as [`Event::Unhandled`].
    fn handle_request(&mut self, request: JsonRpcRequest) -> Result<Event> {
        let JsonRpcRequest { id, method, params } = request;
        Ok(match method.as_str() {
            "window/showMessageRequest" => {
                let params: ShowMessageRequestParams = decode(
                    "window/showMessageRequest",
                    params.unwrap_or(Value::Null),
                )?;
                Event::ShowMessageRequest {
                    typ: params.typ,
                    message: params.message,
                    actions: params.actions,
                    reply: self.reply_handle(id),
                }
            }
            "window/workDoneProgress/create" => {
                let params: WorkDoneProgressCreateParams = decode(
                    "window/workDoneProgress/create",
                    params.unwrap_or(Value::Null),
                )?;
                self.progress_tokens.insert(token_key(&params.token));
                Event::WorkDoneProgressCreate {
                    token: params.token,
                    reply: self.reply_handle(id),
                }
            }
            "workspace/workspaceFolders" => Event::WorkspaceFolders {
                reply: self.reply_handle(id),
            },
            "workspace/configuration" => {
                let params: ConfigurationParams =
                    decode("workspace/configuration", params.unwrap_or(Value::Null))?;
                Event::ConfigurationRequest {
                    items: params.items,
                    reply: self.reply_handle(id),
                }
            }
            "client/registerCapability" => {
                let params: RegistrationParams =
                    decode("client/registerCapability", params.unwrap_or(Value::Null))?;
                Event::RegisterCapabilityRequest {
                    registrations: params.registrations,
                    reply: self.reply_handle(id),
                }
            }
            other => {
                log::debug!("unhandled server request: {}", other);
                if self.reply_unknown {
                    let error = ResponseError {
                        code: -32601,
                        message: format!("method not found: {}", other),
                        data: None,
                    };
                    self.send_buf
                        .extend_from_slice(&transport::encode_response(&id, None, Some(&error)));
                }
                Event::Unhandled(JsonRpcMessage::Request(JsonRpcRequest {
                    id,
                    method,
                    params,
                }))
            }
        })
    }

    fn handle_notification(&mut self, notification: JsonRpcNotification) -> Result<Event> {
        let JsonRpcNotification { method, params } = notification;
        Ok(match method.as_str() {
            "window/showMessage" => {
                let params: ShowMessageParams =
                    decode("window/showMessage", params.unwrap_or(Value::Null))?;
                Event::ShowMessage(params)
            }
            "window/logMessage" => {
                let params: LogMessageParams =
                    decode("window/logMessage", params.unwrap_or(Value::Null))?;
                Event::LogMessage(params)
            }
            "textDocument/publishDiagnostics" => {
                let params: PublishDiagnosticsParams = decode(
                    "textDocument/publishDiagnostics",
                    params.unwrap_or(Value::Null),
                )?;
                Event::PublishDiagnostics(params)
            }
            "$/progress" => {
                let progress: ProgressParams =
                    decode("$/progress", params.clone().unwrap_or(Value::Null))?;
                if self.progress_tokens.contains(&token_key(&progress.token)) {
                    let token = progress.token;
                    match progress.value {
                        ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(begin)) => {
                            Event::WorkDoneProgressBegin {
                                token,
                                progress: begin,
                            }
                        }
                        ProgressParamsValue::WorkDone(WorkDoneProgress::Report(report)) => {
                            Event::WorkDoneProgressReport {
                                token,
                                progress: report,
                            }
                        }
                        ProgressParamsValue::WorkDone(WorkDoneProgress::End(end)) => {
                            self.progress_tokens.remove(&token_key(&token));
                            Event::WorkDoneProgressEnd {
                                token,
                                progress: end,
                            }
                        }
                    }
                } else {
                    log::debug!("progress for unregistered token {:?}", progress.token);
                    Event::Unhandled(JsonRpcMessage::Notification(JsonRpcNotification {
                        method,
                        params,
                    }))
                }
            }
            other => {
                log::debug!("unhandled server notification: {}", other);
                Event::Unhandled(JsonRpcMessage::Notification(JsonRpcNotification {
                    method,
                    params,
                }))
            }
        })
    }
}

fn to_params<T: Serialize>(params: &T) -> Value {
    serde_json::to_value(params).expect("LSP parameter types serialize to JSON")
}

fn decode<T: serde::de::DeserializeOwned>(
    method: &str,
    value: Value,
) -> std::result::Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload {
        method: method.to_string(),
        source,
    })
}

/// Decodes an optional result; an absent or null result stays `None`.
fn decode_result<T: serde::de::DeserializeOwned>(
    method: &str,
    result: Option<Value>,
) -> std::result::Result<Option<T>, ProtocolError> {
    result.map(|value| decode(method, value)).transpose()
}

/// Progress tokens are numbers or strings on the wire; normalize for use as
/// a registry key.
fn token_key(token: &ProgressToken) -> String {
    match token {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s.clone(),
    }
}

/// The capabilities advertised in `initialize`.
///
/// This is a fixed statement of what this library can route, not a feature
/// switchboard; servers use it to decide which requests and notifications
/// they may send us.
fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(true),
                did_save: Some(true),
                ..Default::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..Default::default()
            }),
            completion: Some(CompletionClientCapabilities {
                dynamic_registration: Some(true),
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(false),
                    ..Default::default()
                }),
                completion_item_kind: Some(CompletionItemKindCapability {
                    value_set: Some(completion_item_kinds()),
                }),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(true),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            signature_help: Some(SignatureHelpClientCapabilities {
                dynamic_registration: Some(true),
                signature_information: Some(SignatureInformationSettings {
                    documentation_format: Some(vec![
                        MarkupKind::Markdown,
                        MarkupKind::PlainText,
                    ]),
                    parameter_information: Some(ParameterInformationSettings {
                        // Parameter labels are substrings of the signature label.
                        label_offset_support: Some(false),
                    }),
                    active_parameter_support: None,
                }),
                context_support: None,
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(true),
                link_support: Some(true),
            }),
            declaration: Some(GotoCapability {
                dynamic_registration: Some(true),
                link_support: Some(true),
            }),
            type_definition: Some(GotoCapability {
                dynamic_registration: Some(true),
                link_support: Some(true),
            }),
            implementation: Some(GotoCapability {
                dynamic_registration: Some(true),
                link_support: Some(true),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            call_hierarchy: Some(CallHierarchyClientCapabilities {
                dynamic_registration: Some(true),
            }),
            folding_range: Some(FoldingRangeClientCapabilities {
                dynamic_registration: Some(true),
                ..Default::default()
            }),
            inlay_hint: Some(InlayHintClientCapabilities {
                dynamic_registration: Some(true),
                ..Default::default()
            }),
            formatting: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            range_formatting: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(true),
                prepare_support: Some(true),
                ..Default::default()
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(true),
                hierarchical_document_symbol_support: Some(true),
                symbol_kind: Some(SymbolKindCapability {
                    value_set: Some(symbol_kinds()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        window: Some(WindowClientCapabilities {
            show_message: Some(ShowMessageRequestClientCapabilities {
                ..Default::default()
            }),
            work_done_progress: Some(true),
            ..Default::default()
        }),
        workspace: Some(WorkspaceClientCapabilities {
            symbol: Some(WorkspaceSymbolClientCapabilities {
                dynamic_registration: Some(true),
                symbol_kind: Some(SymbolKindCapability {
                    value_set: Some(symbol_kinds()),
                }),
                ..Default::default()
            }),
            workspace_folders: Some(true),
            configuration: Some(true),
            did_change_configuration: Some(DidChangeConfigurationClientCapabilities {
                dynamic_registration: Some(true),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn completion_item_kinds() -> Vec<CompletionItemKind> {
    vec![
        CompletionItemKind::TEXT,
        CompletionItemKind::METHOD,
        CompletionItemKind::FUNCTION,
        CompletionItemKind::CONSTRUCTOR,
        CompletionItemKind::FIELD,
        CompletionItemKind::VARIABLE,
        CompletionItemKind::CLASS,
        CompletionItemKind::INTERFACE,
        CompletionItemKind::MODULE,
        CompletionItemKind::PROPERTY,
        CompletionItemKind::UNIT,
        CompletionItemKind::VALUE,
        CompletionItemKind::ENUM,
        CompletionItemKind::KEYWORD,
        CompletionItemKind::SNIPPET,
        CompletionItemKind::COLOR,
        CompletionItemKind::FILE,
        CompletionItemKind::REFERENCE,
        CompletionItemKind::FOLDER,
        CompletionItemKind::ENUM_MEMBER,
        CompletionItemKind::CONSTANT,
        CompletionItemKind::STRUCT,
        CompletionItemKind::EVENT,
        CompletionItemKind::OPERATOR,
        CompletionItemKind::TYPE_PARAMETER,
    ]
}

fn symbol_kinds() -> Vec<SymbolKind> {
    vec![
        SymbolKind::FILE,
        SymbolKind::MODULE,
        SymbolKind::NAMESPACE,
        SymbolKind::PACKAGE,
        SymbolKind::CLASS,
        SymbolKind::METHOD,
        SymbolKind::PROPERTY,
        SymbolKind::FIELD,
        SymbolKind::CONSTRUCTOR,
        SymbolKind::ENUM,
        SymbolKind::INTERFACE,
        SymbolKind::FUNCTION,
        SymbolKind::VARIABLE,
        SymbolKind::CONSTANT,
        SymbolKind::STRING,
        SymbolKind::NUMBER,
        SymbolKind::BOOLEAN,
        SymbolKind::ARRAY,
        SymbolKind::OBJECT,
        SymbolKind::KEY,
        SymbolKind::NULL,
        SymbolKind::ENUM_MEMBER,
        SymbolKind::STRUCT,
        SymbolKind::EVENT,
        SymbolKind::OPERATOR,
        SymbolKind::TYPE_PARAMETER,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    // The public surface issues each lifecycle request exactly once and
    // pairs its response with the one state that expects it, so the
    // out-of-phase checks in `handle_response` cannot be reached through
    // `feed`. Force a mismatched state directly to pin their behavior.

    fn success_response(id: i64) -> JsonRpcResponse {
        JsonRpcResponse {
            id: RequestId::Number(id),
            result: None,
            error: None,
        }
    }

    #[test]
    fn initialize_response_outside_the_handshake_is_a_protocol_error() {
        let mut client = Client::new(ClientOptions::default());
        client.state = ClientState::Normal;

        // Id 0 is the constructor's `initialize` request, still pending.
        match client.handle_response(success_response(0)) {
            Err(Error::Protocol(ProtocolError::UnexpectedLifecycleResponse {
                method: "initialize",
                state: ClientState::Normal,
            })) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn shutdown_response_in_the_wrong_state_is_a_protocol_error() {
        let mut client = Client::new(ClientOptions::default());
        client.state = ClientState::Normal;
        client.pending.insert(
            5,
            PendingRequest {
                method: "shutdown".to_string(),
                params: None,
            },
        );

        match client.handle_response(success_response(5)) {
            Err(Error::Protocol(ProtocolError::UnexpectedLifecycleResponse {
                method: "shutdown",
                state: ClientState::Normal,
            })) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
