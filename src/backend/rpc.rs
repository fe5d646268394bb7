//! Cross-boundary binding over line-delimited JSON-RPC 2.0
//!
//! Each request and response is one JSON document per line. Methods:
//!
//! | method | params | result |
//! |---|---|---|
//! | `exec` | `{command, context}` | result envelope |
//! | `push_stream` | `{base64}` | `null` |
//! | `push_suggestions_stream` | `{base64}` | `null` |
//! | `clear_suggestions_stream` | none | `null` |
//! | `random_suggestions` | `{amount}` | `[string]` |
//! | `suggestions` | `{command, amount}` | `[string]` |
//!
//! [`RpcBackend`] is the client side: it either spawns the engine program
//! and talks over its stdio, or uses streams supplied by the caller.
//! [`serve`] is the engine side, exposing an [`EngineSession`].
//!
//! # Lost connections
//!
//! A call that times out, fails on the transport, or reads a reply that
//! does not match its request closes the channel and kills a spawned
//! engine, since a late reply would otherwise be read by the next call.
//! Later calls fail with [`BackendError::ConnectionLost`] until
//! `lazy_init` runs again. A spawned engine is restarted by that call;
//! caller-supplied streams cannot be reopened, so that binding stays lost.

use super::session::EngineSession;
use super::traits::{Backend, BackendError};
use crate::context::{Context, ContextProvider, SystemContext};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const METHOD_EXEC: &str = "exec";
pub const METHOD_PUSH_STREAM: &str = "push_stream";
pub const METHOD_PUSH_SUGGESTIONS_STREAM: &str = "push_suggestions_stream";
pub const METHOD_CLEAR_SUGGESTIONS_STREAM: &str = "clear_suggestions_stream";
pub const METHOD_RANDOM_SUGGESTIONS: &str = "random_suggestions";
pub const METHOD_SUGGESTIONS: &str = "suggestions";

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const PARSE_ERROR: i64 = -32700;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StreamParams {
    base64: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExecParams {
    command: String,
    context: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct AmountParams {
    amount: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SuggestionsParams {
    command: String,
    amount: usize,
}

fn to_params<T: Serialize>(params: T) -> Result<Value, BackendError> {
    serde_json::to_value(params)
        .map_err(|e| BackendError::InvalidRequest(format!("failed to encode params: {}", e)))
}

/// How to launch an engine program.
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl SubprocessConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One open request/response channel.
struct RpcChannel {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
    request_id: u64,
    child: Option<Child>,
}

impl RpcChannel {
    fn new(reader: BoxedReader, writer: BoxedWriter, child: Option<Child>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            request_id: 0,
            child,
        }
    }

    async fn call(
        &mut self,
        method: &str,
        params: Value,
        timeout_duration: Duration,
    ) -> Result<Value, BackendError> {
        self.request_id += 1;
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: self.request_id,
            method: method.to_string(),
            params,
        };

        let mut line = serde_json::to_string(&request).map_err(|e| {
            BackendError::InvalidRequest(format!("failed to serialize request: {}", e))
        })?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BackendError::Transport(format!("failed to write request: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| BackendError::Transport(format!("failed to flush request: {}", e)))?;

        let mut response = String::new();
        let read = timeout(timeout_duration, self.reader.read_line(&mut response))
            .await
            .map_err(|_| BackendError::Timeout(timeout_duration))?
            .map_err(|e| BackendError::Transport(format!("failed to read response: {}", e)))?;
        if read == 0 {
            return Err(BackendError::Transport("engine closed the connection".to_string()));
        }

        let response: RpcResponse = serde_json::from_str(&response)
            .map_err(|e| BackendError::Protocol(format!("failed to parse response: {}", e)))?;
        if response.id != Some(self.request_id) {
            return Err(BackendError::Protocol(format!(
                "response id {:?} does not match request id {}",
                response.id, self.request_id
            )));
        }
        if let Some(error) = response.error {
            return Err(BackendError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

enum Connector {
    Spawn(SubprocessConfig),
    Streams(std::sync::Mutex<Option<(BoxedReader, BoxedWriter)>>),
}

/// Backend that reaches the engine over JSON-RPC.
pub struct RpcBackend {
    id: String,
    connector: Connector,
    channel: Mutex<Option<RpcChannel>>,
    lost: AtomicBool,
    timeout: Duration,
    context: Arc<dyn ContextProvider>,
}

impl RpcBackend {
    /// Spawn `config.program` on `lazy_init` and talk over its stdio.
    pub fn spawn(config: SubprocessConfig) -> Self {
        Self {
            id: format!("rpc:{}", config.program),
            timeout: config.timeout,
            connector: Connector::Spawn(config),
            channel: Mutex::new(None),
            lost: AtomicBool::new(false),
            context: Arc::new(SystemContext::new()),
        }
    }

    /// Talk over caller-supplied streams, e.g. a socket or an in-memory pipe.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            id: "rpc:streams".to_string(),
            connector: Connector::Streams(std::sync::Mutex::new(Some((reader, writer)))),
            channel: Mutex::new(None),
            lost: AtomicBool::new(false),
            timeout: Duration::from_secs(30),
            context: Arc::new(SystemContext::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = provider;
        self
    }

    fn connect(&self) -> Result<RpcChannel, BackendError> {
        match &self.connector {
            Connector::Spawn(config) => {
                let mut cmd = Command::new(&config.program);
                cmd.args(&config.args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit());
                if let Some(dir) = &config.working_dir {
                    cmd.current_dir(dir);
                }

                let mut child = cmd
                    .spawn()
                    .map_err(|e| BackendError::Spawn(format!("{}: {}", config.program, e)))?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| BackendError::Spawn("no stdin available".to_string()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| BackendError::Spawn("no stdout available".to_string()))?;
                info!(program = %config.program, pid = ?child.id(), "engine process started");
                Ok(RpcChannel::new(Box::new(stdout), Box::new(stdin), Some(child)))
            }
            Connector::Streams(streams) => {
                let mut streams = streams
                    .lock()
                    .map_err(|_| BackendError::Init("stream slot poisoned".to_string()))?;
                let (reader, writer) = streams.take().ok_or_else(|| {
                    BackendError::Init("streams were already consumed".to_string())
                })?;
                Ok(RpcChannel::new(reader, writer, None))
            }
        }
    }

    /// Whether an earlier failure closed the channel.
    pub fn is_connection_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err(if self.is_connection_lost() {
                BackendError::ConnectionLost
            } else {
                BackendError::NotInitialized
            });
        };
        debug!(backend = %self.id, method, "rpc call");
        let result = channel.call(method, params, self.timeout).await;
        if let Err(e) = &result {
            if e.is_connection_loss() {
                warn!(backend = %self.id, method, error = %e, "closing engine connection");
                *guard = None;
                self.lost.store(true, Ordering::Release);
            }
        }
        result
    }

    async fn call_for_text(&self, method: &str, params: Value) -> Result<String, BackendError> {
        let result = self.call(method, params).await?;
        Ok(match result {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

#[async_trait]
impl Backend for RpcBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn lazy_init(&self) -> Result<(), BackendError> {
        let mut guard = self.channel.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect()?);
            if self.lost.swap(false, Ordering::AcqRel) {
                info!(backend = %self.id, "engine connection reopened");
            }
        }
        Ok(())
    }

    fn retriable_init(&self) -> bool {
        matches!(self.connector, Connector::Spawn(_))
    }

    async fn execute(&self, command: &str, context: &str) -> Result<String, BackendError> {
        let context: Value = serde_json::from_str(context)
            .map_err(|e| BackendError::InvalidRequest(format!("context is not JSON: {}", e)))?;
        let params = to_params(ExecParams {
            command: command.to_string(),
            context,
        })?;
        self.call_for_text(METHOD_EXEC, params).await
    }

    async fn push_stream(&self, stream: Vec<u8>) -> Result<(), BackendError> {
        let params = to_params(StreamParams {
            base64: BASE64.encode(stream),
        })?;
        self.call(METHOD_PUSH_STREAM, params).await.map(|_| ())
    }

    async fn push_suggestion_stream(&self, stream: Vec<u8>) -> Result<(), BackendError> {
        let params = to_params(StreamParams {
            base64: BASE64.encode(stream),
        })?;
        self.call(METHOD_PUSH_SUGGESTIONS_STREAM, params)
            .await
            .map(|_| ())
    }

    async fn clear_suggestion_stream(&self) -> Result<(), BackendError> {
        self.call(METHOD_CLEAR_SUGGESTIONS_STREAM, Value::Null)
            .await
            .map(|_| ())
    }

    async fn list_random_suggestions(&self, count: usize) -> Result<String, BackendError> {
        let params = to_params(AmountParams { amount: count })?;
        self.call_for_text(METHOD_RANDOM_SUGGESTIONS, params).await
    }

    async fn compute_suggestions(
        &self,
        command: &str,
        count: usize,
    ) -> Result<String, BackendError> {
        let params = to_params(SuggestionsParams {
            command: command.to_string(),
            amount: count,
        })?;
        self.call_for_text(METHOD_SUGGESTIONS, params).await
    }

    fn context_descriptor(&self) -> Context {
        self.context.context()
    }
}

/// Serve `session` over line-delimited JSON-RPC until `reader` reaches EOF.
pub async fn serve<R, W>(
    mut session: EngineSession,
    reader: R,
    mut writer: W,
) -> Result<(), BackendError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => handle(&mut session, request),
            Err(e) => {
                warn!(error = %e, "unparsable rpc request");
                RpcResponse::failure(None, PARSE_ERROR, e.to_string())
            }
        };

        let mut out = serde_json::to_string(&response)
            .map_err(|e| BackendError::Protocol(e.to_string()))?;
        out.push('\n');
        writer
            .write_all(out.as_bytes())
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
    }
    Ok(())
}

fn handle(session: &mut EngineSession, request: RpcRequest) -> RpcResponse {
    let id = request.id;
    debug!(id, method = %request.method, "rpc request");
    match dispatch(session, &request.method, request.params) {
        Ok(result) => RpcResponse::success(id, result),
        Err((code, message)) => RpcResponse::failure(Some(id), code, message),
    }
}

fn dispatch(
    session: &mut EngineSession,
    method: &str,
    params: Value,
) -> Result<Value, (i64, String)> {
    fn params_of<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, (i64, String)> {
        serde_json::from_value(params).map_err(|e| (INVALID_PARAMS, e.to_string()))
    }
    fn decode(stream: StreamParams) -> Result<Vec<u8>, (i64, String)> {
        BASE64
            .decode(stream.base64.as_bytes())
            .map_err(|e| (INVALID_PARAMS, e.to_string()))
    }
    fn parse_text(text: String) -> Result<Value, (i64, String)> {
        serde_json::from_str(&text).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }

    match method {
        METHOD_EXEC => {
            let p: ExecParams = params_of(params)?;
            let envelope = session
                .execute(&p.command, &p.context.to_string())
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
            parse_text(envelope)
        }
        METHOD_PUSH_STREAM => {
            session.push_stream(decode(params_of(params)?)?);
            Ok(Value::Null)
        }
        METHOD_PUSH_SUGGESTIONS_STREAM => {
            session.push_suggestion_stream(decode(params_of(params)?)?);
            Ok(Value::Null)
        }
        METHOD_CLEAR_SUGGESTIONS_STREAM => {
            session.clear_suggestion_stream();
            Ok(Value::Null)
        }
        METHOD_RANDOM_SUGGESTIONS => {
            let p: AmountParams = params_of(params)?;
            let list = session
                .random_suggestions(p.amount)
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
            parse_text(list)
        }
        METHOD_SUGGESTIONS => {
            let p: SuggestionsParams = params_of(params)?;
            let list = session
                .suggestions(&p.command, p.amount)
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
            parse_text(list)
        }
        other => Err((METHOD_NOT_FOUND, format!("unknown method '{}'", other))),
    }
}
