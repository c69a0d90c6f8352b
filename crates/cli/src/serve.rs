//! JSON-lines request loop
//!
//! Each input line is `{"tool": "<name>", "arguments": {...}}`; each output
//! line is `{"ok": true, "result": ...}` or `{"ok": false, "error": "..."}`.

use anyhow::{Context, Result};
use kbase_store::{ToolOutput, Tools};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Deserialize)]
struct Request {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize, PartialEq)]
struct Response {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn ok(result: Value) -> Self {
        Self { ok: true, result: Some(result), error: None }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { ok: false, result: None, error: Some(message.into()) }
    }
}

impl From<ToolOutput> for Response {
    fn from(output: ToolOutput) -> Self {
        match output {
            ToolOutput::Success(value) => Self::ok(value),
            ToolOutput::Message(text) => Self::ok(Value::String(text)),
            ToolOutput::CallerError(message) => Self::error(message),
        }
    }
}

/// Answer requests until the reader is exhausted
///
/// A fatal store error fails only the request that hit it; it is logged and
/// reported, and the loop keeps going.
pub async fn serve<R, W>(tools: &Tools, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = handle_line(tools, line).await;
        let mut encoded = serde_json::to_string(&response).context("Failed to encode response")?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await.context("Failed to write response")?;
        writer.flush().await.context("Failed to flush response")?;
        handled += 1;
    }

    tracing::info!(handled, "input closed, stopping");
    Ok(())
}

async fn handle_line(tools: &Tools, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Response::error(format!("Invalid request: {e}")),
    };

    tracing::debug!(tool = %request.tool, "request");
    match tools.dispatch(&request.tool, request.arguments).await {
        Ok(output) => output.into(),
        Err(e) => {
            tracing::error!(tool = %request.tool, error = %e, "request failed");
            Response::error(format!("Internal error: {e}"))
        }
    }
}
