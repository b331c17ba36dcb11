//! Line-delimited JSON transport.
//!
//! Each input line is one request:
//!
//! ```text
//! {"id": 1, "op": "execute", "params": {"name": "echo", "args": "hi"}}
//! ```
//!
//! and produces exactly one output line:
//!
//! ```text
//! {"id": 1, "text": "hi\n", "requiresConfirmation": false}
//! ```
//!
//! Requests are handled concurrently, so responses may come back out of
//! order; callers match them by `id`. A single writer task owns the output.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::gateway::{
    ExecuteRequest, Gateway, GatewayResponse, ManageCommandRequest, QueryCommandsRequest, QueryLogsRequest,
};

/// Text returned when a request handler panics.
pub const INTERNAL_ERROR: &str = "Internal error while handling request";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    op: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GetDefinitionRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Execute(ExecuteRequest),
    QueryCommands(QueryCommandsRequest),
    ManageCommand(ManageCommandRequest),
    QueryLogs(QueryLogsRequest),
    ListDefinitions,
    GetDefinition(GetDefinitionRequest),
}

impl Operation {
    /// Fill in the request id from the envelope when params carry none.
    fn with_request_id(mut self, id: Option<String>) -> Self {
        let slot = match &mut self {
            Operation::Execute(r) => &mut r.request_id,
            Operation::QueryCommands(r) => &mut r.request_id,
            Operation::ManageCommand(r) => &mut r.request_id,
            Operation::QueryLogs(r) => &mut r.request_id,
            Operation::ListDefinitions | Operation::GetDefinition(_) => return self,
        };
        if slot.is_none() {
            *slot = id;
        }
        self
    }

    fn request_id(&self) -> Option<&str> {
        match self {
            Operation::Execute(r) => r.request_id.as_deref(),
            Operation::QueryCommands(r) => r.request_id.as_deref(),
            Operation::ManageCommand(r) => r.request_id.as_deref(),
            Operation::QueryLogs(r) => r.request_id.as_deref(),
            Operation::ListDefinitions | Operation::GetDefinition(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Value,
    pub op: Operation,
}

#[derive(Debug, Serialize)]
struct Response<'a> {
    id: &'a Value,
    #[serde(flatten)]
    body: &'a GatewayResponse,
}

fn params<T: serde::de::DeserializeOwned>(params: Value) -> serde_json::Result<T> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params)
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse one input line. Errors are the text sent back to the caller.
pub fn parse_request(line: &str) -> std::result::Result<Request, String> {
    let envelope: Envelope = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let op = match envelope.op.as_str() {
        "execute" => params(envelope.params).map(Operation::Execute),
        "query_commands" => params(envelope.params).map(Operation::QueryCommands),
        "manage_command" => params(envelope.params).map(Operation::ManageCommand),
        "query_logs" => params(envelope.params).map(Operation::QueryLogs),
        "list_definitions" => Ok(Operation::ListDefinitions),
        "get_definition" => params(envelope.params).map(Operation::GetDefinition),
        other => return Err(format!("unknown op '{}'", other)),
    }
    .map_err(|e| format!("bad params for '{}': {}", envelope.op, e))?;

    Ok(Request {
        op: op.with_request_id(id_string(&envelope.id)),
        id: envelope.id,
    })
}

/// Route one operation to the gateway.
pub async fn dispatch(gateway: &Gateway, op: Operation) -> GatewayResponse {
    match op {
        Operation::Execute(req) => gateway.execute(&req).await,
        Operation::QueryCommands(req) => gateway.query_commands(&req),
        Operation::ManageCommand(req) => gateway.manage_command(&req),
        Operation::QueryLogs(req) => gateway.query_logs(&req),
        Operation::ListDefinitions => gateway.list_definitions(),
        Operation::GetDefinition(req) => gateway.get_definition(&req.name),
    }
}

fn encode(id: &Value, body: &GatewayResponse) -> String {
    serde_json::to_string(&Response { id, body }).unwrap_or_else(|e| {
        error!("Failed to encode response: {}", e);
        format!(r#"{{"id":null,"text":"{}","requiresConfirmation":false}}"#, INTERNAL_ERROR)
    })
}

/// Handle one request on its own task so a panic cannot take the loop down.
async fn handle(gateway: Arc<Gateway>, request: Request) -> String {
    let rid = request.op.request_id().map(str::to_string);
    let worker = Arc::clone(&gateway);
    let op = request.op;
    let body = match tokio::spawn(async move { dispatch(&worker, op).await }).await {
        Ok(body) => body,
        Err(e) => {
            error!("Request handler failed: {}", e);
            gateway.record_uncaught(&e.to_string(), rid.as_deref());
            GatewayResponse::text(INTERNAL_ERROR)
        }
    };
    encode(&request.id, &body)
}

/// Serve requests from `reader` until EOF, writing responses to `writer`.
///
/// Returns once every in-flight request has been answered.
pub async fn serve<R, W>(gateway: Arc<Gateway>, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_request(line) {
            Ok(request) => {
                debug!("Request {}: {:?}", request.id, request.op);
                let gateway = Arc::clone(&gateway);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let out = handle(gateway, request).await;
                    if tx.send(out).is_err() {
                        warn!("Response dropped: output closed");
                    }
                });
            }
            Err(reason) => {
                warn!("Invalid request: {}", reason);
                let body = GatewayResponse::text(format!("Invalid request: {}", reason));
                if tx.send(encode(&Value::Null, &body)).is_err() {
                    warn!("Response dropped: output closed");
                }
            }
        }
    }

    drop(tx);
    writer_task
        .await
        .context("response writer panicked")?
        .context("failed to write response")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::gateway::{CommandFilter, ManageAction};
    use crate::registry::{default_commands, RegistryStore};
    use crate::shell::ShellRunner;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_parse_operations() {
        let req = parse_request(r#"{"id":7,"op":"execute","params":{"name":"dir","args":"/tmp"}}"#).unwrap();
        assert_eq!(req.id, Value::from(7));
        match req.op {
            Operation::Execute(r) => {
                assert_eq!(r.name, "dir");
                assert_eq!(r.args.as_deref(), Some("/tmp"));
                assert_eq!(r.request_id.as_deref(), Some("7"));
            }
            other => panic!("Expected Execute, got {:?}", other),
        }

        let req = parse_request(r#"{"id":"a","op":"query_commands","params":{"filter":"dangerous"}}"#).unwrap();
        match req.op {
            Operation::QueryCommands(r) => assert_eq!(r.filter, CommandFilter::Dangerous),
            other => panic!("Expected QueryCommands, got {:?}", other),
        }

        let req = parse_request(
            r#"{"id":1,"op":"manage_command","params":{"action":"add","name":"date","dangerous":true,"requestId":"r-1"}}"#,
        )
        .unwrap();
        match req.op {
            Operation::ManageCommand(r) => {
                assert_eq!(r.action, ManageAction::Add);
                assert_eq!(r.patch.dangerous, Some(true));
                assert_eq!(r.request_id.as_deref(), Some("r-1"));
            }
            other => panic!("Expected ManageCommand, got {:?}", other),
        }

        assert_eq!(parse_request(r#"{"op":"list_definitions"}"#).unwrap().op, Operation::ListDefinitions);
        assert!(matches!(
            parse_request(r#"{"op":"query_logs"}"#).unwrap().op,
            Operation::QueryLogs(_)
        ));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let cases = [
            ("not json", ""),
            (r#"{"id":1}"#, "op"),
            (r#"{"op":"shutdown"}"#, "unknown op 'shutdown'"),
            (r#"{"op":"execute","params":{}}"#, "bad params for 'execute'"),
            (r#"{"op":"manage_command","params":{"action":"rename"}}"#, "bad params"),
        ];
        for (line, expected) in cases {
            let err = parse_request(line).unwrap_err();
            assert!(err.contains(expected), "line {} gave {}", line, err);
        }
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path().join("commands.json"));
        store.save(&default_commands()).unwrap();
        let audit = Arc::new(MemoryAuditLog::new());
        let gateway = Arc::new(Gateway::new(store, audit.clone(), ShellRunner::new()));

        let input = concat!(
            r#"{"id":1,"op":"get_definition","params":{"name":"format"}}"#,
            "\n\n",
            "garbage\n",
            r#"{"id":2,"op":"query_commands","params":{"filter":"disabled"}}"#,
            "\n",
        );
        let (client, server) = tokio::io::duplex(64 * 1024);
        serve(gateway, input.as_bytes(), server).await.unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();

        let responses: Vec<Value> = output.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(responses.len(), 3);

        let by_id = |id: Value| responses.iter().find(|r| r["id"] == id).unwrap();
        assert!(by_id(Value::from(1))["text"].as_str().unwrap().contains("\"dangerous\": true"));
        assert!(by_id(Value::from(2))["text"].as_str().unwrap().contains("- format"));
        let invalid = by_id(Value::Null);
        assert!(invalid["text"].as_str().unwrap().starts_with("Invalid request:"));
        assert_eq!(invalid["requiresConfirmation"], Value::Bool(false));

        assert_eq!(audit.actions(), vec!["commands_queried"]);
        let queried = &audit.events()[0];
        assert_eq!(queried.request_id.as_deref(), Some("2"));
    }
}
