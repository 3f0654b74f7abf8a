use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::dates::Period;
use crate::error::{ClockodoError, ErrorKind};
use crate::tracker::{CreateRequest, StartRequest, Tracker};

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const RESOURCE_NOT_FOUND: i64 = -32002;

#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn to_json(&self) -> Value {
        let mut error = json!({"code": self.code, "message": self.message});
        if let Some(data) = &self.data {
            error["data"] = data.clone();
        }
        error
    }
}

impl From<ClockodoError> for RpcError {
    fn from(err: ClockodoError) -> Self {
        let code = match err.kind() {
            ErrorKind::NotFound => RESOURCE_NOT_FOUND,
            ErrorKind::ValidationError | ErrorKind::AmbiguousMatch => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(json!({"kind": err.kind()})),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartArgs {
    customer_name: String,
    project_name: Option<String>,
    service_name: Option<String>,
    description: Option<String>,
    billable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    customer_name: String,
    #[serde(alias = "date_str")]
    date: String,
    start_time: String,
    end_time: String,
    project_name: Option<String>,
    service_name: Option<String>,
    description: Option<String>,
    billable: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SummaryArgs {
    period: Option<String>,
}

/// Maps MCP methods onto the tracker. Transport-agnostic so it can be
/// driven directly in tests.
pub struct Dispatcher {
    tracker: Arc<Tracker>,
}

impl Dispatcher {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self { tracker }
    }

    pub async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_result(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tool_definitions()),
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "Missing tool name"))?;
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                self.call_tool(name, arguments).await
            }
            "resources/list" => Ok(resource_list()),
            "resources/templates/list" => Ok(resource_templates()),
            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "Missing resource uri"))?;
                let contents = self.read_resource(uri).await?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": pretty(&contents),
                    }]
                }))
            }
            _ => Err(RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))),
        }
    }

    /// Tool failures are reported in-band with `isError`, carrying the
    /// error kind so the agent can react to it.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, RpcError> {
        let outcome = match name {
            "start_time_tracking" => match parse_args::<StartArgs>(arguments) {
                Ok(args) => self
                    .tracker
                    .start_time_tracking(StartRequest {
                        customer_name: args.customer_name,
                        project_name: args.project_name,
                        service_name: args.service_name,
                        description: args.description,
                        billable: args.billable,
                    })
                    .await
                    .map(|started| json!(started)),
                Err(err) => Err(err),
            },
            "stop_time_tracking" => self.tracker.stop_time_tracking().await.map(|stopped| json!(stopped)),
            "get_running_entry" => self.tracker.get_running_entry().await.map(|running| {
                let message = match &running {
                    Some(_) => "Time tracking is running",
                    None => "No time tracking currently running",
                };
                json!({"running": running, "message": message})
            }),
            "create_time_entry" => match parse_args::<CreateArgs>(arguments) {
                Ok(args) => self
                    .tracker
                    .create_time_entry(CreateRequest {
                        customer_name: args.customer_name,
                        date: args.date,
                        start_time: args.start_time,
                        end_time: args.end_time,
                        project_name: args.project_name,
                        service_name: args.service_name,
                        description: args.description,
                        billable: args.billable,
                    })
                    .await
                    .map(|created| json!(created)),
                Err(err) => Err(err),
            },
            "get_work_summary" => match parse_args::<SummaryArgs>(arguments) {
                Ok(args) => self
                    .tracker
                    .get_work_summary(args.period.as_deref())
                    .await
                    .map(|summary| json!(summary)),
                Err(err) => Err(err),
            },
            _ => return Err(RpcError::new(INVALID_PARAMS, format!("Unknown tool: {name}"))),
        };

        Ok(match outcome {
            Ok(payload) => json!({
                "content": [{"type": "text", "text": pretty(&payload)}],
                "isError": false,
            }),
            Err(err) => {
                warn!(tool = name, kind = err.kind().as_str(), error = %err, "Tool call failed");
                let payload = json!({"kind": err.kind(), "message": err.to_string()});
                json!({
                    "content": [{"type": "text", "text": pretty(&payload)}],
                    "isError": true,
                })
            }
        })
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, RpcError> {
        let not_found = || RpcError::new(RESOURCE_NOT_FOUND, format!("Unknown resource: {uri}"));
        let (scheme, rest) = uri.split_once("://").ok_or_else(not_found)?;
        let rest = urlencoding::decode(rest)
            .map_err(|_| RpcError::new(INVALID_PARAMS, format!("Malformed resource uri: {uri}")))?;

        let value = match (scheme, &*rest) {
            ("entries", period) => json!(self.tracker.entries(period).await?),
            ("customers", "all") => json!(self.tracker.customers().await?),
            ("projects", customer) if !customer.trim().is_empty() => {
                json!(self.tracker.projects(customer).await?)
            }
            ("services", "all") => json!(self.tracker.services().await?),
            ("users", "all") => json!(self.tracker.users().await?),
            _ => return Err(not_found()),
        };
        Ok(value)
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ClockodoError> {
    serde_json::from_value(arguments)
        .map_err(|err| ClockodoError::validation(format!("Invalid arguments: {err}")))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn initialize_result(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": {"tools": {}, "resources": {}},
        "serverInfo": {
            "name": "Clockodo Time Tracker",
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

fn tool_definitions() -> Value {
    json!({
        "tools": [
            {
                "name": "start_time_tracking",
                "description": "Start time tracking for a customer, optionally with project, service and description",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "customer_name": {"type": "string", "description": "Name of the customer"},
                        "project_name": {"type": "string", "description": "Optional project name"},
                        "service_name": {"type": "string", "description": "Optional service name"},
                        "description": {"type": "string", "description": "Optional description text"},
                        "billable": {"type": "boolean", "description": "Whether the time is billable (default true)"}
                    },
                    "required": ["customer_name"]
                }
            },
            {
                "name": "stop_time_tracking",
                "description": "Stop the currently running time tracking",
                "inputSchema": {"type": "object", "properties": {}}
            },
            {
                "name": "get_running_entry",
                "description": "Get the currently running time entry, if any",
                "inputSchema": {"type": "object", "properties": {}}
            },
            {
                "name": "create_time_entry",
                "description": "Create a completed time entry for a given day",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "customer_name": {"type": "string", "description": "Name of the customer"},
                        "date": {"type": "string", "description": "Date in YYYY-MM-DD format"},
                        "start_time": {"type": "string", "description": "Start time in HH:MM format"},
                        "end_time": {"type": "string", "description": "End time in HH:MM format"},
                        "project_name": {"type": "string", "description": "Optional project name"},
                        "service_name": {"type": "string", "description": "Optional service name"},
                        "description": {"type": "string", "description": "Optional description"},
                        "billable": {"type": "boolean", "description": "Whether the time is billable (default true)"}
                    },
                    "required": ["customer_name", "date", "start_time", "end_time"]
                }
            },
            {
                "name": "get_work_summary",
                "description": "Total hours with a breakdown by customer and project",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "period": {
                            "type": "string",
                            "enum": ["today", "yesterday", "week", "month"],
                            "description": "Period to summarize (default today)"
                        }
                    }
                }
            }
        ]
    })
}

fn resource_list() -> Value {
    let mut resources: Vec<Value> = Period::ALL
        .iter()
        .map(|period| {
            json!({
                "uri": format!("entries://{period}"),
                "name": format!("Time entries ({period})"),
                "mimeType": "application/json",
            })
        })
        .collect();
    for (uri, name) in [
        ("customers://all", "Customers"),
        ("services://all", "Services"),
        ("users://all", "Users"),
    ] {
        resources.push(json!({"uri": uri, "name": name, "mimeType": "application/json"}));
    }
    json!({"resources": resources})
}

fn resource_templates() -> Value {
    json!({
        "resourceTemplates": [
            {
                "uriTemplate": "entries://{period}",
                "name": "Time entries for today, yesterday, week or month",
                "mimeType": "application/json"
            },
            {
                "uriTemplate": "projects://{customer_name}",
                "name": "Projects of a customer",
                "mimeType": "application/json"
            }
        ]
    })
}

/// Serves JSON-RPC over stdin/stdout until stdin closes.
pub async fn run_stdio(dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    serve(dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serves newline-delimited JSON-RPC from `input` to `output` until the
/// input ends. Every request runs in its own task so slow calls do not
/// hold up others, and `notifications/cancelled` aborts the matching task.
pub async fn serve<R, W>(dispatcher: Arc<Dispatcher>, input: R, mut output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            if output.write_all(line.as_bytes()).await.is_err() || output.flush().await.is_err() {
                break;
            }
        }
    });

    let in_flight: Arc<Mutex<HashMap<String, AbortHandle>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Unparseable JSON-RPC message");
                let error = RpcError::new(PARSE_ERROR, format!("Parse error: {err}"));
                let _ = tx.send(json!({"jsonrpc": "2.0", "id": null, "error": error.to_json()}));
                continue;
            }
        };

        let Some(method) = request.get("method").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        let Some(id) = request.get("id").cloned() else {
            if method == "notifications/cancelled" {
                if let Some(request_id) = params.get("requestId") {
                    let removed = lock(&in_flight).remove(&request_id.to_string());
                    if let Some(handle) = removed {
                        handle.abort();
                        info!(request_id = %request_id, "Cancelled in-flight request");
                    }
                }
            } else {
                debug!(method = %method, "Ignoring notification");
            }
            continue;
        };

        let key = id.to_string();
        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();
        let registry = Arc::clone(&in_flight);
        let task_key = key.clone();

        // Registered under the lock so a fast task cannot finish before its entry exists.
        {
            let mut registered = lock(&in_flight);
            let handle = tokio::spawn(async move {
                debug!(method = %method, id = %id, "Handling request");
                let response = match dispatcher.handle(&method, params).await {
                    Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error.to_json()}),
                };
                lock(&registry).remove(&task_key);
                let _ = tx.send(response);
            });
            registered.insert(key, handle.abort_handle());
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

fn lock(map: &Mutex<HashMap<String, AbortHandle>>) -> std::sync::MutexGuard<'_, HashMap<String, AbortHandle>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
