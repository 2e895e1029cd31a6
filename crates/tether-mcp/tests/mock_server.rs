//! Mock MCP server for integration testing.
//!
//! Speaks newline-delimited JSON-RPC on stdio. Each request is handled on its
//! own thread, so a slow call does not hold up the ones behind it and
//! responses can arrive out of order.
//!
//! Usage:
//!   mock-mcp-server [--label NAME] [--delay-ms N] [--crash-on TOOL] [--silent]
//!                   [--no-resources]
//!
//! Options:
//!   --label NAME      Server name reported by initialize and by `search`
//!   --delay-ms N      Add N ms delay to all responses
//!   --crash-on TOOL   Exit with code 1 when TOOL is called
//!   --silent          Never answer anything
//!   --no-resources    Answer resources/list with method-not-found

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

/// Tools per `tools/list` page.
const PAGE_SIZE: usize = 3;

#[derive(Debug, Deserialize)]
struct Request {
    id: Value,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Default)]
struct Options {
    label: Option<String>,
    delay_ms: u64,
    crash_on: Option<String>,
    silent: bool,
    no_resources: bool,
}

impl Options {
    fn from_args() -> Self {
        let mut options = Self::default();
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--label" => options.label = args.next(),
                "--delay-ms" => {
                    options.delay_ms = args.next().and_then(|v| v.parse().ok()).unwrap_or(0)
                }
                "--crash-on" => options.crash_on = args.next(),
                "--silent" => options.silent = true,
                "--no-resources" => options.no_resources = true,
                _ => {}
            }
        }
        options
    }

    fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("mock-mcp-server")
    }
}

fn main() {
    let options = Arc::new(Options::from_args());
    eprintln!("{} starting", options.name());

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            return;
        };
        if line.trim().is_empty() {
            continue;
        }

        // Notifications and responses to our own requests have no `method` + `id`.
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(_) => continue,
        };
        if options.silent {
            continue;
        }

        let options = Arc::clone(&options);
        thread::spawn(move || {
            if options.delay_ms > 0 {
                thread::sleep(Duration::from_millis(options.delay_ms));
            }
            let initialize = request.method == "initialize";
            let response = handle_request(&request, &options);
            write_line(&response);
            if initialize {
                write_line(&json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {"level": "info", "logger": "mock", "data": "ready"}
                }));
            }
        });
    }
}

fn write_line(message: &Value) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", message);
    let _ = stdout.flush();
}

fn handle_request(request: &Request, options: &Options) -> Value {
    let params = request.params.clone().unwrap_or(json!({}));
    let outcome = match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {}
            },
            "serverInfo": {
                "name": options.name(),
                "version": "1.0.0"
            }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(list_tools(&params)),
        "resources/list" if options.no_resources => Err(method_not_found(&request.method)),
        "resources/list" => Ok(json!({
            "resources": [
                {
                    "uri": "mock://readme",
                    "name": "readme",
                    "mimeType": "text/plain"
                },
                {
                    "uri": "mock://binary",
                    "name": "binary",
                    "mimeType": "application/octet-stream"
                }
            ]
        })),
        "resources/read" => read_resource(&params),
        "tools/call" => Ok(call_tool(&params, options)),
        _ => Err(method_not_found(&request.method)),
    };

    match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": request.id, "result": result}),
        Err(error) => json!({"jsonrpc": "2.0", "id": request.id, "error": error}),
    }
}

fn method_not_found(method: &str) -> Value {
    json!({"code": -32601, "message": format!("Method not found: {}", method)})
}

fn list_tools(params: &Value) -> Value {
    let tools = [
        json!({
            "name": "echo",
            "description": "Echo back the input",
            "inputSchema": {
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }
        }),
        json!({
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }
        }),
        json!({
            "name": "slow",
            "description": "Sleep before answering",
            "inputSchema": {
                "type": "object",
                "properties": {"delay_ms": {"type": "number"}}
            }
        }),
        json!({
            "name": "crash",
            "description": "Exit the server",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "search",
            "description": "Report which server answered",
            "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
        }),
    ];

    let start: usize = params
        .get("cursor")
        .and_then(Value::as_str)
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let end = (start + PAGE_SIZE).min(tools.len());
    let page: Vec<Value> = tools[start.min(end)..end].to_vec();

    if end < tools.len() {
        json!({"tools": page, "nextCursor": end.to_string()})
    } else {
        json!({"tools": page})
    }
}

fn read_resource(params: &Value) -> Result<Value, Value> {
    let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
    match uri {
        "mock://readme" => Ok(json!({
            "contents": [{"uri": uri, "mimeType": "text/plain", "text": "Hello from the mock server"}]
        })),
        "mock://binary" => Ok(json!({
            "contents": [{"uri": uri, "mimeType": "application/octet-stream", "blob": "AAEC"}]
        })),
        _ => Err(json!({"code": -32002, "message": format!("Resource not found: {}", uri)})),
    }
}

fn call_tool(params: &Value, options: &Options) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    if options.crash_on.as_deref() == Some(name) || name == "crash" {
        std::process::exit(1);
    }

    let text = |text: String| json!({"content": [{"type": "text", "text": text}]});
    match name {
        "echo" => text(
            args.get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        ),
        "add" => {
            let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            text(format!("{}", a + b))
        }
        "slow" => {
            let delay = args.get("delay_ms").and_then(Value::as_u64).unwrap_or(1000);
            thread::sleep(Duration::from_millis(delay));
            text(format!("Slept for {} ms", delay))
        }
        "search" => text(options.name().to_string()),
        _ => json!({
            "content": [{"type": "text", "text": format!("Unknown tool: {}", name)}],
            "isError": true
        }),
    }
}
