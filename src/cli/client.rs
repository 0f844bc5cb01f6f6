//! Client side of the CLI: JSON-RPC over the hub's unix socket.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use hub_core::jsonrpc::{Request, Response};

use super::OutputFormat;
use crate::hub::config::default_data_dir;

/// One request, one reply, over NDJSON.
pub async fn unix_request(socket: &str, method: &str, params: Value) -> anyhow::Result<Response> {
    let stream = UnixStream::connect(socket).await?;
    let (read_half, mut write_half) = stream.into_split();

    let request = Request {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params: Some(params),
        id: Some(json!("1")),
    };
    let mut data = serde_json::to_vec(&request)?;
    data.push(b'\n');
    write_half.write_all(&data).await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(serde_json::from_str(line.trim())?)
}

pub fn print_response(response: &Response, format: OutputFormat) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(response),
        OutputFormat::Pretty => serde_json::to_string_pretty(response),
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to render response: {err}"),
    }
}

/// Run a client command: send, print, map transport failures to exit 1.
pub async fn run_client_command(
    socket: &str,
    method: &str,
    params: Value,
    format: OutputFormat,
) -> i32 {
    match unix_request(socket, method, params).await {
        Ok(response) => {
            print_response(&response, format);
            0
        }
        Err(_) => {
            eprintln!("hub not responding");
            1
        }
    }
}

pub async fn run_status(socket: &str, format: OutputFormat) -> i32 {
    run_client_command(socket, "hub/status", Value::Null, format).await
}

pub async fn run_agents(socket: &str, health: bool, format: OutputFormat) -> i32 {
    run_client_command(
        socket,
        "hub/agents/list",
        json!({"includeHealth": health}),
        format,
    )
    .await
}

pub async fn run_send(
    socket: &str,
    agent_id: &str,
    text: &str,
    context: Option<String>,
    timeout_ms: Option<u64>,
    format: OutputFormat,
) -> i32 {
    let mut message = hub_core::model::Message::user_text(text);
    message.context_id = context.filter(|ctx| !ctx.is_empty());
    let mut metadata = serde_json::Map::new();
    metadata.insert("targetAgent".to_string(), json!(agent_id));
    if let Ok(cwd) = std::env::current_dir() {
        metadata.insert("workingDirectory".to_string(), json!(cwd));
    }
    message.metadata = Some(metadata);

    let mut configuration = json!({"historyLength": 10});
    if let Some(timeout_ms) = timeout_ms {
        configuration["timeout"] = json!(timeout_ms);
    }
    run_client_command(
        socket,
        "message/send",
        json!({"message": message, "configuration": configuration}),
        format,
    )
    .await
}

pub async fn run_tasks(
    socket: &str,
    context: Option<String>,
    state: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> i32 {
    run_client_command(
        socket,
        "hub/tasks/list",
        json!({
            "contextId": context.unwrap_or_default(),
            "state": state.unwrap_or_default(),
            "limit": limit,
            "offset": 0,
        }),
        format,
    )
    .await
}

/// Signal the running hub via its pid file.
pub fn run_stop() -> i32 {
    let pid_file = default_data_dir().join("hub.pid");
    let Ok(contents) = std::fs::read_to_string(&pid_file) else {
        eprintln!("hub not running");
        return 1;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        eprintln!("invalid pid file: {}", pid_file.display());
        return 1;
    };
    match nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid),
        nix::sys::signal::Signal::SIGTERM,
    ) {
        Ok(()) => {
            println!("stop signal sent");
            0
        }
        Err(err) => {
            eprintln!("failed to signal hub: {err}");
            1
        }
    }
}
