use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    actions::run_action,
    browser::BrowserCall,
    load_settings, load_settings_from, sagas, spawn_socket_bridge, RecordingBrowser,
    SagaEvent, SagaServices, Store, WsChannel,
};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs actions against the configured backend and prints the resulting
/// store and browser effects as JSON.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `client.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Action type to dispatch, e.g. `LOGIN` or `GETLISTINGS`.
    #[arg(long)]
    action: Option<String>,
    #[arg(long)]
    payload: Option<String>,
    /// Route-style parameter `key=value`; values that parse as JSON keep their type.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,
    /// JSON object seeded into the store before dispatching.
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// WebSocket path to subscribe to; frames are dispatched as `SOCKETMESSAGE`.
    #[arg(long)]
    socket: Option<String>,
    /// Give up after this long without saga activity.
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,
}

const SETTLE: Duration = Duration::from_millis(250);

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_json(label: &str, raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(raw) => {
            serde_json::from_str(raw).with_context(|| format!("--{label} is not valid JSON"))
        }
        None => Ok(Value::Null),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings()?,
    };
    let fields = match parse_json("state", args.state.as_deref())? {
        Value::Object(fields) => fields,
        Value::Null => Map::new(),
        _ => bail!("--state must be a JSON object"),
    };

    let browser = Arc::new(RecordingBrowser::default());
    let services =
        SagaServices::new(settings, browser.clone())?.with_store(Store::with_fields(fields));
    let runtime = sagas::start_runtime(services);
    let mut events = runtime.subscribe();

    let bridge = match &args.socket {
        Some(path) => {
            let channel = WsChannel::connect(&runtime.services().settings, path)?;
            Some(spawn_socket_bridge(runtime.handle(), channel))
        }
        None => None,
    };

    if let Some(name) = &args.action {
        let mut action = run_action(name, parse_json("payload", args.payload.as_deref())?)?;
        for (key, value) in &args.params {
            action = action.with_param(key.clone(), value.clone());
        }
        if let Some(ms) = args.timeout_ms {
            action = action.with_timeout(Duration::from_millis(ms));
        }
        info!(action = %action.kind, "console: dispatching");
        runtime.dispatch(action)?;
    } else if bridge.is_none() {
        bail!("nothing to do: pass --action and/or --socket");
    }

    wait_for_idle(&mut events, Duration::from_secs(args.wait_secs), bridge.is_some()).await;

    let report = json!({
        "state": runtime.store().snapshot().await,
        "events": runtime.store().events().await,
        "browser": browser.calls().iter().map(browser_call_json).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(bridge) = bridge {
        bridge.abort();
    }
    runtime.shutdown();
    Ok(())
}

/// Returns once every started saga has finished and nothing new starts within
/// a short settle window. With a socket open, only `wait` ends the run.
async fn wait_for_idle(
    events: &mut broadcast::Receiver<SagaEvent>,
    wait: Duration,
    listening: bool,
) {
    let mut running = 0usize;
    let mut seen = false;
    loop {
        let window = if seen && running == 0 && !listening {
            SETTLE
        } else {
            wait
        };
        match tokio::time::timeout(window, events.recv()).await {
            Ok(Ok(SagaEvent::Started { .. })) => {
                running += 1;
                seen = true;
            }
            Ok(Ok(event)) => {
                running = running.saturating_sub(1);
                if let SagaEvent::Failed { kind, error }
                | SagaEvent::Panicked {
                    kind,
                    message: error,
                } = &event
                {
                    warn!(action = %kind, %error, "console: saga did not complete");
                }
            }
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "console: missed saga events");
            }
            Ok(Err(RecvError::Closed)) => return,
            Err(_) => {
                if running > 0 {
                    warn!(running, "console: gave up waiting for sagas");
                }
                return;
            }
        }
    }
}

fn browser_call_json(call: &BrowserCall) -> Value {
    match call {
        BrowserCall::Navigate(path) => json!({ "navigate": path }),
        BrowserCall::Alert(message) => json!({ "alert": message }),
        BrowserCall::Download(attachment) => json!({
            "download": {
                "filename": attachment.filename,
                "contentType": attachment.content_type,
                "size": attachment.bytes.len(),
            }
        }),
    }
}
