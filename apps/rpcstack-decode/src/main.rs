//! RpcStack decode - print the outcome of an XML-RPC response as JSON.
//!
//! Reads one `methodResponse` document from the file named on the command
//! line, or from stdin when no path is given, and writes a single JSON object
//! to stdout: `{"value": ...}`, `{"fault": {...}}` or `{"error": {...}}`.
//!
//! # Usage
//!
//! ```text
//! rpcstack-decode response.xml
//! curl -s --data @call.xml http://host/RPC2 | rpcstack-decode
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | the server returned a value |
//! | `1` | the server returned a fault |
//! | `2` | the document could not be decoded |
//! | `3` | the input could not be opened or the output written |
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `XMLRPC_DECLARATION_OPTIONAL` | `true` | Accept documents without `<?xml ...?>` |
//! | `XMLRPC_UNKNOWN_TYPES_AS_STRING` | `false` | Decode unknown type tags as strings |
//! | `XMLRPC_ALLOW_NIL` | `false` | Accept `<nil/>` |
//! | `XMLRPC_ALLOW_I8` | `false` | Accept `<i8>` |
//! | `XMLRPC_APACHE_EXTENSIONS` | `false` | Accept `ex:nil` / `ex:i8` |
//! | `XMLRPC_DUPLICATE_MEMBERS` | `last-wins` | `last-wins`, `first-wins` or `reject` |
//! | `XMLRPC_MAX_DEPTH` | `1024` | Maximum struct/array nesting |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use rpcstack_xml::{Decoder, DecoderConfig, ResponseOutcome};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Nesting cap applied when `XMLRPC_MAX_DEPTH` is unset. Writing JSON
/// recurses once per level.
const OUTPUT_MAX_DEPTH: usize = 1024;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
/// Logs go to stderr so stdout carries only the JSON outcome.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    Ok(())
}

/// Log filter to install before the decoder config is loaded, so warnings
/// about rejected config values are not lost.
fn startup_log_level<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_LEVEL").unwrap_or_else(|| DecoderConfig::default().log_level)
}

/// Bound nesting so the JSON writer stays within the main thread's stack.
fn with_output_depth(mut config: DecoderConfig) -> DecoderConfig {
    if config.max_depth.is_none() {
        config.max_depth = Some(OUTPUT_MAX_DEPTH);
    }
    config
}

/// Open the input named by `path`, or stdin.
fn open_input(path: Option<&str>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {path}"))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

/// Exit status for an outcome; see the table in the crate docs.
fn exit_status(outcome: &ResponseOutcome) -> u8 {
    match outcome {
        ResponseOutcome::Value(_) => 0,
        ResponseOutcome::Fault(_) => 1,
        ResponseOutcome::Error(_) => 2,
    }
}

fn run() -> Result<u8> {
    init_tracing(&startup_log_level(|key| std::env::var(key).ok()))?;
    let config = with_output_depth(DecoderConfig::from_env());

    let path = std::env::args().nth(1);
    let input = open_input(path.as_deref())?;

    let decoder = Decoder::new(config);
    let outcome = decoder.decode(input);
    match &outcome {
        ResponseOutcome::Value(value) => info!(value_type = value.type_name(), "decoded value"),
        ResponseOutcome::Fault(fault) => info!(code = fault.code, "server returned a fault"),
        ResponseOutcome::Error(err) => error!(kind = err.kind.as_str(), error = %err, "decode failed"),
    }

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &outcome).context("failed to write outcome")?;
    writeln!(stdout).context("failed to write outcome")?;

    Ok(exit_status(&outcome))
}

fn main() -> ExitCode {
    match run() {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            eprintln!("rpcstack-decode: {e:#}");
            ExitCode::from(3)
        }
    }
}
