//! Command-line interface: serve the API, list modules, or call a console
//! operation in-process.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use coman_core::Arguments;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::app::App;
use crate::module::OperationSummary;
use crate::network::{NetworkConfig, NetworkModule, TlsConfig};
use crate::registry::Core;

/// Coman: run the API server or interact with modules.
#[derive(Debug, Parser)]
#[command(name = "coman", version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Force debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Serve options used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve(ServeArgs),

    /// List loaded modules and their console operations
    Modules {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Invoke a module operation without going through HTTP
    Call {
        module: String,
        operation: String,

        /// JSON object with arguments
        #[arg(long)]
        json: Option<String>,

        /// Argument as key=value; values are parsed as JSON when possible
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
    },
}

#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    #[arg(long, env = "COMAN_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "COMAN_PORT")]
    pub port: Option<u16>,

    /// PEM certificate; enables TLS together with --tls-key
    #[arg(long, env = "COMAN_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "COMAN_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

impl ServeArgs {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        let defaults = NetworkConfig::default();
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone().unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            tls,
            ..defaults
        }
    }
}

/// User-facing command failures. Each renders as a single line.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Invalid argument '{0}', expected key=value")]
    MissingSeparator(String),
    #[error("Invalid argument '{0}', key cannot be empty")]
    EmptyKey(String),
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("JSON payload must be an object with key/value pairs")]
    PayloadNotObject,
    #[error("Unknown module '{module}'. Available modules: {available}")]
    UnknownModule { module: String, available: String },
    #[error("Failed to execute {module}.{operation}: {reason}")]
    Failed {
        module: String,
        operation: String,
        reason: String,
    },
    #[error(transparent)]
    Output(#[from] std::io::Error),
}

/// A module as listed by `coman modules --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleListing {
    pub name: String,
    pub description: String,
    pub version: String,
    pub operations: Vec<OperationSummary>,
}

#[must_use]
pub fn describe_modules(core: &Core) -> Vec<ModuleListing> {
    core.modules()
        .iter()
        .map(|module| ModuleListing {
            name: module.name().to_string(),
            description: module.description().to_string(),
            version: module.version().to_string(),
            operations: module.describe_console_operations(),
        })
        .collect()
}

/// Writes the module listing as pretty JSON or aligned text.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn list_modules(core: &Core, as_json: bool, out: &mut impl Write) -> Result<(), CliError> {
    let listings = describe_modules(core);
    if as_json {
        write_json(out, &serde_json::to_value(&listings).map_err(std::io::Error::other)?)?;
        return Ok(());
    }
    if listings.is_empty() {
        writeln!(out, "No modules loaded")?;
        return Ok(());
    }

    let width = listings.iter().map(|l| l.name.len()).max().unwrap_or(0);
    for listing in &listings {
        writeln!(out, "{:<width$}  {}", listing.name, listing.description)?;
        for op in &listing.operations {
            let methods = if op.methods.is_empty() {
                String::new()
            } else {
                format!("[{}]", op.methods.join(","))
            };
            let line = format!("    - {} {methods} {} {}", op.name, op.path, op.summary);
            writeln!(out, "{}", line.trim_end())?;
        }
    }
    Ok(())
}

/// Parses one `key=value` argument. The value is decoded as JSON when it
/// parses, otherwise kept as a string.
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is blank.
pub fn parse_kv(arg: &str) -> Result<(String, Value), CliError> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| CliError::MissingSeparator(arg.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::EmptyKey(arg.to_string()));
    }
    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Merges the `--json` object and the `--arg` pairs; later pairs win.
///
/// # Errors
///
/// Returns an error for an invalid or non-object payload, or a malformed pair.
pub fn merge_arguments(json: Option<&str>, args: &[String]) -> Result<Arguments, CliError> {
    let mut merged = Arguments::new();
    if let Some(raw) = json.filter(|raw| !raw.is_empty()) {
        let loaded: Value =
            serde_json::from_str(raw).map_err(|e| CliError::InvalidJson(e.to_string()))?;
        let Value::Object(object) = loaded else {
            return Err(CliError::PayloadNotObject);
        };
        merged.extend(object);
    }
    for arg in args {
        let (key, value) = parse_kv(arg)?;
        merged.insert(key, value);
    }
    Ok(merged)
}

/// Invokes `module.operation` in-process and prints the result.
///
/// # Errors
///
/// Returns an error if the module is unknown, the arguments are malformed,
/// or the operation fails.
pub fn call_module(
    core: &Core,
    module: &str,
    operation: &str,
    json: Option<&str>,
    args: &[String],
    out: &mut impl Write,
) -> Result<(), CliError> {
    let Some(target) = core.get(module) else {
        let mut names = core.module_names();
        names.sort();
        let available = if names.is_empty() {
            "<none>".to_string()
        } else {
            names.join(", ")
        };
        return Err(CliError::UnknownModule {
            module: module.to_string(),
            available,
        });
    };

    let arguments = merge_arguments(json, args)?;
    let result = target
        .invoke_console_operation(operation, &arguments)
        .map_err(|err| CliError::Failed {
            module: module.to_string(),
            operation: operation.to_string(),
            reason: err.to_string(),
        })?;

    match result {
        Value::Null => write_json(out, &serde_json::json!({"ok": true}))?,
        Value::String(text) => writeln!(out, "{text}")?,
        other => write_json(out, &other)?,
    }
    Ok(())
}

fn write_json(out: &mut impl Write, value: &Value) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

/// Builds the application over `core` and serves it until Ctrl-C or
/// SIGTERM.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the server fails.
pub fn serve(core: Core, args: &ServeArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let app = App::build(Arc::new(core));
        let mut network = NetworkModule::new(args.network_config(), app);
        let port = network.start().await?;
        info!(port, "coman API ready");
        network.serve(shutdown_signal()).await
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
