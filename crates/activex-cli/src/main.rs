//! activex - expose JSON host objects and Automation classes over stdio
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic/log messages go to stderr (never stdout)

mod session;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use activex_bridge::{
    create_object, hresult, platform_activator, ClassRegistry, CreateOptions, HostObject,
    HostValue, ObjectSource, ServerContext,
};
use activex_protocol::{Command, Request, Response, ResponseData, ResponseResult};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::session::Session;

#[derive(Parser)]
#[command(name = "activex")]
#[command(
    author,
    version,
    about = "Drive Automation objects and JSON host objects over stdio"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an object over newline-delimited JSON on stdin/stdout
    Serve {
        /// Host object to expose, as a JSON file
        #[arg(required_unless_present = "class", conflicts_with = "class")]
        host: Option<PathBuf>,

        /// Automation class (ProgID or {CLSID}) to create instead
        #[arg(long)]
        class: Option<String>,

        /// Attach to a running instance of the class before creating one
        #[arg(long)]
        activate: bool,

        /// Server context: any, in_process or local_server
        #[arg(long, default_value = "any", value_parser = parse_context)]
        context: ServerContext,

        /// Do not answer TypeInfo requests
        #[arg(long)]
        no_type: bool,
    },

    /// Read one member of a JSON host object through a dispatch proxy
    Get {
        /// Host object as a JSON file
        host: PathBuf,

        /// Member name
        member: String,

        /// Element index for sequence members
        #[arg(short, long)]
        index: Option<i64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            class,
            activate,
            context,
            no_type,
        } => {
            let options = CreateOptions {
                activate,
                context,
                type_info: !no_type,
            };
            serve(host.as_deref(), class, &options)
        }
        Commands::Get {
            host,
            member,
            index,
        } => get(&host, member, index),
    }
}

fn parse_context(s: &str) -> std::result::Result<ServerContext, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown server context '{s}'"))
}

fn load_host(path: &Path) -> Result<HostObject> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse '{}' as JSON", path.display()))?;
    match HostValue::from_json(json) {
        HostValue::Object(obj) => Ok(obj),
        other => bail!(
            "'{}' holds {} rather than an object or array",
            path.display(),
            other.to_display_string()
        ),
    }
}

fn serve(host: Option<&Path>, class: Option<String>, options: &CreateOptions) -> Result<()> {
    #[cfg(windows)]
    let _apartment = activex_bridge::com::ComApartment::enter().context("CoInitializeEx failed")?;

    let (source, host) = match (host, class) {
        (Some(path), _) => {
            let obj = load_host(path)?;
            (ObjectSource::from(obj.clone()), Some(obj))
        }
        (None, Some(class)) => (ObjectSource::ClassId(class), None),
        (None, None) => bail!("nothing to serve: pass a host JSON file or --class"),
    };

    let activator = platform_activator();
    let root = create_object(source, options, activator.as_ref())
        .context("Failed to create the root object")?;
    let mut session = Session::new(root, host).with_type_info(options.type_info);
    tracing::info!("Serving; root object is handle {}", session::HANDLE_ROOT);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line.context("stdin read error")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                tracing::debug!("request {}: {:?}", request.id, request.command);
                Response {
                    id: request.id,
                    result: session.handle(request.command),
                }
            }
            Err(e) => {
                tracing::warn!("JSON parse error: {e}; line was: {line}");
                // id 0: the request could not be parsed
                Response {
                    id: 0,
                    result: ResponseResult::error(
                        format!("invalid request: {e}"),
                        hresult::E_INVALIDARG,
                    ),
                }
            }
        };

        writeln!(out, "{}", serde_json::to_string(&response)?)?;
        out.flush()?;

        if session.is_finished() {
            break;
        }
    }

    tracing::info!("Session finished");
    Ok(())
}

fn get(path: &Path, member: String, index: Option<i64>) -> Result<()> {
    let host = load_host(path)?;
    let root = create_object(
        host.clone().into(),
        &CreateOptions::default(),
        &ClassRegistry::new(),
    )?;
    let mut session = Session::new(root, Some(host));

    match session.handle(Command::Get {
        object: session::HANDLE_ROOT,
        member,
        index,
    }) {
        ResponseResult::Ok {
            data: Some(ResponseData::Value { value }),
        } => {
            println!("{}", serde_json::to_string(&value)?);
            Ok(())
        }
        ResponseResult::Error { message, code } => {
            bail!("{message} (HRESULT {:#010x})", code as u32)
        }
        other => bail!("unexpected response: {other:?}"),
    }
}
