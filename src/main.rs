//! Purpose: `couchlink` CLI entry point.
//! Role: Binary crate root; parses args, opens the bucket, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty when stdout is a terminal).
//! Invariants: Errors are emitted as JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use couchlink::api::{
    Authenticator, Bucket, BucketOptions, Cluster, ClusterOptions, ConnectionSpec, DesignDocument,
    DesignDocumentNamespace, Error, ErrorKind, OpContext, RestTransport, ViewOptions,
    to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err(Error::new(ErrorKind::Configuration)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `couchlink --help`."));
            }
        },
    };

    init_tracing();
    command_dispatch::dispatch_command(cli.command, &cli.connection)
}

#[derive(Parser)]
#[command(
    name = "couchlink",
    version,
    about = "Manage design documents and inspect sessions on a document database cluster",
    long_about = None,
    after_help = r#"EXAMPLES
  $ couchlink --connstr couchbase://10.0.0.5 --bucket travel ddoc list --namespace development
  $ couchlink ddoc upsert by_type --file by_type.json
  $ couchlink ddoc publish by_type
  $ couchlink collection resolve inventory hotels

NOTES
  - Credentials fall back to COUCHLINK_USERNAME / COUCHLINK_PASSWORD
  - Certificate auth uses certpath/keypath/cacertpath from a couchbases:// connection string
  - Set RUST_LOG=debug to trace HTTP requests"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct ConnectionArgs {
    #[arg(
        long,
        global = true,
        env = "COUCHLINK_CONNSTR",
        help = "Connection string, e.g. couchbase://host1,host2 or couchbases://host?cacertpath=ca.pem"
    )]
    connstr: Option<String>,
    #[arg(
        long,
        global = true,
        env = "COUCHLINK_BUCKET",
        help = "Bucket to open"
    )]
    bucket: Option<String>,
    #[arg(long, global = true, env = "COUCHLINK_USERNAME", help = "RBAC username")]
    username: Option<String>,
    #[arg(
        long,
        global = true,
        env = "COUCHLINK_PASSWORD",
        hide_env_values = true,
        help = "RBAC password"
    )]
    password: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Authenticate with the client certificate from the connection string (overrides username/password)"
    )]
    cert_auth: bool,
    #[arg(
        long = "timeout-ms",
        global = true,
        help = "Per-command timeout in milliseconds (defaults: 75000 for management, 2500 for collections)"
    )]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Manage design documents (view indexes)",
        after_help = r#"EXAMPLES
  $ couchlink ddoc get by_type --namespace development
  $ couchlink ddoc list
  $ couchlink ddoc upsert by_type --file by_type.json --namespace development
  $ couchlink ddoc drop by_type --namespace development
  $ couchlink ddoc publish by_type

NOTES
  - Names are logical; the development marker is added and stripped automatically
  - Upsert files hold {"views": {"<view>": {"map": "...", "reduce": "..."}}}"#
    )]
    Ddoc {
        #[command(subcommand)]
        command: DdocCommand,
    },
    #[command(arg_required_else_help = true, about = "Resolve collection identifiers")]
    Collection {
        #[command(subcommand)]
        command: CollectionCommand,
    },
    #[command(about = "Report per-endpoint connection state for the bucket session")]
    Diagnostics,
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version information as JSON")]
    Version,
}

#[derive(Subcommand)]
enum DdocCommand {
    #[command(about = "Fetch one design document")]
    Get {
        name: String,
        #[arg(long, value_enum, default_value = "production")]
        namespace: NamespaceArg,
    },
    #[command(about = "List design documents in a namespace")]
    List {
        #[arg(long, value_enum, default_value = "production")]
        namespace: NamespaceArg,
    },
    #[command(about = "Create or replace a design document from a JSON file")]
    Upsert {
        name: String,
        #[arg(short = 'f', long = "file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, value_enum, default_value = "development")]
        namespace: NamespaceArg,
    },
    #[command(about = "Delete a design document")]
    Drop {
        name: String,
        #[arg(long, value_enum, default_value = "development")]
        namespace: NamespaceArg,
    },
    #[command(about = "Promote a development design document to production")]
    Publish { name: String },
}

#[derive(Subcommand)]
enum CollectionCommand {
    #[command(about = "Resolve a scope/collection pair to its numeric identifier")]
    Resolve { scope: String, collection: String },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum NamespaceArg {
    Development,
    Production,
}

impl From<NamespaceArg> for DesignDocumentNamespace {
    fn from(value: NamespaceArg) -> Self {
        match value {
            NamespaceArg::Development => DesignDocumentNamespace::Development,
            NamespaceArg::Production => DesignDocumentNamespace::Production,
        }
    }
}

fn open_bucket(args: &ConnectionArgs) -> Result<Bucket, Error> {
    let connstr = args.connstr.as_deref().ok_or_else(|| {
        Error::new(ErrorKind::Configuration)
            .with_message("missing connection string")
            .with_hint("Pass --connstr or set COUCHLINK_CONNSTR.")
    })?;
    let spec = ConnectionSpec::parse(connstr)?;
    let bucket = args
        .bucket
        .clone()
        .or_else(|| spec.bucket.clone())
        .ok_or_else(|| {
            Error::new(ErrorKind::Configuration)
                .with_message("missing bucket name")
                .with_hint("Pass --bucket, set COUCHLINK_BUCKET, or add /<bucket> to the connection string.")
        })?;
    let authenticator = authenticator(args)?;

    let mut options = ClusterOptions::new();
    if let Some(ms) = args.timeout_ms {
        let timeout = Duration::from_millis(ms);
        options = options
            .with_management_timeout(timeout)
            .with_view_timeout(timeout)
            .with_kv_timeout(timeout);
    }

    let cluster = Cluster::with_transport(
        spec,
        authenticator,
        options,
        Arc::new(RestTransport::new()),
    );
    cluster.bucket(&bucket, BucketOptions::default())
}

fn authenticator(args: &ConnectionArgs) -> Result<Option<Authenticator>, Error> {
    if args.cert_auth {
        return Ok(Some(Authenticator::certificate()));
    }
    match (&args.username, &args.password) {
        (Some(username), Some(password)) => Ok(Some(Authenticator::password(username, password))),
        (Some(_), None) => Err(Error::new(ErrorKind::Configuration)
            .with_message("missing password")
            .with_hint("Pass --password or set COUCHLINK_PASSWORD.")),
        (None, _) => Ok(None),
    }
}

fn view_options(args: &ConnectionArgs) -> ViewOptions {
    match args.timeout_ms {
        Some(ms) => ViewOptions::new().with_timeout(Duration::from_millis(ms)),
        None => ViewOptions::new(),
    }
}

fn read_design_document(name: &str, path: &Path) -> Result<DesignDocument, Error> {
    let raw = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Configuration)
            .with_message(format!("failed to read {}", path.display()))
            .with_source(err)
    })?;
    let mut doc: DesignDocument = serde_json::from_slice(&raw).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message(format!("{} is not a design document", path.display()))
            .with_hint(r#"Expected {"views": {"<view>": {"map": "..."}}}."#)
            .with_source(err)
    })?;
    doc.name = name.to_string();
    Ok(doc)
}

fn design_document_json(doc: &DesignDocument) -> Value {
    json!({ "name": doc.name, "views": doc.views })
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Configuration => "invalid configuration".to_string(),
        ErrorKind::NotConnected => "session is not connected".to_string(),
        ErrorKind::Unsupported => "not supported by the cluster".to_string(),
        ErrorKind::Timeout => "deadline exceeded".to_string(),
        ErrorKind::Cancelled => "cancelled".to_string(),
        ErrorKind::Authentication => "authentication failed".to_string(),
        ErrorKind::CollectionNotFound => "collection not found".to_string(),
        ErrorKind::IndexNotFound => "design document not found".to_string(),
        ErrorKind::Index => "view index request failed".to_string(),
        ErrorKind::PublishSourceMissing => "development design document is missing".to_string(),
        ErrorKind::PublishUpsertFailed => "production upsert failed".to_string(),
        ErrorKind::PublishCleanupFailed => "development copy was not dropped".to_string(),
        ErrorKind::Transport => "transport error".to_string(),
        ErrorKind::Decode => "invalid response".to_string(),
        ErrorKind::Internal => "internal error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(operation) = err.operation() {
        inner.insert("operation".to_string(), json!(operation));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
