/// Version injected at compile time via RESTKIT_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("RESTKIT_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use restkit::client::http::status_hint;
use restkit::{BasicAuth, BearerAuth, CallArgs, Client, ConfigFile, Pool, RequestOptions};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Declarative REST client
#[derive(Parser, Debug)]
#[command(name = "restkit", version, about, long_about = None)]
struct Args {
    /// Config file with resources and transport params (JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the base URI from the config
    #[arg(long, global = true)]
    base_uri: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Bearer token for the Authorization header
    #[arg(long, global = true, conflicts_with = "basic")]
    bearer: Option<String>,

    /// Basic credentials for the Authorization header
    #[arg(long, global = true, value_name = "USER:PASSWORD")]
    basic: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call one action and print the decoded response
    Call {
        /// Route as resource.action
        route: String,

        /// Positional arguments (JSON values, anything else is a string)
        args: Vec<String>,

        /// Query parameter
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        query: Vec<(String, String)>,

        /// Request header
        #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        header: Vec<(String, String)>,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Run several calls concurrently and print the results by name
    Pool {
        /// Entries as name=resource.action[:arg,arg...]
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// List the configured resources and their actions
    Resources,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("restkit {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("restkit").join("restkit.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".restkit").join("restkit.log");
    }
    PathBuf::from("restkit.log")
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

/// A CLI argument as a JSON value: `143` is a number, `rest` a string
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `name=resource.action[:arg,arg...]` into the name, route and pool params
fn parse_pool_entry(entry: &str) -> Result<(String, String, Value)> {
    let Some((name, target)) = entry.split_once('=') else {
        bail!("pool entry '{}' must look like name=resource.action[:arg,...]", entry);
    };

    let (route, params) = match target.split_once(':') {
        Some((route, args)) => {
            let parameters: Vec<Value> = args.split(',').filter(|a| !a.is_empty()).map(parse_arg).collect();
            (route, serde_json::json!({ "parameters": parameters }))
        },
        None => (target, Value::Null),
    };

    Ok((name.to_string(), route.to_string(), params))
}

fn load_config(args: &Args) -> Result<ConfigFile> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => ConfigFile::default_path().filter(|p| p.exists()),
    };

    let mut file = match path {
        Some(path) => {
            tracing::info!("Loading config from {:?}", path);
            ConfigFile::load(&path).with_context(|| format!("Failed to load config {}", path.display()))?
        },
        None => ConfigFile::default(),
    };

    if let Some(base_uri) = &args.base_uri {
        file.params.base_uri = Some(base_uri.clone());
    }

    Ok(file)
}

fn build_client(args: &Args) -> Result<Client> {
    let config = load_config(args)?.into_client_config();
    let client = Client::new(config).context("Failed to build client")?;

    if let Some(token) = &args.bearer {
        client.set_authorization(Arc::new(BearerAuth::new(token.clone())));
    } else if let Some(basic) = &args.basic {
        let Some((user, password)) = basic.split_once(':') else {
            bail!("--basic expects USER:PASSWORD");
        };
        client.set_authorization(Arc::new(BasicAuth::new(user, password)));
    }

    Ok(client)
}

async fn run_call(
    client: &Client,
    route: &str,
    args: &[String],
    query: Vec<(String, String)>,
    header: Vec<(String, String)>,
    body: Option<String>,
) -> Result<()> {
    let (resource, action) = restkit::resource::split_route(route)?;

    let mut options = RequestOptions::new();
    if !query.is_empty() {
        let query: Map<String, Value> = query.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        options = options.query(Value::Object(query));
    }
    for (name, value) in header {
        options = options.header(name, value);
    }
    if let Some(body) = body {
        let json: Value = serde_json::from_str(&body).context("--body must be valid JSON")?;
        options = options.json(json);
    }

    let handle = client.resource(resource)?;
    let call_args = CallArgs::new().args(args.iter().map(String::as_str).map(parse_arg)).options(options);
    let result = handle.call(action, call_args).await;

    if let Some(response) = handle.last_response() {
        if let Some(hint) = status_hint(response.status()) {
            eprintln!("{} - {}", response.status(), hint);
        }
    }

    let value = result.with_context(|| format!("{} failed", route))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run_pool(client: &Client, entries: &[String]) -> Result<()> {
    let mut pool = Pool::new();
    for entry in entries {
        let (name, route, params) = parse_pool_entry(entry)?;
        pool.add_resource(name, client, &route, params)
            .with_context(|| format!("Failed to start {}", entry))?;
    }

    let results = pool.send().await.context("Pool failed")?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn list_resources(client: &Client) -> Result<()> {
    let names = client.resource_names();
    if names.is_empty() {
        println!("No resources configured");
        return Ok(());
    }

    for name in names {
        let handle = client.resource(name)?;
        let resource = handle.resource();
        println!("{} ({})", name, resource.base_uri());

        let mut actions: Vec<_> = resource.actions().iter().collect();
        actions.sort_by(|a, b| a.0.cmp(b.0));
        for (action, definition) in actions {
            println!("  {:<16} {:<7} {}", action, definition.method, definition.path);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let client = build_client(&args)?;

    match args.command {
        Command::Call {
            route,
            args,
            query,
            header,
            body,
        } => run_call(&client, &route, &args, query, header, body).await,
        Command::Pool { entries } => run_pool(&client, &entries).await,
        Command::Resources => list_resources(&client),
    }
}
