/// Version injected at compile time via AZRM_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("AZRM_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

use anyhow::{bail, Context, Result};
use azrm::azure::http::format_arm_error;
use azrm::config::{Config, Overrides};
use azrm::resource::{
    get_all_data_source_keys, get_all_resource_keys, get_data_source, get_resource, Provider,
    ResourceState,
};
use azrm::ProviderError;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Manage Azure Resource Manager resources from flat configuration files
#[derive(Parser, Debug)]
#[command(name = "azrm", version = VERSION, about, long_about = None)]
struct Args {
    /// Subscription to operate in (overrides ARM_SUBSCRIPTION_ID)
    #[arg(long, global = true)]
    subscription: Option<String>,

    /// Tenant to authenticate against (overrides ARM_TENANT_ID)
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Seconds between long-running operation polls
    #[arg(long, global = true)]
    poll_interval_secs: Option<u64>,

    /// Output format for resulting state
    #[arg(short, long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every resource and data source type
    Types,
    /// Print the field schema of a type
    Schema {
        type_name: String,
    },
    /// Create a resource from configuration
    Create {
        type_name: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Refresh a resource's state
    Read {
        type_name: String,
        #[arg(long)]
        id: String,
        /// Previously saved state
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
    /// Apply new configuration to an existing resource
    Update {
        type_name: String,
        #[arg(long)]
        id: String,
        #[arg(short, long)]
        config: PathBuf,
        /// State from the previous apply; read from Azure when omitted
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
    /// Delete a resource
    Delete {
        type_name: String,
        #[arg(long)]
        id: String,
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
    /// Bring an existing resource under management
    Import {
        type_name: String,
        #[arg(long)]
        id: String,
    },
    /// Look up an existing object through a data source
    Data {
        type_name: String,
        #[arg(short, long)]
        config: PathBuf,
    },
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

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

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

    tracing::info!("azrm {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azrm").join("azrm.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azrm").join("azrm.log");
    }
    PathBuf::from("azrm.log")
}

/// A JSON or YAML document, chosen by file extension
fn load_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

fn load_config(path: &Path) -> Result<Map<String, Value>> {
    load_document(path)
}

fn load_state(path: Option<&Path>) -> Result<Option<ResourceState>> {
    path.map(load_document).transpose()
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text.trim_end());
    Ok(())
}

fn print_schema(type_name: &str, format: OutputFormat) -> Result<()> {
    if let Some(handler) = get_resource(type_name) {
        return print(&handler.schema(), format);
    }
    if let Some(handler) = get_data_source(type_name) {
        return print(&handler.schema(), format);
    }
    bail!(ProviderError::UnknownResourceType(type_name.to_string()))
}

fn build_provider(args: &Args) -> Result<Provider> {
    let mut config = Config::load()?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.apply_overrides(&Overrides {
        subscription_id: args.subscription.clone(),
        tenant_id: args.tenant.clone(),
        poll_interval_secs: args.poll_interval_secs,
    });

    let client = config.build_client(std::env::var("ARM_ACCESS_TOKEN").ok())?;
    tracing::info!("Using subscription: {}", client.subscription_id);
    Ok(Provider::new(client))
}

async fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Types => {
            #[derive(Serialize)]
            struct Types {
                resources: Vec<&'static str>,
                data_sources: Vec<&'static str>,
            }
            print(
                &Types {
                    resources: get_all_resource_keys(),
                    data_sources: get_all_data_source_keys(),
                },
                args.output,
            )
        }
        Command::Schema { type_name } => print_schema(type_name, args.output),
        Command::Create { type_name, config } => {
            let provider = build_provider(args)?;
            let state = provider.create(type_name, load_config(config)?).await?;
            print(&state, args.output)
        }
        Command::Read {
            type_name,
            id,
            state,
        } => {
            let provider = build_provider(args)?;
            let attributes = load_state(state.as_deref())?
                .map(|s| s.attributes)
                .unwrap_or_default();
            let state = provider.read(type_name, id, attributes).await?;
            if state.id.is_empty() {
                eprintln!("{} no longer exists", id);
            }
            print(&state, args.output)
        }
        Command::Update {
            type_name,
            id,
            config,
            state,
        } => {
            let provider = build_provider(args)?;
            let prior = load_state(state.as_deref())?.map(|s| s.attributes);
            let state = provider
                .update(type_name, id, load_config(config)?, prior)
                .await?;
            print(&state, args.output)
        }
        Command::Delete {
            type_name,
            id,
            state,
        } => {
            let provider = build_provider(args)?;
            let attributes = load_state(state.as_deref())?
                .map(|s| s.attributes)
                .unwrap_or_default();
            provider.delete(type_name, id, attributes).await?;
            eprintln!("Deleted {}", id);
            Ok(())
        }
        Command::Import { type_name, id } => {
            let provider = build_provider(args)?;
            let state = provider.import(type_name, id).await?;
            print(&state, args.output)
        }
        Command::Data { type_name, config } => {
            let provider = build_provider(args)?;
            let state = provider
                .read_data_source(type_name, load_config(config)?)
                .await?;
            print(&state, args.output)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    if let Err(err) = run(&args).await {
        tracing::error!("{:#}", err);
        match err.downcast_ref::<ProviderError>() {
            Some(provider_error) => eprintln!("Error: {}", format_arm_error(provider_error)),
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
