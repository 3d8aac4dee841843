use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use codebin_server::Server;
use codebin_storage_ephemeral::EphemeralStorage;
use codebin_storage_local::LocalStorage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum Backend {
    Local,
    Ephemeral,
}

#[derive(Parser, Debug)]
#[command(name = "codebin", version, about = "Code snippet sharing server")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, value_enum, default_value_t = Backend::Ephemeral)]
    backend: Backend,
    #[arg(long, default_value = "./data")]
    root: String,
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let cfg = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Serve(args) => serve(args, cfg.as_ref()).await?,
    }
    Ok(())
}

async fn serve(mut args: ServeArgs, cfg: Option<&AppConfig>) -> Result<()> {
    // apply config defaults if present for serve
    if let Some(cfg) = cfg {
        if let Some(s) = &cfg.serve {
            if let Some(b) = s.backend.clone() {
                args.backend = b;
            }
            if let Some(r) = s.root.clone() {
                args.root = r;
            }
            if let Some(a) = s.addr.clone() {
                args.addr = a;
            }
        }
        if let Some(d) = &cfg.default {
            args.backend = d.backend.clone().unwrap_or(args.backend);
            args.root = d.root.clone().unwrap_or(args.root);
        }
    }
    info!(backend = ?args.backend, addr = %args.addr, "starting server");
    match args.backend {
        Backend::Ephemeral => {
            let server = Server::new(EphemeralStorage::new());
            server
                .run_http(&args.addr)
                .await
                .map_err(|e| eyre!("http server exited with error: {e}"))
        }
        Backend::Local => {
            let root = expand_path(&args.root);
            let server = Server::new(LocalStorage::new(root));
            server
                .run_http(&args.addr)
                .await
                .map_err(|e| eyre!("http server exited with error: {e}"))
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SectionDefaults {
    backend: Option<Backend>,
    root: Option<String>,
    addr: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct AppConfig {
    #[serde(default)]
    default: Option<SectionDefaults>,
    #[serde(default)]
    serve: Option<SectionDefaults>,
}

fn load_config(path: Option<&str>) -> Result<Option<AppConfig>> {
    let mut builder = config::Config::builder()
        .add_source(config::Environment::with_prefix("CODEBIN").separator("__"));

    let mut has_sources = false;
    if let Some(raw) = path {
        let expanded = expand_path(raw);
        has_sources = true;
        if !expanded.exists() {
            tracing::warn!(
                path = expanded.display().to_string(),
                "config file not found; continuing with defaults and env overrides"
            );
        }
        builder = builder.add_source(config::File::from(expanded).required(false));
    }

    let cfg = builder
        .build()
        .map_err(|e| eyre!("config load error: {}", e))?;
    let parsed: AppConfig = cfg
        .try_deserialize()
        .map_err(|e| eyre!("config parse error: {}", e))?;
    if has_sources || parsed.default.is_some() || parsed.serve.is_some() {
        return Ok(Some(parsed));
    }
    Ok(None)
}

fn expand_path(input: &str) -> PathBuf {
    if input == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from(input));
    }
    if let Some(rest) = input.strip_prefix("~/") {
        return home_dir()
            .map(|mut base| {
                base.push(rest);
                base
            })
            .unwrap_or_else(|| PathBuf::from(rest));
    }
    PathBuf::from(input)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
}
