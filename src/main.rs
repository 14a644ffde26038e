use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::ResultExt;
use modfetch_cache::{Database, Repository};
use modfetch_config::Config;
use modfetch_ingest::proxy::HttpProxy;
use modfetch_ingest::{Exclusions, Fetcher, TaskQueue};
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the database")]
    Database,
    #[display("could not set up the module proxy client")]
    Proxy,
    #[display("fetch queue failed")]
    Queue,
}

#[derive(Parser)]
#[command(
    name = "modfetch",
    version,
    about = "Fetch Go modules from a module proxy and index their packages and licenses"
)]
struct Cli {
    /// Config file (TOML, YAML or JSON). Defaults to the platform config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one module version now and print the resulting status.
    Fetch {
        module_path: String,
        /// A semantic version such as `v1.2.3`, or `latest`.
        version: String,
    },
    /// Fetch several module versions through the queue.
    Enqueue {
        /// `module@version` pairs.
        #[arg(required = true, value_parser = parse_module_version)]
        items: Vec<(String, String)>,
    },
    /// Fetch versions that were never attempted or are due for a retry.
    Requeue {
        /// How many versions to schedule. Defaults to `queue.requeue_batch`.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the stored fetch state of a module version.
    State { module_path: String, version: String },
}

fn parse_module_version(value: &str) -> std::result::Result<(String, String), String> {
    match value.rsplit_once('@') {
        Some((module, version)) if !module.is_empty() && !version.is_empty() => {
            Ok((module.to_string(), version.to_string()))
        },
        _ => Err(format!("expected module@version, found {value:?}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let db = open_database(&config).await?;
    let repo = Repository::from(&db);

    let code = match cli.command {
        Command::State { module_path, version } => {
            match repo.get_version_state(&module_path, &version).await.or_raise(|| ErrorKind::Database)? {
                Some(state) => {
                    println!("status:        {}", state.status);
                    println!("tries:         {}", state.try_count);
                    println!("error:         {}", state.error.as_deref().unwrap_or("-"));
                    println!("go.mod path:   {}", state.go_mod_path.as_deref().unwrap_or("-"));
                    println!("last attempt:  {}", state.last_processed_at.map_or("-".to_string(), |at| at.to_string()));
                    println!("next eligible: {}", state.next_processed_after);
                    ExitCode::SUCCESS
                },
                None => {
                    eprintln!("no state recorded for {module_path}@{version}");
                    ExitCode::FAILURE
                },
            }
        },
        Command::Fetch { module_path, version } => {
            let fetcher = fetcher(&config, repo)?;
            let (status, error) = fetcher.fetch_and_update_state(&module_path, &version).await;
            println!("{status}");
            if let Some(error) = error {
                eprintln!("{error}");
            }
            if status.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        },
        Command::Enqueue { items } => {
            let queue = TaskQueue::from_config(fetcher(&config, repo)?, &config.queue).or_raise(|| ErrorKind::Queue)?;
            for (module_path, version) in &items {
                queue.schedule(module_path, version, None).await.or_raise(|| ErrorKind::Queue)?;
            }
            drain(&queue).await?;
            ExitCode::SUCCESS
        },
        Command::Requeue { limit } => {
            let queue = TaskQueue::from_config(fetcher(&config, repo)?, &config.queue).or_raise(|| ErrorKind::Queue)?;
            let scheduled = queue
                .requeue(limit.unwrap_or(config.queue.requeue_batch))
                .await
                .or_raise(|| ErrorKind::Queue)?;
            drain(&queue).await?;
            println!("{scheduled} versions fetched");
            ExitCode::SUCCESS
        },
    };
    db.close().await;
    Ok(code)
}

async fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
    }
    Database::connect_with_limit(&config.database.path, config.database.max_connections)
        .await
        .or_raise(|| ErrorKind::Database)
}

fn fetcher(config: &Config, repo: Repository) -> Result<Fetcher> {
    let proxy = HttpProxy::from_config(&config.proxy, config.limits.max_archive_size).or_raise(|| ErrorKind::Proxy)?;
    Ok(Fetcher::new(Arc::new(proxy), Arc::new(repo), Exclusions::from(&config.exclusions), config.limits.clone()))
}

/// Wait for running fetches, or stop waiting on Ctrl-C.
async fn drain(queue: &TaskQueue) -> Result<()> {
    tokio::select! {
        result = queue.drain() => result.or_raise(|| ErrorKind::Queue),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, abandoning running fetches");
            Ok(())
        },
    }
}
