//! `remote-config` binary.
//!
//! ```text
//! remote-config run   --root <dir> --section <name>...   follow sections from an authority
//! remote-config serve --dir <dir> --bind <addr>          serve sections as an authority
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use remote_config::authority::{self, AuthorityState};
use remote_config::lifecycle::signals::shutdown_on_signal;
use remote_config::observability::{logging, metrics};
use remote_config::remote::environment;
use remote_config::watch::file_watcher::DEFAULT_DEBOUNCE;
use remote_config::{FileWatcher, GenericSection, RemoteConfigManager, Shutdown};

#[derive(Parser)]
#[command(name = "remote-config")]
#[command(about = "Versioned configuration sections synced from a central authority", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Expose Prometheus metrics on this address
    #[arg(long, global = true)]
    metrics_address: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize sections and keep them in sync with the authority
    Run {
        /// Configuration root (defaults to $REMOTE_CONFIG_ROOT or ./config)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Section to materialize; repeatable
        #[arg(long = "section", required = true)]
        sections: Vec<String>,

        /// Quiet period before a changed file is reloaded
        #[arg(long, default_value_t = DEFAULT_DEBOUNCE.as_millis() as u64)]
        debounce_ms: u64,
    },
    /// Serve section documents from a directory
    Serve {
        #[arg(long)]
        dir: PathBuf,

        #[arg(long, default_value = "127.0.0.1:8700")]
        bind: SocketAddr,

        /// Base URL clients use to download sections (defaults to http://<bind>)
        #[arg(long)]
        public_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    logging::init(cli.log_json);
    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    match cli.command {
        Commands::Run {
            root,
            sections,
            debounce_ms,
        } => run(root.unwrap_or_else(environment::config_root), sections, debounce_ms).await,
        Commands::Serve {
            dir,
            bind,
            public_url,
        } => serve(dir, bind, public_url).await,
    }
}

async fn run(root: PathBuf, sections: Vec<String>, debounce_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    let watcher = Arc::new(FileWatcher::with_delay(Duration::from_millis(debounce_ms))?);
    let manager = RemoteConfigManager::start(&root, watcher)?;
    let mut changes = manager.subscribe();

    for name in &sections {
        let section = manager.get_section::<GenericSection>(name).await?;
        let version = manager
            .registry()
            .entry(name)
            .map(|entry| entry.version().to_string())
            .unwrap_or_default();
        tracing::info!(section = %name, version = %version, keys = section.load().0.len(), "Section materialized");
    }

    let shutdown = Shutdown::new();
    let polling = manager.spawn_polling(shutdown.subscribe());

    let signal = shutdown_on_signal(&shutdown);
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => break,
            event = changes.recv() => match event {
                Ok(changed) => {
                    tracing::info!(section = %changed.section, version = %changed.version, "Section updated");
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Change notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    shutdown.trigger();
    polling.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn serve(dir: PathBuf, bind: SocketAddr, public_url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(bind).await?;
    let public_url = public_url.unwrap_or_else(|| format!("http://{bind}"));
    let state = AuthorityState::new(dir, &public_url);

    let shutdown = Shutdown::new();
    let server = tokio::spawn(authority::serve(listener, state, shutdown.subscribe()));

    shutdown_on_signal(&shutdown).await;
    server.await??;
    Ok(())
}
