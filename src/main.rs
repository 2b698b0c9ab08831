mod shell;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use shuttle::config::{AppConfig, ConfigError};
use shuttle::provider::{IdentityProvider, MemoryProvider, ProfileStore, ProviderError, SupabaseProvider};
use shuttle::services::auth::AuthGateway;
use shuttle::services::fleet::{self, Fleet};
use shuttle::services::navigation::{NavigationError, NavigationGate};
use shuttle::services::notification::{NotificationCenter, NotificationEvent};

#[derive(Parser, Debug)]
#[command(name = "shuttle", about = "Campus shuttle tracker console")]
struct Cli {
    /// Use the built-in demo accounts even when a backend is configured.
    #[arg(long)]
    demo: bool,

    /// Keep buses parked instead of running the position simulation.
    #[arg(long)]
    no_simulation: bool,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error("console input failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "shuttle exited");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;

    // Offline demo when no backend is configured.
    let (provider, profiles): (Arc<dyn IdentityProvider>, Arc<dyn ProfileStore>) = match &config.supabase {
        Some(supabase) if !cli.demo => {
            let provider = Arc::new(SupabaseProvider::new(supabase)?);
            tracing::info!(url = %supabase.url, "using hosted identity provider");
            (Arc::clone(&provider) as Arc<dyn IdentityProvider>, provider)
        }
        _ => {
            tracing::warn!("backend not configured; using demo accounts");
            let provider = Arc::new(MemoryProvider::with_demo_accounts());
            (Arc::clone(&provider) as Arc<dyn IdentityProvider>, provider)
        }
    };

    let gateway = Arc::new(AuthGateway::new(provider, profiles));
    let host = Arc::new(shell::ConsoleHost::default());
    let gate = NavigationGate::start(&gateway.sessions(), Arc::clone(&host) as _).await?.spawn();

    let fleet = Arc::new(Fleet::seeded());
    let simulation = (!cli.no_simulation)
        .then(|| fleet::spawn_simulation(Arc::clone(&fleet), Duration::from_secs(config.fleet_tick_secs)));

    let notifications = Arc::new(NotificationCenter::seeded());
    let mut inbox = notifications.subscribe();
    let inbox_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            if let NotificationEvent::UnreadCountChanged(count) = event {
                tracing::debug!(count, "unread notifications");
            }
        }
    });

    let console = shell::Console::new(Arc::clone(&gateway), fleet, notifications, gate.watch());
    println!("{}", shell::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if gate.is_finished() {
            break;
        }
        print!("shuttle{}> ", host.route().unwrap_or_default());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match console.handle_line(&line).await {
            shell::Flow::Continue(output) if output.is_empty() => {}
            shell::Flow::Continue(output) => println!("{output}"),
            shell::Flow::Quit => break,
        }
    }

    if let Some(simulation) = simulation {
        simulation.abort();
    }
    inbox_task.abort();
    gate.stop().await?;
    Ok(())
}
