//! CLI surface: `start`, `stop`, `status`, `agents`, `send`, `tasks`,
//! and `tui` (same lifecycle as a foreground `start`; the interactive
//! renderer is an external client of the socket).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use crate::hub::config::{default_orchestrator_agents, DEFAULT_SOCKET_PATH};
use crate::hub::{HubConfig, HubServer};
use crate::transport::{HttpTransport, UnixTransport};

pub mod client;
pub mod env;

/// Interval between registry health sweeps.
const HEALTH_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Local multi-agent orchestration hub
#[derive(Parser, Debug)]
#[command(name = "agents-hub")]
#[command(about = "Local multi-agent orchestration hub")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the hub
    Start(LifecycleArgs),
    /// Stop a running hub
    Stop {
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: String,
    },
    /// Show hub status
    Status {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: String,
    },
    /// List registered agents
    Agents {
        /// Include health in the listing
        #[arg(long)]
        health: bool,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: String,
    },
    /// Send a message to an agent
    Send {
        agent_id: String,
        message: String,
        /// Context id to continue
        #[arg(long)]
        context: Option<String>,
        /// Timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: String,
    },
    /// List tasks
    Tasks {
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: String,
    },
    /// Run the hub for an attached interactive UI
    Tui(LifecycleArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LifecycleArgs {
    /// Run in the foreground
    #[arg(long)]
    pub foreground: bool,
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,
    /// Disable the HTTP transport
    #[arg(long)]
    pub no_http: bool,
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket: String,
    /// Debug logging
    #[arg(long)]
    pub verbose: bool,
    /// Comma-separated delegate ids, or `none` to disable orchestration
    #[arg(long)]
    pub orchestrator_agents: Option<String>,
    /// Router agent id for LLM routing, or `none`
    #[arg(long)]
    pub orchestrator_router: Option<String>,
}

impl Default for LifecycleArgs {
    fn default() -> Self {
        LifecycleArgs {
            foreground: true,
            http_port: 8080,
            no_http: false,
            socket: DEFAULT_SOCKET_PATH.to_string(),
            verbose: false,
            orchestrator_agents: None,
            orchestrator_router: None,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Pretty,
}

/// Entry point: parse and dispatch. Exit code 0 on success, 1 on any
/// CLI-level failure.
pub async fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders --help/--version through the error path too.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return code;
        }
    };

    match cli.command {
        Some(Commands::Start(args)) => run_hub(args).await,
        Some(Commands::Tui(args)) => run_hub(args).await,
        None => run_hub(LifecycleArgs::default()).await,
        Some(Commands::Stop { socket: _ }) => client::run_stop(),
        Some(Commands::Status { format, socket }) => client::run_status(&socket, format).await,
        Some(Commands::Agents {
            health,
            format,
            socket,
        }) => client::run_agents(&socket, health, format).await,
        Some(Commands::Send {
            agent_id,
            message,
            context,
            timeout,
            format,
            socket,
        }) => client::run_send(&socket, &agent_id, &message, context, timeout, format).await,
        Some(Commands::Tasks {
            context,
            state,
            limit,
            format,
            socket,
        }) => client::run_tasks(&socket, context, state, limit, format).await,
    }
}

/// `--orchestrator-agents` flag, then `ORCHESTRATOR_AGENTS`, then the
/// default delegate list. `none` disables orchestration.
pub fn resolve_orchestrator_agents(flag: Option<&str>) -> Vec<String> {
    let value = match flag {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => std::env::var("ORCHESTRATOR_AGENTS").unwrap_or_default(),
    };
    if value.is_empty() {
        return default_orchestrator_agents();
    }
    if value.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn resolve_orchestrator_router(flag: Option<&str>) -> Option<String> {
    let value = match flag {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => std::env::var("ORCHESTRATOR_ROUTER").unwrap_or_default(),
    };
    let value = value.trim().to_string();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value)
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_filter = if verbose {
        "agents_hub=debug,hub_core=debug,hub_agents=debug"
    } else {
        "agents_hub=info,hub_core=info,hub_agents=info"
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

async fn run_hub(args: LifecycleArgs) -> i32 {
    init_tracing(args.verbose);

    let mut config = HubConfig::default();
    config.socket.path = PathBuf::from(&args.socket);
    config.http.port = args.http_port;
    config.http.enabled = !args.no_http;
    config.orchestrator.agents = resolve_orchestrator_agents(args.orchestrator_agents.as_deref());
    config.orchestrator.router = resolve_orchestrator_router(args.orchestrator_router.as_deref());
    if args.verbose {
        config.log_level = "debug".to_string();
    }

    env::set_hub_env(&config);
    let base_url = config.base_url();

    let server = HubServer::new(config.clone());
    server.register_handlers();
    if let Err(err) = server.init_agents(&base_url).await {
        error!(error = %err, "failed to initialize agents");
        return 1;
    }
    if let Err(err) = server.load_state().await {
        error!(error = %err, "failed to load state");
        return 1;
    }
    if let Err(err) = server.write_pid() {
        warn!(error = %err, "failed to write pid file");
    }
    server.start_health_checks(HEALTH_SWEEP_INTERVAL);

    let shutdown = server.shutdown_token();
    let mut transport_handles = Vec::new();
    if config.socket.enabled {
        let transport = UnixTransport::new(
            config.socket.path.clone(),
            server.dispatcher.clone(),
            shutdown.clone(),
        );
        transport_handles.push(tokio::spawn(async move {
            if let Err(err) = transport.run().await {
                error!(error = %err, "unix transport error");
            }
        }));
    }
    if config.http.enabled {
        let transport = HttpTransport::new(
            server.state.clone(),
            server.dispatcher.clone(),
            shutdown.clone(),
        );
        transport_handles.push(tokio::spawn(async move {
            if let Err(err) = transport.run().await {
                error!(error = %err, "http transport error");
            }
        }));
    }

    info!(version = env!("CARGO_PKG_VERSION"), "hub started");
    wait_for_shutdown_signal().await;

    server.shutdown().await;
    for handle in transport_handles {
        let _ = handle.await;
    }
    info!("hub stopped");
    0
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received interrupt, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_disables_orchestration() {
        assert!(resolve_orchestrator_agents(Some("none")).is_empty());
        assert!(resolve_orchestrator_router(Some("NONE")).is_none());
    }

    #[test]
    fn csv_flag_is_split_and_trimmed() {
        let agents = resolve_orchestrator_agents(Some("claude-code, gemini ,,codex"));
        assert_eq!(agents, vec!["claude-code", "gemini", "codex"]);
    }

    #[test]
    fn router_flag_is_trimmed() {
        assert_eq!(
            resolve_orchestrator_router(Some("  vibe  ")),
            Some("vibe".to_string())
        );
    }
}
