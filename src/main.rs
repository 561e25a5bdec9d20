use clap::Parser;
use peerctl::config::{self, Config};
use peerctl::control::PeerControl;
use peerctl::network::blacklist::Blacklist;
use peerctl::network::connection_manager::ConnectionManager;
use peerctl::network::peer_status::PeerStatus;
use peerctl::peer_manager::PeerManager;
use peerctl::rpc::handler::RpcHandler;
use peerctl::rpc::server::RpcServer;
use peerctl::shutdown::ShutdownManager;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "peerctld")]
#[command(about = "Trusted peer and blacklist control daemon", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override rpc.listen_address
    #[arg(long)]
    listen_addr: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        let config = Config::default();
        match config.save_to_file(&args.config) {
            Ok(_) => {
                println!("✅ Generated default config at: {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("❌ Failed to generate config: {}", e);
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load_or_create(&args.config) {
        Ok(cfg) => {
            println!("✓ Loaded configuration from {}", args.config);
            cfg
        }
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let data_dir = config.node.data_dir();
    let _log_guard = match setup_logging(&config.logging, &data_dir, args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    tracing::info!("🚀 peerctld v{} ({}) node={}", version, git_hash, config.node.name);

    let store = Arc::new(PeerStatus::new());
    let connections = Arc::new(ConnectionManager::new(store.clone()));
    let peers = PeerManager::new(store.clone(), connections.clone())
        .with_disconnect_timeout(config.network.disconnect_timeout());
    let blacklist = Arc::new(Blacklist::with_entries(
        config.network.blacklisted_ips.clone(),
        config.network.blacklisted_ids.clone(),
    ));
    let control = Arc::new(PeerControl::new(peers, blacklist.clone()));

    let seeded = control.seed_trusted(&config.network.trusted_peers);
    let (banned_ips, banned_ids) = blacklist.stats();
    tracing::info!(
        "✓ Seeded {} trusted peer(s), {} banned IP(s), {} banned id(s)",
        seeded,
        banned_ips,
        banned_ids
    );

    let mut shutdown_manager = ShutdownManager::new();

    if config.rpc.enabled {
        let rpc_addr = args
            .listen_addr
            .clone()
            .unwrap_or_else(|| config.rpc.listen_address.clone());
        let handler = Arc::new(RpcHandler::new(control.clone()));

        let server = match RpcServer::bind(&rpc_addr, handler).await {
            Ok(server) => server,
            Err(e) => {
                tracing::error!("❌ Failed to start RPC server on {}: {}", rpc_addr, e);
                std::process::exit(1);
            }
        };

        let rpc_shutdown_token = shutdown_manager.token();
        let rpc_handle = tokio::spawn(async move {
            if let Err(e) = server.run(rpc_shutdown_token).await {
                tracing::error!("❌ RPC server error: {}", e);
            }
        });
        shutdown_manager.register_task(rpc_handle);
    } else {
        tracing::warn!("⚠️  RPC disabled; trusted peers and blacklist are fixed at their seeds");
    }

    println!("\nPress Ctrl+C to stop\n");
    shutdown_manager.wait_for_shutdown().await;
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process when logging to a file.
fn setup_logging(
    config: &config::LoggingConfig,
    data_dir: &std::path::Path,
    verbose: bool,
) -> Result<Option<WorkerGuard>, std::io::Error> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "trace" } else { &config.level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.output == "file" {
        let path = config.file_path(data_dir);
        let dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| data_dir.to_path_buf());
        std::fs::create_dir_all(&dir)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "peerctld.log".to_string());

        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        if config.format == "json" {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        } else {
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_timer(CustomTimer {
                    hostname: short_hostname(),
                })
                .with_writer(writer)
                .compact()
                .init();
        }
        return Ok(Some(guard));
    }

    // Detect if running under systemd/journald
    let is_systemd =
        std::env::var("JOURNAL_STREAM").is_ok() || std::env::var("INVOCATION_ID").is_ok();

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_thread_ids(false)
                .init();
        }
        _ if is_systemd => {
            // journald stamps time and host itself
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .without_time()
                .compact()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_timer(CustomTimer {
                    hostname: short_hostname(),
                })
                .compact()
                .init();
        }
    }
    Ok(None)
}

fn short_hostname() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    hostname.split('.').next().unwrap_or(&hostname).to_string()
}

// "YYYY-MM-DD HH:MM:SS.mmm [host]" in UTC
struct CustomTimer {
    hostname: String,
}

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(
            w,
            "{}.{:03} [{}]",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp_subsec_millis(),
            self.hostname
        )
    }
}
