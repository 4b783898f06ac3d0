use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info, warn};
use tokio::net::TcpListener;

use wetalk::api::{self, AppState};
use wetalk::auth::{AuthService, AuthState, RefreshTokenRepository};
use wetalk::chat::{ChatRepository, ChatService};
use wetalk::db::Database;
use wetalk::message::MessageRepository;
use wetalk::user::{UserRepository, UserService};
use wetalk::ws::{Hub, LocalHub, MarkOffline, RedisHub};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Command::Serve(cmd) => run_serve(cmd),
    }
}

#[tokio::main]
async fn run_serve(cmd: ServeCommand) -> Result<()> {
    handle_serve(cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "WeTalk - real-time chat backend server.",
    propagate_version = true
)]
struct Cli {
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP/WebSocket server
    Serve(ServeCommand),
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,
    /// Path to the SQLite database file
    #[arg(long, default_value = "./data/wetalk.db", value_name = "PATH")]
    database: PathBuf,
    /// Redis address; enables distributed mode (falls back to $REDIS_ADDR)
    #[arg(long, value_name = "ADDR")]
    redis_addr: Option<String>,
    /// Unique instance identity (falls back to $SERVER_ID, then "server-1")
    #[arg(long, value_name = "ID")]
    server_id: Option<String>,
    /// HS256 secret for access tokens (falls back to $JWT_SECRET)
    #[arg(long, value_name = "SECRET")]
    jwt_secret: Option<String>,
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if cli.quiet {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wetalk={level},tower_http={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    // Also init env_logger for compatibility with log crate users.
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.try_init().ok();
}

async fn handle_serve(cmd: ServeCommand) -> Result<()> {
    info!("Starting WeTalk backend server...");

    info!("Database path: {}", cmd.database.display());
    let database = Database::new(&cmd.database).await?;

    let user_repo = UserRepository::new(database.pool().clone());
    let chat_repo = ChatRepository::new(database.pool().clone());
    let message_repo = MessageRepository::new(database.pool().clone());

    let users = Arc::new(UserService::new(user_repo.clone()));
    let chats = ChatService::new(chat_repo, user_repo, message_repo.clone());

    let jwt_secret = cmd
        .jwt_secret
        .or_else(|| env::var("JWT_SECRET").ok())
        .unwrap_or_else(|| {
            warn!("Using default JWT secret. Set JWT_SECRET for production");
            "wetalk-dev-secret-change-this-in-production".to_string()
        });
    let auth = AuthState::new(jwt_secret);

    let token_repo = RefreshTokenRepository::new(database.pool().clone());
    let auth_service = AuthService::new(users.clone(), token_repo, auth.clone());

    // Startup cleanup of refresh tokens past their expiry.
    match auth_service.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => info!("Purged {} expired refresh tokens", purged),
        Err(err) => warn!("Refresh token cleanup failed: {:#}", err),
    }

    // Distributed mode is selected by the presence of a Redis address.
    let hook = Arc::new(MarkOffline::new(users.clone()));
    let redis_addr = cmd.redis_addr.or_else(|| env::var("REDIS_ADDR").ok());

    let hub: Arc<dyn Hub> = match redis_addr {
        Some(addr) => {
            let server_id = cmd
                .server_id
                .or_else(|| env::var("SERVER_ID").ok())
                .unwrap_or_else(|| "server-1".to_string());

            info!("Using Redis hub at {} with server ID: {}", addr, server_id);
            Arc::new(
                RedisHub::connect(&addr, server_id, hook)
                    .await
                    .context("connecting Redis hub")?,
            )
        }
        None => {
            info!("Using in-memory hub (single instance)");
            Arc::new(LocalHub::new(hook))
        }
    };

    tokio::spawn(hub.clone().run());
    info!("Hub event loop is running");

    let state = AppState::new(hub, users, chats, message_repo, auth, auth_service);
    let router = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", cmd.host, cmd.port)
        .parse()
        .context("parsing bind address")?;
    info!("HTTP server is running on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    axum::serve(listener, router)
        .await
        .context("serving HTTP")?;

    Ok(())
}
