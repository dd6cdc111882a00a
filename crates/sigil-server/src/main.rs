use std::io::{self, BufRead};

use clap::{Parser, Subcommand};
use sigil_auth::RevocationStore;
use sigil_auth::password::hash_password;
use sigil_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use sigil_server::{SigilServer, Storage};

#[derive(Debug, Parser)]
#[command(name = "sigil-server", version, about = "JWT token server")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "SIGIL_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Delete outstanding and blacklisted tokens past their expiry
    FlushExpiredTokens,
    /// Print an Argon2 hash for a password read from stdin
    HashPassword,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    sigil_server::observability::init_tracing();

    let cli = Cli::parse();

    if let Some(Command::HashPassword) = cli.command {
        if let Err(e) = print_password_hash() {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %cli.config, "Configuration loaded");
    sigil_server::observability::apply_logging_level(&cfg.logging.level);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => match SigilServer::build(&cfg).await {
            Ok(server) => server.run().await,
            Err(e) => {
                eprintln!("Server initialization failed: {e:#}");
                std::process::exit(2);
            }
        },
        Command::FlushExpiredTokens => flush_expired_tokens(&cfg.storage).await,
        Command::HashPassword => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn flush_expired_tokens(cfg: &sigil_server::config::StorageConfig) -> anyhow::Result<()> {
    let storage = Storage::open(cfg).await?;
    let removed = storage
        .revocation_store()
        .flush_expired(time::OffsetDateTime::now_utc())
        .await?;
    println!("Removed {removed} expired token(s)");
    Ok(())
}

fn print_password_hash() -> anyhow::Result<()> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    anyhow::ensure!(!password.is_empty(), "empty password");
    println!("{}", hash_password(password)?);
    Ok(())
}
