use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use studyhall_core::config::Config;
use studyhall_core::core_room::storage::sql_store;
use studyhall_core::core_room::{RoomSqlStore, Timestamp, CURRENT_ROOM_SCHEMA_VERSION};
use studyhall_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "studyhall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (falls back to env vars, then defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a config file populated with the defaults
    InitConfig {
        /// Where to write it
        #[arg(default_value = "studyhall.toml")]
        path: PathBuf,
    },

    /// Create the database or bring its schema up to date
    Migrate,

    /// List active rooms
    Rooms,

    /// Show one room, looked up by its join code
    Inspect {
        /// The room's join code
        code: String,
    },

    /// Mark overdue pending invitations as expired
    PruneInvites,
}

fn open_store(config: &Config) -> Result<RoomSqlStore> {
    let store = RoomSqlStore::open(
        &config.store.db_path,
        config.store.max_connections,
        config.store.busy_timeout,
    )
    .with_context(|| format!("opening store at {}", config.store.db_path.display()))?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Parse log level
    let log_level = LogLevel::parse(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });

    // Initialize logging
    let log_config = LogConfig::new(log_level).json_format(args.json_logs);
    init_logging_with_config(log_config)?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("loading config from environment")?,
    };
    config.validate().context("invalid configuration")?;

    match args.command {
        Some(Command::InitConfig { path }) => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
        }
        Some(Command::Migrate) => {
            let _store = open_store(&config)?;
            info!(
                db = %config.store.db_path.display(),
                version = CURRENT_ROOM_SCHEMA_VERSION,
                "schema ready"
            );
            println!(
                "Schema at version {} in {}",
                CURRENT_ROOM_SCHEMA_VERSION,
                config.store.db_path.display()
            );
        }
        Some(Command::Rooms) => {
            let store = open_store(&config)?;
            let rooms = store.read(sql_store::list_active_rooms)?;
            if rooms.is_empty() {
                println!("No active rooms");
            }
            for room in rooms {
                println!(
                    "{}  {:<8}  {:>4} members  {}",
                    room.code,
                    room.visibility.as_str(),
                    room.current_members,
                    room.name
                );
            }
        }
        Some(Command::Inspect { code }) => {
            let store = open_store(&config)?;
            // Codes are stored uppercase
            let code = code.to_uppercase();
            let Some(room) = store.read(|conn| sql_store::find_room_by_code(conn, &code))? else {
                bail!("no room with code {code}");
            };
            let members = store.read(|conn| sql_store::list_memberships(conn, &room.id))?;
            let requests = store.read(|conn| sql_store::list_pending_requests(conn, &room.id))?;
            let log = store.read(|conn| sql_store::list_log_entries(conn, &room.id))?;

            println!("{} ({})", room.name, room.code);
            if let Some(description) = &room.description {
                println!("  {description}");
            }
            println!("  visibility: {}", room.visibility.as_str());
            println!("  active: {}", room.is_active);
            println!("  members: {}", room.current_members);
            for membership in &members {
                println!("    {:<9} {}", membership.role.as_str(), membership.user_id);
            }
            if !requests.is_empty() {
                println!("  pending access requests: {}", requests.len());
            }
            if !log.is_empty() {
                println!("  moderation history:");
                for entry in &log {
                    println!(
                        "    {:<8} {} -> {}",
                        entry.action.as_str(),
                        entry.moderator_id,
                        entry.target_user_id
                    );
                }
            }
        }
        Some(Command::PruneInvites) => {
            let store = open_store(&config)?;
            let pruned = store
                .transaction(|tx| sql_store::prune_expired_invitations(tx, Timestamp::now()))?;
            info!(pruned, "marked overdue invitations expired");
            println!("Expired {pruned} overdue invitation(s)");
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}
