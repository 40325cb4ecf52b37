use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "guildwatch",
    about = "Raid watchdog for chat guilds",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (ingest server + detectors + snapshot sweep)
    Serve {
        /// Config file path
        #[arg(long, default_value = "guildwatch.toml")]
        config: PathBuf,

        /// Bind address for the ingest API
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// SQLite database path
        #[arg(long, default_value = "data/guildwatch.db")]
        db: String,
    },

    /// Print the stored channel snapshot for a guild
    Snapshots {
        /// Guild id
        #[arg(long)]
        guild: String,

        /// SQLite database path
        #[arg(long, default_value = "data/guildwatch.db")]
        db: String,
    },

    /// List recent raid incidents
    Incidents {
        /// SQLite database path
        #[arg(long, default_value = "data/guildwatch.db")]
        db: String,

        /// Maximum rows to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, bind, db } => {
            tracing::info!(%bind, "Starting guildwatch daemon");
            guildwatch::serve(&config, &bind, &db).await?;
        }
        Commands::Snapshots { guild, db } => {
            let pool = guildwatch::storage::open_pool(&db)?;
            let store = guildwatch::storage::SnapshotStore::new(pool);
            let key = guildwatch::storage::guild_backup_key(&guild);
            match store.get::<guildwatch::backup::GuildChannelSnapshot>(&key)? {
                None => println!("No snapshot stored for guild {}.", guild),
                Some(snap) => {
                    println!(
                        "Snapshot for guild {} taken at {} ({} channels):",
                        snap.guild_id,
                        snap.taken_at.to_rfc3339(),
                        snap.channels.len()
                    );
                    println!("{:<22} | {:<8} | Name", "Id", "Kind");
                    println!("{:-<22}-|-{:-<8}-|-{:-<30}", "", "", "");
                    for c in &snap.channels {
                        println!("{:<22} | {:<8} | {}", c.id, u16::from(c.kind), c.name);
                    }
                }
            }
        }
        Commands::Incidents { db, limit } => {
            let pool = guildwatch::storage::open_pool(&db)?;
            let log = guildwatch::detect::incident::IncidentLog::new(pool);
            let incidents = log.list_recent(limit)?;
            if incidents.is_empty() {
                println!("No incidents recorded.");
            } else {
                println!("{:<20} | {:<15} | {:<8} | Description", "Time", "Kind", "Actors");
                println!("{:-<20}-|-{:-<15}-|-{:-<8}-|-{:-<40}", "", "", "", "");
                for i in incidents {
                    println!(
                        "{:<20} | {:<15} | {:<8} | {}",
                        i.created_at,
                        i.kind,
                        i.actors.len(),
                        i.description
                    );
                }
            }
        }
    }

    Ok(())
}
