//! `bpd` entry point: env bootstrap, tracing, subcommand dispatch.

use anyhow::Result;
use bpd_daemon::bootstrap;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bpd")]
#[command(about = "Front/rear reject reconciliation for OPC UA inspection machines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor every configured machine until Ctrl-C / SIGTERM (default)
    Run {
        /// YAML machine profiles; machines are discovered from the environment when omitted
        #[arg(long)]
        config: Option<String>,
    },

    /// Print the discovered machine profiles and their config hash
    Machines {
        #[arg(long)]
        config: Option<String>,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Connectivity check plus existence of every configured table
    Status {
        #[arg(long)]
        config: Option<String>,
    },

    /// Create the per-machine event tables if missing
    Provision {
        #[arg(long)]
        config: Option<String>,

        /// Also create the production identity tables (normally owned by the MES)
        #[arg(long, default_value_t = false)]
        with_identity: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the files do not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd.unwrap_or(Commands::Run { config: None }) {
        Commands::Run { config } => bootstrap::run(config.as_deref()).await?,

        Commands::Machines { config } => {
            let discovery = bootstrap::load_discovery(config.as_deref())?;
            let rejected: Vec<serde_json::Value> = discovery
                .rejected
                .iter()
                .map(|r| serde_json::json!({ "machine": r.machine, "error": r.error.to_string() }))
                .collect();
            let out = serde_json::json!({
                "config_hash": discovery.config_hash(),
                "machines": discovery.profiles,
                "rejected": rejected,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Db { cmd } => {
            let pool = bpd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status { config } => {
                    let discovery = bootstrap::load_discovery(config.as_deref())?;
                    let tables: Vec<String> = discovery
                        .profiles
                        .iter()
                        .flat_map(|p| [p.persist.events_table.clone(), p.persist.identity_table.clone()])
                        .collect();
                    let s = bpd_db::status(&pool, &tables).await?;
                    println!("db_ok={}", s.ok);
                    for t in &s.tables {
                        println!("table={} exists={}", t.table, t.exists);
                    }
                }
                DbCmd::Provision {
                    config,
                    with_identity,
                } => {
                    let discovery = bootstrap::load_discovery(config.as_deref())?;
                    for p in &discovery.profiles {
                        bpd_db::provision_target(&pool, &p.persist).await?;
                        if with_identity {
                            bpd_db::provision_identity_table(&pool, &p.persist).await?;
                        }
                        println!("machine={} table={} provisioned=true", p.name, p.persist.events_table);
                    }
                }
            }
            pool.close().await;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
