//! Smaragda CLI — a thin demonstration of the library surface.
//!
//! Not a core concern: this binary exists so the kernel's contracts can
//! be exercised end-to-end, the same way a library ships a small command
//! line tool alongside its public API.
//!
//! Usage:
//!   smaragda list [genus]            - list res, optionally filtered by genus name
//!   smaragda create <genus> <name>   - create an entity res with a `name` attribute
//!   smaragda get <id>                - show a res's materialized state
//!   smaragda sync                    - pull then push against the configured peer
//!   smaragda pull                    - pull only
//!   smaragda push                    - push only
//!
//! Exit codes: 0 on success, 1 on missing auth, 2 on protocol error.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use smaragda::config::Config;
use smaragda::prelude::*;
use smaragda::query::Filter;

#[derive(Parser)]
#[command(name = "smaragda")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Database directory (default: $SMARAGDA_DB_PATH or ~/.smaragda/db)
    #[arg(short, long, global = true)]
    db_path: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List res, optionally filtered by genus display name.
    List {
        /// Genus display name to filter by
        genus: Option<String>,
    },
    /// Create an entity res of `genus` with its `name` attribute set.
    Create {
        /// Genus display name
        genus: String,
        /// Value for the `name` attribute
        name: String,
    },
    /// Show a res's materialized state.
    Get {
        /// Res id
        id: String,
    },
    /// Pull then push against the configured sync peer.
    Sync,
    /// Pull only.
    Pull,
    /// Push only.
    Push,
}

#[tokio::main]
async fn main() -> Result<()> {
    smaragda::init_logging();
    let cli = Cli::parse();
    let config = match cli.db_path {
        Some(path) => Config::from_env_with_db_path(path),
        None => Config::from_env(),
    };

    let kernel = Smaragda::open(&config.db_path)
        .await
        .context("failed to open database")?;

    match cli.command {
        Commands::List { genus } => {
            let genus_id = match genus {
                Some(name) => {
                    let Some(id) = kernel.registry().find_genus_by_name(&name, None) else {
                        eprintln!("genus '{name}' not found");
                        std::process::exit(2);
                    };
                    Some(id)
                }
                None => None,
            };
            let items = kernel
                .query()
                .list_entities(genus_id, kernel.main_branch(), None::<&Filter>, true)
                .context("list failed")?;
            println!("{}", serde_json::to_string_pretty(&items)?);
            Ok(())
        }

        Commands::Create { genus, name } => {
            let Some(genus_id) = kernel.registry().find_genus_by_name(&genus, None) else {
                eprintln!("genus '{genus}' not found");
                std::process::exit(2);
            };
            let (res_id, state) = kernel
                .mutator()
                .create_entity(
                    genus_id,
                    kernel.main_branch(),
                    vec![("name".to_string(), AttributeValue::Text(name))],
                    None,
                    None,
                )
                .await
                .context("create failed")?;
            println!("created {res_id}");
            println!("{}", serde_json::to_string_pretty(&state.attributes)?);
            Ok(())
        }

        Commands::Get { id } => {
            let Ok(res_id) = id.parse::<Id>() else {
                eprintln!("invalid res id: {id}");
                std::process::exit(2);
            };
            match kernel.branches().materialize_chain(kernel.store(), res_id, kernel.main_branch()) {
                Ok(state) => {
                    println!("status: {:?}", state.status);
                    println!("{}", serde_json::to_string_pretty(&state.attributes)?);
                    Ok(())
                }
                Err(SmaragdaError::NotFound { .. }) => {
                    eprintln!("res not found: {id}");
                    std::process::exit(2);
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Sync => run_sync(&kernel, &config, true, true).await,
        Commands::Pull => run_sync(&kernel, &config, true, false).await,
        Commands::Push => run_sync(&kernel, &config, false, true).await,
    }
}

async fn run_sync(kernel: &Smaragda, config: &Config, pull: bool, push: bool) -> Result<()> {
    #[cfg(feature = "http")]
    {
        let Some(server_url) = &config.server_url else {
            eprintln!("SMARAGDA_SERVER_URL is not set");
            std::process::exit(1);
        };
        let Some(auth_token) = &config.auth_token else {
            eprintln!("SMARAGDA_AUTH_TOKEN is not set");
            std::process::exit(1);
        };
        let transport = HttpTransport::new(server_url.clone(), auth_token.clone());

        if pull {
            match kernel.sync().pull(&transport).await {
                Ok(n) => println!("pulled {n} tessellae"),
                Err(SmaragdaError::AuthError(_)) => {
                    eprintln!("authentication rejected by peer");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("pull failed: {e}");
                    std::process::exit(2);
                }
            }
        }
        if push {
            match kernel.sync().push(&transport).await {
                Ok(n) => println!("pushed {n} tessellae"),
                Err(SmaragdaError::AuthError(_)) => {
                    eprintln!("authentication rejected by peer");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("push failed: {e}");
                    std::process::exit(2);
                }
            }
        }
        Ok(())
    }
    #[cfg(not(feature = "http"))]
    {
        let _ = (kernel, config, pull, push);
        eprintln!("this binary was built without the 'http' feature");
        std::process::exit(2);
    }
}
