//! GitDB CLI
//!
//! Administrative commands for a GitDB store. Records are handled as raw
//! JSON, so no model types are needed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gitdb::{Address, Config, GitBinary, PushTarget, Store, User};
use tracing_subscriber::{fmt, EnvFilter};

/// GitDB CLI
#[derive(Parser, Debug)]
#[command(name = "gitdb-cli")]
#[command(about = "Administer a git-backed document store")]
#[command(version)]
struct Args {
    /// Store root directory
    #[arg(short, long, default_value = "./gitdb_data")]
    db_path: PathBuf,

    /// Shared remote URL
    #[arg(long)]
    online_remote: Option<String>,

    /// Local-only remote URL (defaults to the online remote)
    #[arg(long)]
    offline_remote: Option<String>,

    /// Remote(s) pushed to after writes: online, offline, both, never
    #[arg(long, default_value = "online", value_parser = parse_push_target)]
    push: PushTarget,

    /// Commit author name
    #[arg(long, default_value = "GitDB")]
    user_name: String,

    /// Commit author email
    #[arg(long, default_value = "gitdb@localhost")]
    user_email: String,

    /// Seconds before a git command is killed (0 disables)
    #[arg(long, default_value = "60")]
    git_timeout: u64,

    /// Log verbosity (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store (repository, remotes, indexes)
    Init,

    /// Split a record id into dataset, block and record id
    ParseId {
        id: String,
    },

    /// Print one record
    Get {
        /// Full record address (Dataset/Block/RecordId)
        id: String,
    },

    /// Print every record of a dataset
    Fetch {
        dataset: String,
    },

    /// List datasets
    Datasets,

    /// Delete a record
    Del {
        id: String,

        /// Fail if the record does not exist
        #[arg(long)]
        must_exist: bool,
    },

    /// Rebuild all indexes
    Reindex,

    /// Pull, then push
    Sync,

    /// Show sync health
    Status,
}

fn parse_push_target(value: &str) -> Result<PushTarget, String> {
    match value {
        "online" => Ok(PushTarget::Online),
        "offline" => Ok(PushTarget::Offline),
        "both" => Ok(PushTarget::Both),
        "never" => Ok(PushTarget::Never),
        other => Err(format!("unknown push target: {}", other)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string().to_lowercase()));

    fmt().with_env_filter(filter).with_target(true).init();

    // ParseId needs no store
    if let Commands::ParseId { id } = &args.command {
        return match Address::parse(id) {
            Ok(address) => {
                println!("dataset: {}", address.dataset());
                println!("block:   {}", address.block());
                println!("record:  {}", address.record_id());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let timeout = (args.git_timeout > 0).then(|| Duration::from_secs(args.git_timeout));
    let mut builder = Config::builder()
        .db_path(&args.db_path)
        .push_target(args.push)
        .driver(Arc::new(GitBinary::new().with_timeout(timeout)))
        .user(User::new(&args.user_name, &args.user_email))
        .log_level(args.log_level);
    if let Some(url) = &args.online_remote {
        builder = builder.online_remote(url);
    }
    if let Some(url) = &args.offline_remote {
        builder = builder.offline_remote(url);
    }

    let store = match Store::open(builder.build()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&store, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(store: &Store, command: Commands) -> gitdb::Result<()> {
    match command {
        Commands::Init => {
            println!("store ready at {}", store.data_dir().display());
        }
        Commands::ParseId { .. } => {}
        Commands::Get { id } => {
            print_json(&store.get_raw(&id)?)?;
        }
        Commands::Fetch { dataset } => {
            for (id, record) in store.fetch_raw(&dataset)? {
                println!("{}", id);
                print_json(&record)?;
            }
        }
        Commands::Datasets => {
            for dataset in store.datasets()? {
                println!("{}", dataset);
            }
        }
        Commands::Del { id, must_exist } => {
            let deleted = if must_exist {
                store.delete_or_fail(&id)?
            } else {
                store.delete(&id)?
            };
            println!("deleted: {}", deleted);
            println!("commit:  {:?}", store.last_commit_state());
        }
        Commands::Reindex => {
            store.build_index()?;
            println!("indexes rebuilt");
        }
        Commands::Sync => {
            store.sync()?;
            println!("synced");
        }
        Commands::Status => {
            let health = store.sync_health();
            println!("degraded:        {}", health.degraded);
            println!("pull failures:   {}", health.pull_failures);
            println!("push failures:   {}", health.push_failures);
            println!("commit failures: {}", health.commit_failures);
            if let Some(error) = health.last_error {
                println!("last error:      {}", error);
            }
        }
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> gitdb::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| gitdb::GitDbError::Parse(e.to_string()))?;
    println!("{}", text);
    Ok(())
}
