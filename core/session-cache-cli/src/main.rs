//! validator-sessions: operator CLI for the validator session cache.
//!
//! Reads and writes the same SQLite database the test-execution engine uses,
//! for inspecting cached sessions or seeding one by hand.
//!
//! ## Subcommands
//!
//! - `key`: Print the canonical key of a context (no database access)
//! - `lookup`: Print the cached session id; exit 2 when there is none
//! - `record`: Record a session id for a context
//! - `list`: Print every stored session as JSON lines
//! - `count`: Print the number of stored sessions

mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use validator_session_cache::{
    canonicalize, load_config, CacheError, InsertOutcome, ResolveOutcome, SessionResolver,
    SessionStore, ValidationContext,
};

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOT_FOUND: i32 = 2;

#[derive(Parser)]
#[command(name = "validator-sessions")]
#[command(about = "Inspect and seed the validator session cache")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/validator-session-cache/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database file; overrides the config file and environment
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical key for a validation context
    Key(ContextArgs),

    /// Print the cached validator session id for a context
    Lookup(ContextArgs),

    /// Record a validator session id for a context
    Record {
        #[command(flatten)]
        context: ContextArgs,

        /// External validator session id
        #[arg(long, value_name = "ID")]
        session_id: String,

        /// Keep an existing session instead of replacing it
        #[arg(long)]
        if_absent: bool,
    },

    /// Print every stored session as one JSON object per line
    List,

    /// Print the number of stored sessions
    Count,
}

#[derive(Args)]
struct ContextArgs {
    /// Test suite id
    #[arg(long = "suite", value_name = "ID")]
    test_suite_id: String,

    /// Validator name
    #[arg(long = "validator", value_name = "NAME")]
    validator_name: String,

    /// Suite option, repeatable
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, String)>,
}

impl ContextArgs {
    fn into_context(self) -> ValidationContext {
        ValidationContext::new(
            self.test_suite_id,
            self.validator_name,
            self.options.into_iter().collect(),
        )
    }
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    let logging_guard = logging::init();
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "validator-sessions failed");
            EXIT_ERROR
        }
    };

    drop(logging_guard);
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, CacheError> {
    match cli.command {
        Commands::Key(context) => {
            let key = canonicalize(&context.into_context())?;
            println!("{key}");
            Ok(EXIT_OK)
        }
        Commands::Lookup(context) => {
            let resolver = open_resolver(cli.config, cli.db)?;
            match resolver.resolve_or_prepare(&context.into_context())? {
                ResolveOutcome::Found(id) => {
                    println!("{id}");
                    Ok(EXIT_OK)
                }
                ResolveOutcome::NotFound => Ok(EXIT_NOT_FOUND),
            }
        }
        Commands::Record {
            context,
            session_id,
            if_absent,
        } => {
            let resolver = open_resolver(cli.config, cli.db)?;
            let ctx = context.into_context();
            if if_absent {
                let outcome = resolver.record_new_session_if_absent(&ctx, &session_id)?;
                if let InsertOutcome::Existing(_) = outcome {
                    tracing::info!("Context already had a session; kept it");
                }
                println!("{}", outcome.retained_id(&session_id));
            } else {
                resolver.record_new_session(&ctx, &session_id)?;
            }
            Ok(EXIT_OK)
        }
        Commands::List => {
            let resolver = open_resolver(cli.config, cli.db)?;
            for session in resolver.store().list()? {
                match serde_json::to_string(&session) {
                    Ok(line) => println!("{line}"),
                    Err(err) => {
                        tracing::warn!(
                            canonical_key = %session.canonical_key,
                            error = %err,
                            "Failed to serialize stored session"
                        );
                    }
                }
            }
            Ok(EXIT_OK)
        }
        Commands::Count => {
            let resolver = open_resolver(cli.config, cli.db)?;
            println!("{}", resolver.store().count()?);
            Ok(EXIT_OK)
        }
    }
}

fn open_resolver(
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
) -> Result<SessionResolver, CacheError> {
    let mut config = load_config(config_path)?;
    if let Some(path) = db_path {
        config.store.path = Some(path);
    }
    let store = SessionStore::open(&config.store)?;
    Ok(SessionResolver::new(store))
}
