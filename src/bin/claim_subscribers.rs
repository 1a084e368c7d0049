//! Claim Subscribers - manage auto-claim subscriptions
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin claim_subscribers -- opt-in <ADDRESS>
//! cargo run --bin claim_subscribers -- opt-out <ADDRESS>
//! cargo run --bin claim_subscribers -- register <ADDRESS> <EXECUTOR>
//! cargo run --bin claim_subscribers -- list
//! ```
//!
//! ## Environment Variables
//!
//! - `FTSOFLOW_DB_PATH` - SQLite database path (default: ftsoflow.db)
//! - `SCHEMA_DIR` - migration directory (default: sql)
//! - `EXECUTOR_ADDRESS` - executor used by `opt-in`

use dotenv::dotenv;
use env_logger::Env;
use ftsoflow::chain::normalize_address;
use ftsoflow::pipeline::{SqliteStore, SubscriptionService};
use std::env;
use std::sync::Arc;

enum Command {
    OptIn(String),
    OptOut(String),
    Register(String, String),
    List,
}

const USAGE: &str = "usage: claim_subscribers <opt-in ADDRESS | opt-out ADDRESS | register ADDRESS EXECUTOR | list>";

fn parse_command(args: &[String]) -> Result<Command, String> {
    match args {
        [cmd, address] if cmd == "opt-in" => Ok(Command::OptIn(address.clone())),
        [cmd, address] if cmd == "opt-out" => Ok(Command::OptOut(address.clone())),
        [cmd, address, executor] if cmd == "register" => Ok(Command::Register(address.clone(), executor.clone())),
        [cmd] if cmd == "list" => Ok(Command::List),
        _ => Err(USAGE.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let db_path = env::var("FTSOFLOW_DB_PATH").unwrap_or_else(|_| "ftsoflow.db".to_string());
    let schema_dir = env::var("SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string());
    let executor = match env::var("EXECUTOR_ADDRESS") {
        Ok(raw) if !raw.trim().is_empty() => {
            Some(normalize_address(&raw).ok_or_else(|| format!("EXECUTOR_ADDRESS is not an address: {}", raw))?)
        }
        _ => None,
    };

    let store = SqliteStore::open(&db_path, &schema_dir)?;
    let subscriptions = SubscriptionService::new(Arc::new(store), executor);

    match command {
        Command::OptIn(address) => {
            let subscriber = subscriptions.opt_in(&address).await?;
            println!("opted in {} (executor {})", subscriber.address, subscriber.executor);
        }
        Command::OptOut(address) => {
            if subscriptions.opt_out(&address).await? {
                println!("opted out {}", address.to_lowercase());
            } else {
                println!("{} was not subscribed", address.to_lowercase());
            }
        }
        Command::Register(address, executor) => {
            let subscriber = subscriptions.register_address(&address, &executor).await?;
            println!("registered {} (executor {})", subscriber.address, subscriber.executor);
        }
        Command::List => {
            let subscribers = subscriptions.list().await?;
            for subscriber in &subscribers {
                println!("{}  executor={}  since={}", subscriber.address, subscriber.executor, subscriber.created_at);
            }
            println!("{} subscribers", subscribers.len());
        }
    }

    Ok(())
}
