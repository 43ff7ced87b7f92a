//! keelson cluster admin tool (keelctl).
//!
//! Talks to the current leader of a running cluster. The leader is found
//! the same way nodes find it: ask each given address who leads, follow the
//! answer, retry with backoff.
//!
//! # Usage
//!
//! ```text
//! keelctl [OPTIONS] <COMMAND>
//!
//! Commands:
//!   cluster   List cluster members
//!   leader    Show the current leader
//!   leave     Remove a server from the cluster
//!
//! Options:
//!   -a, --address <HOST:PORT>  Cluster member address, repeatable [default: 127.0.0.1:9000]
//!   -t, --timeout <SECS>       Give up after this many seconds [default: 10]
//!   -v, --verbose              Enable debug logging
//! ```

mod cluster;
mod common;
mod node;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keelson_proto::constants::KS_LISTEN_PORT;

/// keelson cluster admin tool.
#[derive(Parser)]
#[command(name = "keelctl", version, about = "keelson cluster admin tool")]
struct Cli {
    /// Cluster member address. Can be specified multiple times.
    #[arg(
        short = 'a',
        long = "address",
        value_name = "HOST:PORT",
        default_values_t = [format!("127.0.0.1:{}", KS_LISTEN_PORT)]
    )]
    addresses: Vec<String>,

    /// Give up after this many seconds
    #[arg(short = 't', long, default_value_t = 10)]
    timeout: u64,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cluster members
    Cluster,
    /// Show the current leader
    Leader,
    /// Remove a server from the cluster
    Leave {
        /// ID of the server to remove
        id: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let ctx = common::Context::new(&cli.addresses, cli.timeout);

    match cli.command {
        Commands::Cluster => cluster::list(&ctx).await,
        Commands::Leader => cluster::leader(&ctx).await,
        Commands::Leave { id } => node::leave(&ctx, id).await,
    }
}
