//! keelson node daemon.
//!
//! Usage:
//!   keelson [OPTIONS] <DIR>
//!
//! Startup order matters: the SQLite threading mode is configured before
//! anything else, then the node identity is loaded from `<DIR>`, the local
//! engine is created (and bootstrapped when no `--join` address is given),
//! the listener is bound and the server started. With `--join` the node
//! then adds itself to the cluster through the given addresses.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use keelson_core::{ServerStore, TcpNodeListener, YamlServerStore};
use keelson_node::logging::{init_tracing, tracing_log_fn};
use keelson_node::{config, threading, LocalEngine, Server, ServerOptions};
use keelson_proto::constants::KS_LISTEN_PORT;
use keelson_proto::defaults::DEFAULT_JOIN_TIMEOUT;
use keelson_proto::{NodeState, ServerInfo};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// keelson cluster node
#[derive(Parser, Debug)]
#[command(name = "keelson", version, about = "keelson cluster node")]
struct Args {
    /// Data directory (node identity, cluster list, database files)
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Address to listen on and advertise to the cluster
    #[arg(short = 'a', long, default_value_t = format!("127.0.0.1:{}", KS_LISTEN_PORT))]
    address: String,

    /// Node id (generated on first start when omitted)
    #[arg(long)]
    id: Option<u64>,

    /// Address of an existing cluster member to join through.
    /// Can be specified multiple times.
    #[arg(short = 'j', long = "join", value_name = "HOST:PORT")]
    join: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Put SQLite in multi-thread mode instead of single-thread
    #[arg(long)]
    multi_thread: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_tracing(&args.log_level);

    // Must run before any engine touches SQLite.
    let threading = if args.multi_thread {
        threading::config_multi_thread()
    } else {
        threading::init()
    };
    if let Err(e) = threading {
        error!("failed to configure SQLite threading mode: {}", e);
        std::process::exit(1);
    }

    info!("keelson v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = tokio::fs::create_dir_all(&args.dir).await {
        error!("failed to create data directory {}: {}", args.dir.display(), e);
        std::process::exit(1);
    }

    let info = match config::load_or_create_info(&args.dir, args.id, &args.address).await {
        Ok(info) => info,
        Err(e) => {
            error!("failed to load node identity: {}", e);
            std::process::exit(1);
        }
    };

    let store = match YamlServerStore::open(args.dir.join("cluster.yaml")).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open cluster list: {}", e);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(LocalEngine::new(info.clone(), args.dir.clone()));
    if args.join.is_empty() {
        if let Err(e) = engine.bootstrap().await {
            error!("failed to bootstrap cluster: {}", e);
            std::process::exit(1);
        }
    }

    let options = ServerOptions::new()
        .with_log_fn(tracing_log_fn())
        .with_watch_fn(Arc::new(|old: NodeState, new: NodeState| {
            info!("node state: {} -> {}", old, new)
        }));
    let mut server = Server::new(info.clone(), engine, options);

    let listener = match TcpNodeListener::bind(&info.address).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to listen on {}: {}", info.address, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = server.start(Arc::new(listener)) {
        error!("failed to start server: {}", e);
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();

    if !args.join.is_empty() {
        let seeds: Vec<ServerInfo> = args
            .join
            .iter()
            .map(|address| ServerInfo::new(0, address.as_str()))
            .collect();
        if let Err(e) = store.set(seeds).await {
            error!("failed to save cluster list: {}", e);
            std::process::exit(1);
        }

        let join = server.join(store.clone(), None, &cancel);
        match tokio::time::timeout(DEFAULT_JOIN_TIMEOUT, join).await {
            Ok(Ok(())) => info!("joined cluster through {}", args.join.join(", ")),
            Ok(Err(e)) => {
                error!("failed to join cluster: {}", e);
                std::process::exit(1);
            }
            Err(_) => {
                error!("failed to join cluster within {:?}", DEFAULT_JOIN_TIMEOUT);
                std::process::exit(1);
            }
        }
    }

    info!("keelson {} ready", info);

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to wait for Ctrl-C: {}", e);
    }
    info!("shutting down");
    cancel.cancel();

    // Remember the last known membership for the next start.
    match server.cluster().await {
        Ok(members) if !members.is_empty() => {
            if let Err(e) = store.set(members).await {
                warn!("failed to save cluster list: {}", e);
            }
        }
        Ok(_) => {}
        Err(e) => warn!("failed to read cluster membership: {}", e),
    }

    if let Err(e) = server.close().await {
        error!("failed to stop cleanly: {}", e);
        std::process::exit(1);
    }
    info!("keelson stopped");
}
