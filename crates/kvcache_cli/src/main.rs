//! kvcache master
//!
//! Runs the metadata and placement authority of a kvcache cluster: the RPC
//! server, and optionally the reaper and the node handshake daemon.

mod serve;

use clap::Parser;
use kvcache_master::{ConflictPolicy, MasterConfig, UnmountPolicy};
use kvcache_rpc::DEFAULT_PORT;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// kvcache master server.
#[derive(Parser, Debug)]
#[command(name = "kvcache-master")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// RPC listen port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// RPC listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Worker thread cap, clamped to the available parallelism
    #[arg(long, default_value_t = 4)]
    max_threads: usize,

    /// Run the reaper
    #[arg(long)]
    enable_gc: bool,

    /// Reaper period in milliseconds
    #[arg(long, default_value_t = 1000)]
    gc_interval_ms: u64,

    /// Put lease TTL in milliseconds
    #[arg(long, default_value_t = 30_000)]
    put_lease_ms: u64,

    /// Treat nodes silent for this many milliseconds as unreachable
    #[arg(long)]
    node_ttl_ms: Option<u64>,

    /// What a put does to a key holding a complete object (reject, replace)
    #[arg(long, default_value_t = ConflictPolicy::Reject)]
    conflict_policy: ConflictPolicy,

    /// What unmount does to a segment holding replicas (drain, force)
    #[arg(long, default_value_t = UnmountPolicy::Drain)]
    unmount_policy: UnmountPolicy,

    /// Object table lock stripes
    #[arg(long, default_value_t = 64)]
    object_shards: usize,

    /// Metadata store connection string (memory://, file:///dir)
    #[arg(long)]
    metadata: Option<String>,

    /// Handshake connection string (tcp://, tcp://host, loopback://)
    #[arg(long)]
    handshake: Option<String>,

    /// Handshake daemon port (default: RPC port + 1)
    #[arg(long)]
    handshake_port: Option<u16>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    fn handshake_port(&self) -> u16 {
        self.handshake_port
            .unwrap_or_else(|| self.port.saturating_add(1))
    }

    fn worker_threads(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_threads.clamp(1, available)
    }

    fn master_config(&self) -> MasterConfig {
        MasterConfig::new()
            .enable_gc(self.enable_gc)
            .gc_interval(Duration::from_millis(self.gc_interval_ms.max(1)))
            .put_lease_ttl(Duration::from_millis(self.put_lease_ms))
            .node_ttl(self.node_ttl_ms.map(Duration::from_millis))
            .conflict_policy(self.conflict_policy)
            .unmount_policy(self.unmount_policy)
            .object_shards(self.object_shards)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.worker_threads())
        .thread_name("kvcache-master")
        .enable_all()
        .build()?;
    runtime.block_on(serve::run(&cli))
}
