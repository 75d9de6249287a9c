//! Server startup and shutdown.

use crate::Cli;
use kvcache_master::{MasterService, NodeDirectory, Reaper};
use kvcache_plugin::connect;
use kvcache_rpc::{MasterServer, ServerConfig};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the master until interrupted or until the RPC listener fails.
pub(crate) async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.master_config();
    let store = cli
        .metadata
        .as_deref()
        .map(connect::metadata_store)
        .transpose()?;
    let service = Arc::new(match &store {
        Some(store) => MasterService::with_metadata_store(config, Arc::clone(store)),
        None => MasterService::new(config),
    });

    let rpc_addr = cli.rpc_addr();
    let server = MasterServer::bind(ServerConfig::new(rpc_addr), Arc::clone(&service))
        .await
        .map_err(|e| format!("failed to bind RPC listener on {rpc_addr}: {e}"))?;
    let local_addr = server.local_addr()?;

    let mut directory = NodeDirectory::new(
        Arc::clone(&service),
        json!({
            "role": "master",
            "rpc_addr": local_addr.to_string(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );
    if let Some(store) = &store {
        directory = directory.with_store(Arc::clone(store));
    }
    let directory = Arc::new(directory);

    let handshake = match cli.handshake.as_deref() {
        Some(conn) => {
            let plugin = connect::handshake(conn)?;
            let addr = plugin
                .start_daemon(directory.on_receive(), cli.handshake_port())
                .await?;
            info!("handshake daemon on {}", addr);
            Some(plugin)
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    let reaper = service.config().enable_gc.then(|| {
        Reaper::new(Arc::clone(&service))
            .with_directory(Arc::clone(&directory))
            .spawn(cancel.clone())
    });

    info!(
        "kvcache master v{} serving on {}",
        env!("CARGO_PKG_VERSION"),
        local_addr
    );
    let mut server_task = tokio::spawn(server.serve(cancel.clone()));

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupt received, shutting down");
            None
        }
        result = &mut server_task => Some(result),
    };

    cancel.cancel();
    if let Some(plugin) = handshake {
        plugin.shutdown();
    }
    if let Some(reaper) = reaper {
        reaper.await?;
    }
    let result = match finished {
        Some(result) => result,
        None => server_task.await,
    };
    result??;

    let stats = service.stats();
    info!(
        "stopped after {} puts, {} lookups, {} errors",
        stats.puts_started, stats.replica_lookups, stats.errors
    );
    Ok(())
}
