use std::io;
use std::path::Path;

use tally_config::{AgentConfig, ServerConfig, StorageKind};
use tokio_util::sync::CancellationToken;

fn dump_config_path(path: Option<&Path>) {
    match path {
        Some(path) => tally_log::info!("launching tally from config file {}", path.display()),
        None => tally_log::info!("launching tally without config file"),
    }
}

/// Print agent spawn infos to the log.
pub fn dump_agent_infos(config: &AgentConfig) {
    dump_config_path(config.path());
    tally_log::info!("  upstream: {}", config.upstream());
    tally_log::info!("  send mode: {}", config.send_mode());
    tally_log::info!("  rate limit: {}", config.rate_limit());
    tally_log::info!("  poll interval: {:?}", config.poll_interval());
    tally_log::info!("  report interval: {:?}", config.report_interval());
    tally_log::info!(
        "  signing: {}",
        if config.secret_key().is_some() { "enabled" } else { "disabled" }
    );
}

/// Print server spawn infos to the log.
pub fn dump_server_infos(config: &ServerConfig) {
    dump_config_path(config.path());
    tally_log::info!("  listen address: {}", config.listen_addr());

    match config.storage() {
        StorageKind::Memory => tally_log::info!("  storage: memory"),
        StorageKind::File {
            path,
            store_interval,
            restore,
        } => {
            tally_log::info!("  storage: file {}", path.display());
            tally_log::info!("  store interval: {store_interval:?}");
            tally_log::info!("  restore: {restore}");
        }
        StorageKind::Database { .. } => tally_log::info!("  storage: postgres"),
    }

    if let Some(subnet) = config.trusted_subnet() {
        tally_log::info!("  trusted subnet: {subnet}");
    }
}

/// Cancels `shutdown` on the first interrupt or termination signal.
pub async fn forward_shutdown_signal(shutdown: CancellationToken) -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut quit = signal(SignalKind::quit())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
            _ = quit.recv() => {},
            _ = shutdown.cancelled() => return Ok(()),
        }
    }

    #[cfg(not(unix))]
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = shutdown.cancelled() => return Ok(()),
    }

    tally_log::info!("received shutdown signal");
    shutdown.cancel();
    Ok(())
}
