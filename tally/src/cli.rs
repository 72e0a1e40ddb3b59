use std::error::Error;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ArgMatches;
use tally_config::{AgentConfig, AgentOverrides, ServerConfig, ServerOverrides};
use tally_server::HttpServer;
use tokio_util::sync::CancellationToken;

use crate::cliapp::make_app;
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches.get_one::<String>("config").map(Path::new);

    match matches.subcommand() {
        Some(("agent", matches)) => run_agent(config_path, matches),
        Some(("server", matches)) => run_server(config_path, matches),
        Some(("config", matches)) => manage_config(config_path, matches),
        _ => unreachable!(),
    }
}

fn get_string(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn agent_overrides(matches: &ArgMatches) -> AgentOverrides {
    AgentOverrides {
        address: get_string(matches, "address"),
        report_interval: get_string(matches, "report_interval"),
        poll_interval: get_string(matches, "poll_interval"),
        key: get_string(matches, "key"),
        rate_limit: get_string(matches, "rate_limit"),
        mode: get_string(matches, "mode"),
        timeout: get_string(matches, "timeout"),
    }
}

fn server_overrides(matches: &ArgMatches) -> ServerOverrides {
    ServerOverrides {
        address: get_string(matches, "address"),
        store_interval: get_string(matches, "store_interval"),
        file_storage_path: get_string(matches, "file_storage_path"),
        restore: get_string(matches, "restore"),
        database_dsn: get_string(matches, "database_dsn"),
        key: get_string(matches, "key"),
        trusted_subnet: get_string(matches, "trusted_subnet"),
        require_signature: get_string(matches, "require_signature"),
        shutdown_timeout: get_string(matches, "shutdown_timeout"),
    }
}

fn load_agent_config(path: Option<&Path>) -> Result<AgentConfig> {
    match path {
        Some(path) => AgentConfig::from_path(path)
            .with_context(|| format!("failed to load agent config from {}", path.display())),
        None => Ok(AgentConfig::default()),
    }
}

fn load_server_config(path: Option<&Path>) -> Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::from_path(path)
            .with_context(|| format!("failed to load server config from {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

/// Runs the future returned by `f` on a fresh runtime until it completes.
///
/// The future receives a token that is cancelled on the first shutdown signal.
fn block_on_with_shutdown<F, Fut>(f: F) -> Result<()>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("tally")
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(async {
        let shutdown = CancellationToken::new();

        let signals = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if let Err(error) = setup::forward_shutdown_signal(shutdown).await {
                    tally_log::error!(
                        error = &error as &dyn Error,
                        "failed to install signal handlers"
                    );
                }
            }
        });

        let result = f(shutdown.clone()).await;

        shutdown.cancel();
        let _ = signals.await;
        result
    })
}

fn run_agent(config_path: Option<&Path>, matches: &ArgMatches) -> Result<()> {
    let mut config = load_agent_config(config_path)?;
    config.apply_override(agent_overrides(matches))?;

    tally_log::init(config.logging());
    setup::dump_agent_infos(&config);

    block_on_with_shutdown(|shutdown| async move {
        tally_agent::run(&config, shutdown).await?;
        Ok(())
    })
}

fn run_server(config_path: Option<&Path>, matches: &ArgMatches) -> Result<()> {
    let mut config = load_server_config(config_path)?;
    config.apply_override(server_overrides(matches))?;

    tally_log::init(config.logging());
    setup::dump_server_infos(&config);

    let config = Arc::new(config);
    block_on_with_shutdown(|shutdown| async move {
        let server = HttpServer::start(config).await?;
        server.run(shutdown).await?;
        tally_log::info!("server stopped");
        Ok(())
    })
}

fn manage_config(config_path: Option<&Path>, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", matches)) => show_config(config_path, matches),
        _ => unreachable!(),
    }
}

#[allow(clippy::print_stdout)]
fn show_config(config_path: Option<&Path>, matches: &ArgMatches) -> Result<()> {
    let yaml = match matches.get_one::<String>("target").map(String::as_str) {
        Some("agent") => load_agent_config(config_path)?.to_yaml_string()?,
        Some("server") => load_server_config(config_path)?.to_yaml_string()?,
        _ => unreachable!(),
    };

    print!("{yaml}");
    Ok(())
}
