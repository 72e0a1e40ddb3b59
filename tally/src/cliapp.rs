//! This module implements the definition of the command line app.

use clap::{Arg, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Tally collects runtime metrics and stores them on a central server.";

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .value_name("CONFIG")
        .env("CONFIG")
        .global(true)
        .help("Path to a YAML or JSON config file.")
}

fn agent_command() -> Command {
    Command::new("agent")
        .about("Run the metrics agent")
        .after_help(
            "This polls runtime and system statistics and reports them to the server until \
             the process is interrupted. Command line flags take precedence over environment \
             variables, which take precedence over the config file.",
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .value_name("URL")
                .env("ADDRESS")
                .help("The address of the server, e.g. http://localhost:8080."),
        )
        .arg(
            Arg::new("report_interval")
                .long("report-interval")
                .short('r')
                .value_name("SECONDS")
                .env("REPORT_INTERVAL")
                .help("Seconds between two reports to the server."),
        )
        .arg(
            Arg::new("poll_interval")
                .long("poll-interval")
                .short('p')
                .value_name("SECONDS")
                .env("POLL_INTERVAL")
                .help("Seconds between two polls of the collectors."),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .short('k')
                .value_name("KEY")
                .env("KEY")
                .hide_env_values(true)
                .help("Secret key for signing request bodies."),
        )
        .arg(
            Arg::new("rate_limit")
                .long("rate-limit")
                .short('l')
                .value_name("COUNT")
                .env("RATE_LIMIT")
                .help("Maximum number of concurrent requests in url and json mode."),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .short('m')
                .value_name("MODE")
                .env("MODE")
                .value_parser(["url", "json", "bulk"])
                .help("How metrics are sent to the server."),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .env("HTTP_TIMEOUT")
                .help("Timeout of a single request to the server."),
        )
}

fn server_command() -> Command {
    Command::new("server")
        .about("Run the ingestion server")
        .after_help(
            "This serves the metrics API until the process is interrupted. Metrics are stored \
             in the database if a DSN is given, otherwise in memory with optional snapshots \
             to a file.",
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .value_name("HOST:PORT")
                .env("ADDRESS")
                .help("The address to listen on, e.g. localhost:8080."),
        )
        .arg(
            Arg::new("store_interval")
                .long("store-interval")
                .short('i')
                .value_name("SECONDS")
                .env("STORE_INTERVAL")
                .help("Seconds between two snapshots, 0 writes on every update."),
        )
        .arg(
            Arg::new("file_storage_path")
                .long("file-storage-path")
                .short('f')
                .value_name("PATH")
                .env("FILE_STORAGE_PATH")
                .help("Path of the snapshot file, empty to keep metrics in memory only."),
        )
        .arg(
            Arg::new("restore")
                .long("restore")
                .short('r')
                .value_name("BOOL")
                .env("RESTORE")
                .num_args(0..=1)
                .default_missing_value("true")
                .help("Whether to restore the snapshot on startup."),
        )
        .arg(
            Arg::new("database_dsn")
                .long("database-dsn")
                .short('d')
                .value_name("DSN")
                .env("DATABASE_DSN")
                .hide_env_values(true)
                .help("PostgreSQL connection string."),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .short('k')
                .value_name("KEY")
                .env("KEY")
                .hide_env_values(true)
                .help("Secret key for verifying and signing bodies."),
        )
        .arg(
            Arg::new("trusted_subnet")
                .long("trusted-subnet")
                .short('t')
                .value_name("CIDR")
                .env("TRUSTED_SUBNET")
                .help("Only accept requests whose X-Real-IP is in this network."),
        )
        .arg(
            Arg::new("require_signature")
                .long("require-signature")
                .value_name("BOOL")
                .env("REQUIRE_SIGNATURE")
                .num_args(0..=1)
                .default_missing_value("true")
                .help("Reject unsigned updates when a key is configured."),
        )
        .arg(
            Arg::new("shutdown_timeout")
                .long("shutdown-timeout")
                .value_name("SECONDS")
                .env("SHUTDOWN_TIMEOUT")
                .help("Seconds to wait for open connections on shutdown."),
        )
}

fn config_command() -> Command {
    Command::new("config")
        .about("Manage the tally config")
        .subcommand_required(true)
        .subcommand(
            Command::new("show")
                .about("Show the effective config")
                .after_help(
                    "This prints the config file merged with the built-in defaults as YAML.",
                )
                .arg(
                    Arg::new("target")
                        .value_name("TARGET")
                        .required(true)
                        .value_parser(["agent", "server"])
                        .help("Which config to show."),
                ),
        )
}

pub fn make_app() -> Command {
    Command::new("tally")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(config_arg())
        .subcommand(agent_command())
        .subcommand(server_command())
        .subcommand(config_command())
}
