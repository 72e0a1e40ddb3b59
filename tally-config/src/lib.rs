//! Configuration for the tally agent and server.
//!
//! Both binaries read an optional configuration file and then apply overrides from environment
//! variables and command line flags, so the effective precedence is:
//!
//!  1. command line flags,
//!  2. environment variables,
//!  3. the configuration file,
//!  4. built-in defaults.
//!
//! Files with a `.json` extension are parsed as JSON, everything else as YAML. All fields are
//! optional. An agent configuration file looks like this:
//!
//! ```yaml
//! upstream:
//!   address: http://localhost:8080
//!   mode: bulk
//!   rate_limit: 10
//! collection:
//!   poll_interval: 2
//!   report_interval: 10
//! logging:
//!   level: debug
//! ```
//!
//! And a server configuration file:
//!
//! ```yaml
//! http:
//!   address: localhost:8080
//! storage:
//!   store_interval: 300
//!   file_storage_path: /tmp/metrics-db.json
//!   restore: true
//! auth:
//!   trusted_subnet: 10.0.0.0/8
//! ```

#![warn(missing_docs)]

mod agent;
mod error;
mod server;
mod types;

pub use crate::agent::*;
pub use crate::error::*;
pub use crate::server::*;
pub use crate::types::*;
