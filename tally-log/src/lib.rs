//! Logging facade for all tally crates.
//!
//! Every crate in the workspace logs through the macros re-exported here, so that the concrete
//! backend is configured in exactly one place. Messages are lowercase without trailing
//! punctuation, and structured values are passed as fields:
//!
//! ```
//! let path = "/tmp/metrics-db.json";
//! tally_log::info!(path, "restoring snapshot");
//! ```
//!
//! # Initialization
//!
//! The binary calls [`init`] once at startup with the [`LogConfig`] from its configuration file.
//! This requires the `init` feature. Before that, nothing is printed; use [`ensure_error`] for
//! errors that may occur before the logger exists.
//!
//! # Testing
//!
//! With the `test` feature, [`init_test!`] installs a subscriber that writes into the output
//! captured by the test harness.

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

pub use tracing::{Level, debug, error, info, trace, warn};
