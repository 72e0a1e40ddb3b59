//! Common functionality shared by the tally agent and server.
#![warn(missing_docs)]

mod retry;

pub use crate::retry::*;
