#![warn(clippy::pedantic)]
// Noisy doc/signature lints on a crate with many small pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Keeping format!("{}", x) alongside format!("{x}") where the expression is long
#![allow(clippy::uninlined_format_args)]
// Long turn and dispatch functions read better in one piece
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod batcher;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod gateway;
pub mod ledger;
pub mod nlp;
pub mod orchestrator;
pub mod state;
pub mod sweep;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
