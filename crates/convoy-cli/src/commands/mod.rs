//! Subcommand implementations.

pub mod history;
pub mod status;
pub mod unlock;
pub mod validate;

mod util;

pub use util::load_config;
