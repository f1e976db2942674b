//! Command handlers: bridge CLI args -> engine -> output formatting.

pub mod config_cmd;
pub mod load;
