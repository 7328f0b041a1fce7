//! Command handlers -- one module per subcommand

pub mod analyzers;
pub mod cache;
pub mod config;
pub mod scan;
