pub mod chain;
pub mod config;
pub mod error;
pub mod listing;
pub mod policy;
pub mod rule;
pub mod runner;
pub mod status;
pub mod table;

#[cfg(test)]
mod testing;

pub use chain::Chain;
pub use config::IptConfig;
pub use error::{Error, Result};
pub use listing::{ListingEntry, parse_listing};
pub use policy::Policy;
pub use rule::Rule;
pub use runner::{CommandLine, CommandOutput, CommandRunner, SystemRunner};
pub use status::{ChainStatus, TableStatus};
pub use table::Table;
