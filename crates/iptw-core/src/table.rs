use crate::chain::Chain;
use crate::config::IptConfig;
use crate::error::{Error, Result, first_line};
use crate::listing::{ListingEntry, parse_listing};
use crate::rule::Rule;
use crate::runner::{CommandRunner, SystemRunner};
use crate::status::TableStatus;
use std::fmt;
use tracing::{debug, info};

/// A named iptables table (`filter`, `nat`, `mangle`, `raw`, `security`).
///
/// Holds nothing but its name and how to reach the tool. Every query runs
/// iptables again, so whatever comes back is only as fresh as the moment it
/// was listed: other processes on the host can change the ruleset at any time.
#[derive(Debug)]
pub struct Table<R = SystemRunner> {
    name: String,
    config: IptConfig,
    runner: R,
}

impl Table<SystemRunner> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, IptConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: IptConfig) -> Self {
        Self::with_runner(name, config, SystemRunner)
    }

    pub fn filter() -> Self {
        Self::new("filter")
    }

    pub fn nat() -> Self {
        Self::new("nat")
    }

    pub fn mangle() -> Self {
        Self::new("mangle")
    }

    pub fn raw() -> Self {
        Self::new("raw")
    }

    pub fn security() -> Self {
        Self::new("security")
    }
}

impl<R> Table<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IptConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: CommandRunner> Table<R> {
    pub fn with_runner(name: impl Into<String>, config: IptConfig, runner: R) -> Self {
        Self {
            name: name.into(),
            config,
            runner,
        }
    }

    /// Run iptables against this table and return its stdout.
    pub(crate) fn iptables<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.config.command(&self.name, args);
        debug!(command = %command, "running command");

        let output = self.runner.run(&command).map_err(|e| {
            debug!(command = %command, error = %e, "failed to start command");
            Error::ExternalTool {
                command: command.to_string(),
                code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            }
        })?;

        if !output.success() {
            debug!(
                command = %command,
                code = ?output.code,
                "command failed: {}",
                first_line(&output.stderr)
            );
            return Err(Error::ExternalTool {
                command: command.to_string(),
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output.stdout)
    }

    /// `-S [chain]`, parsed.
    pub(crate) fn list(&self, chain: Option<&str>) -> Result<Vec<ListingEntry>> {
        let output = match chain {
            Some(chain) => self.iptables(["-S", chain])?,
            None => self.iptables(["-S"])?,
        };
        parse_listing(&output)
    }

    /// Names of all chains, built-in ones first, in listing order.
    pub fn chain_names(&self) -> Result<Vec<String>> {
        Ok(self
            .list(None)?
            .into_iter()
            .filter_map(|entry| match entry {
                ListingEntry::Policy { chain, .. } | ListingEntry::NewChain { chain } => {
                    Some(chain)
                }
                ListingEntry::Append { .. } => None,
            })
            .collect())
    }

    pub fn chain_exists(&self, name: &str) -> Result<bool> {
        Ok(self.chain_names()?.iter().any(|c| c == name))
    }

    /// A fresh set of chain handles; each call lists the table again.
    pub fn chains(&self) -> Result<Vec<Chain<'_, R>>> {
        Ok(self
            .chain_names()?
            .into_iter()
            .map(|name| Chain::new(name, self))
            .collect())
    }

    /// Handle to an existing chain.
    pub fn chain(&self, name: &str) -> Result<Chain<'_, R>> {
        if !self.chain_exists(name)? {
            return Err(Error::ChainNotFound(name.to_string()));
        }
        Ok(Chain::new(name, self))
    }

    pub fn new_chain(&self, name: &str) -> Result<Chain<'_, R>> {
        self.iptables(["-N", name])?;
        info!(table = %self.name, chain = name, "created chain");
        Ok(Chain::new(name, self))
    }

    /// Delete a user-defined chain. iptables refuses if it still has rules
    /// or is referenced by a jump.
    pub fn delete_chain(&self, name: &str) -> Result<()> {
        self.iptables(["-X", name])?;
        info!(table = %self.name, chain = name, "deleted chain");
        Ok(())
    }

    pub fn flush_chain(&self, name: &str) -> Result<()> {
        self.iptables(["-F", name])?;
        Ok(())
    }

    /// Remove every rule from every chain in this table.
    pub fn flush_all(&self) -> Result<()> {
        self.iptables(["-F"])?;
        info!(table = %self.name, "flushed all chains");
        Ok(())
    }

    pub fn zero_all(&self) -> Result<()> {
        self.iptables(["-Z"])?;
        Ok(())
    }

    pub fn rule_exists(&self, chain: &str, rule: &Rule) -> Result<bool> {
        self.chain(chain)?.rule_exists(rule)
    }

    pub fn status(&self) -> Result<TableStatus> {
        Ok(TableStatus::from_entries(&self.name, self.list(None)?))
    }
}

impl<R> fmt::Display for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {}", self.name)
    }
}
