use crate::error::{Error, Result};
use crate::listing::ListingEntry;
use crate::policy::Policy;
use crate::rule::Rule;
use crate::runner::{CommandRunner, SystemRunner};
use crate::table::Table;
use std::fmt;
use tracing::info;

/// A chain inside a [`Table`]. Borrows the table it belongs to.
#[derive(Debug)]
pub struct Chain<'t, R = SystemRunner> {
    name: String,
    table: &'t Table<R>,
}

impl<R> Clone for Chain<'_, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            table: self.table,
        }
    }
}

impl<'t, R: CommandRunner> Chain<'t, R> {
    pub(crate) fn new(name: impl Into<String>, table: &'t Table<R>) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &'t Table<R> {
        self.table
    }

    fn run_with_rule(&self, op: &str, pos: Option<u32>, rule: &Rule) -> Result<()> {
        let mut args = vec![op.to_string(), self.name.clone()];
        if let Some(pos) = pos {
            args.push(pos.to_string());
        }
        args.extend(rule.args().iter().cloned());
        self.table.iptables(args)?;
        Ok(())
    }

    /// Rules currently in this chain, in order.
    pub fn rules(&self) -> Result<Vec<Rule>> {
        Ok(self
            .table
            .list(Some(&self.name))?
            .into_iter()
            .filter_map(|entry| match entry {
                ListingEntry::Append { chain, rule } if chain == self.name => Some(rule),
                _ => None,
            })
            .collect())
    }

    /// Whether iptables finds a rule matching `rule` (`-C`).
    pub fn rule_exists(&self, rule: &Rule) -> Result<bool> {
        match self.run_with_rule("-C", None, rule) {
            Ok(()) => Ok(true),
            Err(Error::ExternalTool { code: Some(1), .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Add `rule` at the end. Appending the same rule twice gives two rules.
    pub fn append(&self, rule: &Rule) -> Result<()> {
        self.run_with_rule("-A", None, rule)
    }

    /// Insert `rule` at 1-based position `pos`.
    pub fn insert(&self, rule: &Rule, pos: u32) -> Result<()> {
        self.run_with_rule("-I", Some(pos), rule)
    }

    pub fn insert_first(&self, rule: &Rule) -> Result<()> {
        self.insert(rule, 1)
    }

    /// Replace the rule at 1-based position `pos`.
    pub fn replace(&self, pos: u32, rule: &Rule) -> Result<()> {
        self.run_with_rule("-R", Some(pos), rule)
    }

    /// Delete the first rule matching `rule`.
    pub fn delete_rule(&self, rule: &Rule) -> Result<()> {
        self.run_with_rule("-D", None, rule)
    }

    pub fn delete_rule_at(&self, pos: u32) -> Result<()> {
        self.table
            .iptables(["-D".to_string(), self.name.clone(), pos.to_string()])?;
        Ok(())
    }

    /// Default policy, read from the listing. User-defined chains have none.
    pub fn policy(&self) -> Result<Policy> {
        self.table
            .list(Some(&self.name))?
            .into_iter()
            .find_map(|entry| match entry {
                ListingEntry::Policy { chain, policy } if chain == self.name => Some(policy),
                _ => None,
            })
            .ok_or_else(|| Error::NoPolicy(self.name.clone()))
    }

    /// iptables only accepts this on built-in chains.
    pub fn set_policy(&self, policy: Policy) -> Result<()> {
        self.table.iptables(["-P", self.name.as_str(), policy.as_str()])?;
        info!(table = %self.table.name(), chain = %self.name, %policy, "set policy");
        Ok(())
    }

    pub fn is_builtin(&self) -> Result<bool> {
        match self.policy() {
            Ok(_) => Ok(true),
            Err(Error::NoPolicy(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.table.flush_chain(&self.name)
    }

    /// Reset packet and byte counters.
    pub fn zero(&self) -> Result<()> {
        self.table.iptables(["-Z", self.name.as_str()])?;
        Ok(())
    }

    pub fn delete(self) -> Result<()> {
        self.table.delete_chain(&self.name)
    }
}

impl<R> fmt::Display for Chain<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain {}:{}", self.table.name(), self.name)
    }
}
