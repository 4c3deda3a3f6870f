use crate::listing::ListingEntry;
use crate::policy::Policy;
use crate::rule::Rule;
use serde::{Deserialize, Serialize};

/// Point-in-time view of one table, built from a single listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: String,
    pub chains: Vec<ChainStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub name: String,
    /// `None` for user-defined chains
    pub policy: Option<Policy>,
    pub rules: Vec<Rule>,
}

impl ChainStatus {
    pub fn is_builtin(&self) -> bool {
        self.policy.is_some()
    }
}

impl TableStatus {
    pub fn from_entries(table: &str, entries: Vec<ListingEntry>) -> Self {
        let mut chains: Vec<ChainStatus> = vec![];

        for entry in entries {
            match entry {
                ListingEntry::Policy { chain, policy } => chains.push(ChainStatus {
                    name: chain,
                    policy: Some(policy),
                    rules: vec![],
                }),
                ListingEntry::NewChain { chain } => chains.push(ChainStatus {
                    name: chain,
                    policy: None,
                    rules: vec![],
                }),
                ListingEntry::Append { chain, rule } => {
                    match chains.iter_mut().find(|c| c.name == chain) {
                        Some(status) => status.rules.push(rule),
                        // Rules always follow their chain's header line in -S output
                        None => chains.push(ChainStatus {
                            name: chain,
                            policy: None,
                            rules: vec![rule],
                        }),
                    }
                }
            }
        }

        Self {
            table: table.to_string(),
            chains,
        }
    }

    pub fn chain(&self, name: &str) -> Option<&ChainStatus> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn rule_count(&self) -> usize {
        self.chains.iter().map(|c| c.rules.len()).sum()
    }

    pub fn display(&self) {
        println!(
            "Table {} ({} chains, {} rules)",
            self.table,
            self.chains.len(),
            self.rule_count()
        );

        for chain in &self.chains {
            match chain.policy {
                Some(policy) => println!("  {} [policy {}]", chain.name, policy),
                None => println!("  {}", chain.name),
            }
            if chain.rules.is_empty() {
                println!("    (no rules)");
            }
            for (i, rule) in chain.rules.iter().enumerate() {
                println!("    {:>3}. {}", i + 1, rule);
            }
        }
    }
}
