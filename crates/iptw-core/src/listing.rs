//! Parser for `iptables -S` output.
//!
//! ```text
//! -P INPUT ACCEPT
//! -N DOCKER
//! -A INPUT -s 10.0.0.0/8 -m comment --comment "lan" -j ACCEPT
//! ```

use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::rule::Rule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    /// `-P <chain> <policy>`: a built-in chain
    Policy { chain: String, policy: Policy },
    /// `-N <chain>`: a user-defined chain
    NewChain { chain: String },
    /// `-A <chain> <rule...>`
    Append { chain: String, rule: Rule },
}

impl ListingEntry {
    pub fn chain(&self) -> &str {
        match self {
            ListingEntry::Policy { chain, .. }
            | ListingEntry::NewChain { chain }
            | ListingEntry::Append { chain, .. } => chain,
        }
    }
}

/// Parse a whole listing. Blank lines and `#` lines (iptables-nft prints its
/// legacy-tables warning that way) are skipped; anything else unrecognised is
/// an error.
pub fn parse_listing(output: &str) -> Result<Vec<ListingEntry>> {
    let mut entries = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        entries.push(parse_line(trimmed)?);
    }

    Ok(entries)
}

fn parse_line(line: &str) -> Result<ListingEntry> {
    let parse_err = |reason: &str| Error::Parse {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    // Chain names are printed unquoted and can't contain whitespace, so only
    // the rule text after `-A <chain>` follows shell quoting.
    let (flag, rest) = split_word(line);
    let (chain, rest) = split_word(rest);
    if flag.is_empty() {
        return Err(parse_err("empty line"));
    }
    if chain.is_empty() {
        return Err(parse_err("missing chain name"));
    }
    let chain = chain.to_string();

    match flag {
        "-P" => {
            let mut words = rest.split_whitespace();
            let policy = words.next().ok_or_else(|| parse_err("missing policy"))?;
            if words.next().is_some() {
                return Err(parse_err("trailing tokens after policy"));
            }
            let policy = policy
                .parse::<Policy>()
                .map_err(|_| parse_err(&format!("unknown policy {policy:?}")))?;
            Ok(ListingEntry::Policy { chain, policy })
        }
        "-N" => {
            if !rest.is_empty() {
                return Err(parse_err("trailing tokens after chain name"));
            }
            Ok(ListingEntry::NewChain { chain })
        }
        "-A" => {
            let rule = Rule::parse(rest).map_err(|_| parse_err("unbalanced quotes"))?;
            Ok(ListingEntry::Append { chain, rule })
        }
        other => Err(parse_err(&format!("unexpected flag {other:?}"))),
    }
}

/// First whitespace-separated word and the trimmed remainder.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim()),
        None => (text, ""),
    }
}
