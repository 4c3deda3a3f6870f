//! In-memory stand-in for the iptables binary, answering the subset of the
//! command line this crate emits with the same exit codes and `-S` format.

use crate::rule::Rule;
use crate::runner::{CommandLine, CommandOutput, CommandRunner};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;

const BAD_RULE: &str = "iptables: Bad rule (does a matching rule exist in that chain?).";
const NO_CHAIN: &str = "iptables: No chain/target/match by that name.";

#[derive(Debug, Clone)]
struct FakeChain {
    name: String,
    policy: Option<String>,
    rules: Vec<Vec<String>>,
}

impl FakeChain {
    fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: Some("ACCEPT".to_string()),
            rules: vec![],
        }
    }

    fn user(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: None,
            rules: vec![],
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeIptables {
    tables: RefCell<BTreeMap<String, Vec<FakeChain>>>,
    calls: RefCell<Vec<CommandLine>>,
    available: bool,
}

type Reply = Result<String, (i32, String)>;

impl FakeIptables {
    pub(crate) fn new() -> Self {
        let builtin = |names: &[&str]| -> Vec<FakeChain> {
            names.iter().map(|n| FakeChain::builtin(n)).collect()
        };

        let mut tables: BTreeMap<String, Vec<FakeChain>> = BTreeMap::new();
        tables.insert("filter".to_string(), builtin(&["INPUT", "FORWARD", "OUTPUT"]));
        tables.insert(
            "nat".to_string(),
            builtin(&["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"]),
        );
        tables.insert(
            "mangle".to_string(),
            builtin(&["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"]),
        );
        tables.insert("raw".to_string(), builtin(&["PREROUTING", "OUTPUT"]));

        Self {
            tables: RefCell::new(tables),
            calls: RefCell::new(vec![]),
            available: true,
        }
    }

    /// Every call fails to start, as if the binary were missing.
    pub(crate) fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub(crate) fn with_chain(self, table: &str, chain: &str) -> Self {
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(FakeChain::user(chain));
        self
    }

    pub(crate) fn with_rule(self, table: &str, chain: &str, spec: &str) -> Self {
        let rule = Rule::parse(spec).expect("test rule spec");
        {
            let mut tables = self.tables.borrow_mut();
            let chains = tables.get_mut(table).expect("test table");
            let chain = chains
                .iter_mut()
                .find(|c| c.name == chain)
                .expect("test chain");
            chain.rules.push(rule.args().to_vec());
        }
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandLine> {
        self.calls.borrow().clone()
    }

    fn dispatch(&self, args: &[String]) -> Reply {
        let args = match args.first().map(String::as_str) {
            Some("-w") => &args[1..],
            _ => args,
        };
        let (table, rest) = match args {
            [flag, table, rest @ ..] if flag == "-t" => (table.as_str(), rest),
            _ => return Err((2, "iptables: expected -t <table>".to_string())),
        };

        let mut tables = self.tables.borrow_mut();
        let chains = tables.get_mut(table).ok_or_else(|| {
            (
                3,
                format!("iptables: can't initialize iptables table `{table}': Table does not exist"),
            )
        })?;

        let (op, rest) = rest
            .split_first()
            .ok_or_else(|| (2, "iptables: no command specified".to_string()))?;

        match op.as_str() {
            "-S" => list(chains, rest.first()),
            "-N" => {
                let name = one_name(rest)?;
                if find(chains, name).is_ok() {
                    return Err((1, "iptables: Chain already exists.".to_string()));
                }
                chains.push(FakeChain::user(name));
                Ok(String::new())
            }
            "-X" => {
                let name = one_name(rest)?;
                let idx = find(chains, name)?;
                let chain = &chains[idx];
                if chain.policy.is_some() {
                    return Err((2, "iptables: Can't delete built-in chain.".to_string()));
                }
                if !chain.rules.is_empty() {
                    return Err((1, "iptables: Directory not empty.".to_string()));
                }
                chains.remove(idx);
                Ok(String::new())
            }
            "-F" => {
                match rest.first() {
                    Some(name) => {
                        let idx = find(chains, name)?;
                        chains[idx].rules.clear();
                    }
                    None => chains.iter_mut().for_each(|c| c.rules.clear()),
                }
                Ok(String::new())
            }
            "-Z" => {
                if let Some(name) = rest.first() {
                    find(chains, name)?;
                }
                Ok(String::new())
            }
            "-P" => {
                let [name, policy] = rest else {
                    return Err((2, "iptables: -P requires a chain and a policy".to_string()));
                };
                let idx = find(chains, name)?;
                if chains[idx].policy.is_none() {
                    return Err((1, "iptables: Bad built-in chain name.".to_string()));
                }
                if policy != "ACCEPT" && policy != "DROP" {
                    return Err((2, "iptables: Bad policy name.".to_string()));
                }
                chains[idx].policy = Some(policy.clone());
                Ok(String::new())
            }
            "-A" | "-C" | "-I" | "-R" | "-D" => {
                let (name, rest) = rest
                    .split_first()
                    .ok_or_else(|| (2, "iptables: missing chain name".to_string()))?;
                let idx = find(chains, name)?;
                rule_op(op, &mut chains[idx].rules, rest)
            }
            other => Err((2, format!("iptables: unknown option \"{other}\""))),
        }
    }
}

impl CommandRunner for FakeIptables {
    fn run(&self, command: &CommandLine) -> io::Result<CommandOutput> {
        self.calls.borrow_mut().push(command.clone());
        if !self.available {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: No such file or directory", command.program),
            ));
        }

        Ok(match self.dispatch(&command.args) {
            Ok(stdout) => CommandOutput {
                stdout,
                stderr: String::new(),
                code: Some(0),
            },
            Err((code, stderr)) => CommandOutput {
                stdout: String::new(),
                stderr: format!("{stderr}\n"),
                code: Some(code),
            },
        })
    }
}

fn find(chains: &[FakeChain], name: &str) -> Result<usize, (i32, String)> {
    chains
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| (1, NO_CHAIN.to_string()))
}

fn one_name(rest: &[String]) -> Result<&str, (i32, String)> {
    match rest {
        [name] => Ok(name.as_str()),
        _ => Err((2, "iptables: expected exactly one chain name".to_string())),
    }
}

fn position(arg: Option<&String>) -> Result<usize, (i32, String)> {
    arg.and_then(|a| a.parse::<usize>().ok())
        .filter(|p| *p > 0)
        .ok_or_else(|| (2, "iptables: Invalid rule number".to_string()))
}

fn check_rule(rule: &[String]) -> Result<(), (i32, String)> {
    match rule.first() {
        Some(first) if !first.starts_with('-') => {
            Err((2, format!("Bad argument `{first}'")))
        }
        _ => Ok(()),
    }
}

fn rule_op(op: &str, rules: &mut Vec<Vec<String>>, rest: &[String]) -> Reply {
    match op {
        "-A" => {
            check_rule(rest)?;
            rules.push(rest.to_vec());
        }
        "-C" => {
            check_rule(rest)?;
            if !rules.iter().any(|r| r == rest) {
                return Err((1, BAD_RULE.to_string()));
            }
        }
        "-I" => {
            let pos = position(rest.first())?;
            check_rule(&rest[1..])?;
            if pos > rules.len() + 1 {
                return Err((1, "iptables: Index of insertion too big.".to_string()));
            }
            rules.insert(pos - 1, rest[1..].to_vec());
        }
        "-R" => {
            let pos = position(rest.first())?;
            check_rule(&rest[1..])?;
            if pos > rules.len() {
                return Err((1, "iptables: Index of replacement too big.".to_string()));
            }
            rules[pos - 1] = rest[1..].to_vec();
        }
        "-D" => match rest {
            [pos] if pos.parse::<usize>().is_ok() => {
                let pos = position(Some(pos))?;
                if pos > rules.len() {
                    return Err((1, "iptables: Index of deletion too big.".to_string()));
                }
                rules.remove(pos - 1);
            }
            _ => {
                check_rule(rest)?;
                let idx = rules
                    .iter()
                    .position(|r| r == rest)
                    .ok_or_else(|| (1, BAD_RULE.to_string()))?;
                rules.remove(idx);
            }
        },
        _ => unreachable!("not a rule operation: {op}"),
    }
    Ok(String::new())
}

/// Mimics `iptables -S`: policies, then user chains, then rules.
fn list(chains: &[FakeChain], only: Option<&String>) -> Reply {
    let selected: Vec<&FakeChain> = match only {
        Some(name) => vec![&chains[find(chains, name)?]],
        None => chains.iter().collect(),
    };

    let mut out = String::new();
    for chain in selected.iter().filter(|c| c.policy.is_some()) {
        out.push_str(&format!(
            "-P {} {}\n",
            chain.name,
            chain.policy.as_deref().unwrap_or_default()
        ));
    }
    for chain in selected.iter().filter(|c| c.policy.is_none()) {
        out.push_str(&format!("-N {}\n", chain.name));
    }
    for chain in &selected {
        for rule in &chain.rules {
            let rule = Rule::new(rule.iter().cloned());
            if rule.is_empty() {
                out.push_str(&format!("-A {}\n", chain.name));
            } else {
                out.push_str(&format!("-A {} {}\n", chain.name, rule));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IptConfig;

    fn run(fake: &FakeIptables, args: &[&str]) -> CommandOutput {
        let command = IptConfig::default().command("filter", args.iter().copied());
        fake.run(&command).unwrap()
    }

    #[test]
    fn listing_matches_iptables_layout() {
        let fake = FakeIptables::new()
            .with_chain("filter", "WEB")
            .with_rule("filter", "WEB", "-m comment --comment \"a b\" -j RETURN");

        let out = run(&fake, &["-S"]);
        assert_eq!(
            out.stdout,
            "-P INPUT ACCEPT\n-P FORWARD ACCEPT\n-P OUTPUT ACCEPT\n-N WEB\n-A WEB -m comment --comment 'a b' -j RETURN\n"
        );
        assert_eq!(fake.calls().len(), 1);
    }

    #[test]
    fn check_uses_exit_status_one_for_missing_rule() {
        let fake = FakeIptables::new();
        let out = run(&fake, &["-C", "INPUT", "-j", "ACCEPT"]);
        assert_eq!(out.code, Some(1));
        assert!(out.stderr.starts_with("iptables: Bad rule"));
    }
}
