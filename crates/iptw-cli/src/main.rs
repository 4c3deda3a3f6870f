use anyhow::Context;
use clap::{Parser, Subcommand};
use iptw_core::{IptConfig, Policy, Rule, Table};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "/etc/iptw/config.yaml";

#[derive(Parser, Debug)]
#[command(name = "iptw")]
#[command(version, about = "Tables, chains and rules on top of iptables", long_about = None)]
struct Cli {
    /// Table to operate on
    #[arg(short, long, global = true, default_value = "filter")]
    table: String,
    /// Config file (defaults to /etc/iptw/config.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Run inside this network namespace
    #[arg(long, global = true)]
    netns: Option<String>,
    /// Use ip6tables
    #[arg(short = '6', long = "ipv6", global = true)]
    ipv6: bool,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List chains in the table
    Chains {
        #[arg(long)]
        json: bool,
    },
    /// Show every chain with its policy and rules
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Exit 0 if the chain exists, 1 otherwise
    Exists { chain: String },
    /// Create a user-defined chain
    NewChain { chain: String },
    /// Delete an empty user-defined chain
    DeleteChain { chain: String },
    /// Flush one chain, or every chain in the table
    Flush { chain: Option<String> },
    /// Zero counters of one chain, or every chain in the table
    Zero { chain: Option<String> },
    /// List rules of a chain
    Rules { chain: String },
    /// Append a rule: iptw append INPUT -- -p tcp --dport 22 -j ACCEPT
    Append {
        chain: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        rule: Vec<String>,
    },
    /// Insert a rule at a position (default 1)
    Insert {
        #[arg(long, default_value = "1")]
        pos: u32,
        chain: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        rule: Vec<String>,
    },
    /// Replace the rule at a position
    Replace {
        chain: String,
        pos: u32,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        rule: Vec<String>,
    },
    /// Delete a rule by position or by specification
    Delete {
        #[arg(long, conflicts_with = "rule")]
        pos: Option<u32>,
        chain: String,
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required_unless_present = "pos"
        )]
        rule: Vec<String>,
    },
    /// Exit 0 if the rule exists in the chain, 1 otherwise
    Check {
        chain: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        rule: Vec<String>,
    },
    /// Show the default policy of a built-in chain, or set it
    Policy {
        chain: String,
        policy: Option<Policy>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let table = Table::with_config(cli.table.clone(), config);

    match cli.command {
        Commands::Chains { json } => list_chains(&table, json)?,
        Commands::Status { json } => show_status(&table, json)?,
        Commands::Exists { chain } => {
            if !table.chain_exists(&chain)? {
                eprintln!("Chain {} does not exist in {}", chain, table);
                std::process::exit(1);
            }
            println!("Chain {} exists in {}", chain, table);
        }
        Commands::NewChain { chain } => {
            table.new_chain(&chain)?;
            println!("✅ Created chain {}", chain);
        }
        Commands::DeleteChain { chain } => {
            table.delete_chain(&chain)?;
            println!("✅ Deleted chain {}", chain);
        }
        Commands::Flush { chain } => match chain {
            Some(chain) => table.chain(&chain)?.flush()?,
            None => table.flush_all()?,
        },
        Commands::Zero { chain } => match chain {
            Some(chain) => table.chain(&chain)?.zero()?,
            None => table.zero_all()?,
        },
        Commands::Rules { chain } => list_rules(&table, &chain)?,
        Commands::Append { chain, rule } => {
            table.chain(&chain)?.append(&rule_from_args(rule)?)?;
        }
        Commands::Insert { pos, chain, rule } => {
            table.chain(&chain)?.insert(&rule_from_args(rule)?, pos)?;
        }
        Commands::Replace { chain, pos, rule } => {
            table.chain(&chain)?.replace(pos, &rule_from_args(rule)?)?;
        }
        Commands::Delete { pos, chain, rule } => {
            let chain = table.chain(&chain)?;
            match pos {
                Some(pos) => chain.delete_rule_at(pos)?,
                None => chain.delete_rule(&rule_from_args(rule)?)?,
            }
        }
        Commands::Check { chain, rule } => {
            let rule = rule_from_args(rule)?;
            if !table.chain(&chain)?.rule_exists(&rule)? {
                eprintln!("No matching rule in {}: {}", chain, rule);
                std::process::exit(1);
            }
            println!("Rule present in {}: {}", chain, rule);
        }
        Commands::Policy { chain, policy } => {
            let chain = table.chain(&chain)?;
            match policy {
                Some(policy) => {
                    chain.set_policy(policy)?;
                    println!("✅ {} policy set to {}", chain, policy);
                }
                None => println!("{}", chain.policy()?),
            }
        }
    }

    Ok(())
}

fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

fn init_tracing(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<IptConfig> {
    let default_path = Path::new(DEFAULT_CONFIG);

    let mut config = match &cli.config {
        Some(path) => IptConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if default_path.exists() => IptConfig::from_file(default_path)
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG))?,
        None => IptConfig::default(),
    };

    if cli.ipv6 {
        config.binary = "ip6tables".to_string();
    }
    if let Some(netns) = &cli.netns {
        config.netns = Some(netns.clone());
    }

    Ok(config)
}

/// A single argument containing whitespace is a quoted spec
/// (`iptw append INPUT "-p tcp -j ACCEPT"`); otherwise the args are the tokens.
fn rule_from_args(args: Vec<String>) -> anyhow::Result<Rule> {
    match args.as_slice() {
        [spec] if spec.contains(char::is_whitespace) => Ok(Rule::parse(spec)?),
        _ => Ok(Rule::new(args)),
    }
}

fn list_chains(table: &Table, json: bool) -> anyhow::Result<()> {
    let names = table.chain_names()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn show_status(table: &Table, json: bool) -> anyhow::Result<()> {
    let status = table.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        status.display();
    }
    Ok(())
}

fn list_rules(table: &Table, chain: &str) -> anyhow::Result<()> {
    let rules = table.chain(chain)?.rules()?;

    if rules.is_empty() {
        println!("(no rules in {})", chain);
    }
    for (i, rule) in rules.iter().enumerate() {
        println!("{:>3}. {}", i + 1, rule);
    }
    Ok(())
}
