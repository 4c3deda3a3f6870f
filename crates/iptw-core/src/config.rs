use crate::error::{Error, Result};
use crate::runner::CommandLine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the external tool gets invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IptConfig {
    /// `iptables` or `ip6tables` (or a full path to either)
    pub binary: String,
    /// Pass `-w` so the tool waits for the xtables lock
    pub wait: bool,
    /// Run inside `ip netns exec <netns>`
    pub netns: Option<String>,
    pub ip_binary: String,
}

impl Default for IptConfig {
    fn default() -> Self {
        Self {
            binary: "iptables".to_string(),
            wait: true,
            netns: None,
            ip_binary: "ip".to_string(),
        }
    }
}

impl IptConfig {
    pub fn ipv6() -> Self {
        Self {
            binary: "ip6tables".to_string(),
            ..Self::default()
        }
    }

    pub fn with_netns(mut self, netns: impl Into<String>) -> Self {
        self.netns = Some(netns.into());
        self
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Build `[ip netns exec <ns>] <binary> [-w] -t <table> <args...>`.
    pub fn command<I, S>(&self, table: &str, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = match &self.netns {
            Some(netns) => CommandLine::new(&self.ip_binary)
                .args(["netns", "exec", netns.as_str()])
                .arg(&self.binary),
            None => CommandLine::new(&self.binary),
        };

        if self.wait {
            cmd = cmd.arg("-w");
        }

        cmd.args(["-t", table]).args(args)
    }
}
