use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// An iptables rule specification, kept opaque.
///
/// Built either from a shell-style string (`-s 10.0.0.0/8 -j ACCEPT`) or from
/// argv tokens. Nothing here understands the rule grammar; two rules are equal
/// when their tokens are equal, and a malformed rule is only noticed when
/// iptables rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rule {
    args: Vec<String>,
}

impl Rule {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split `spec` with POSIX shell quoting, so `--comment "two words"` stays
    /// one token.
    pub fn parse(spec: &str) -> Result<Self> {
        shlex::split(spec)
            .map(|args| Self { args })
            .ok_or_else(|| Error::InvalidRule(spec.to_string()))
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The rule as a single string, quoted so that [`Rule::parse`] gives the
    /// same tokens back.
    pub fn spec(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            // Only fails on NUL bytes, which iptables could not receive anyway.
            let quoted = shlex::try_quote(arg).unwrap_or(Cow::Borrowed(arg.as_str()));
            f.write_str(&quoted)?;
        }
        Ok(())
    }
}

impl FromStr for Rule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Rule::parse(s)
    }
}

impl TryFrom<String> for Rule {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Rule::parse(&value)
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.to_string()
    }
}

impl<S: Into<String>> FromIterator<S> for Rule {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Rule::new(iter)
    }
}
