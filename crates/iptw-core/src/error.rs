use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The external tool exited non-zero, or could not be started at all
    /// (in which case `code` is `None` and `stderr` carries the OS error).
    #[error("{command} failed [{}]: {}", display_code(.code), first_line(.stderr))]
    ExternalTool {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// A listing line we could not make sense of
    #[error("unparseable listing line {line:?}: {reason}")]
    Parse { line: String, reason: String },

    #[error("chain not found: {0}")]
    ChainNotFound(String),

    #[error("chain {0} does not have a default policy")]
    NoPolicy(String),

    #[error("invalid rule specification: {0:?}")]
    InvalidRule(String),

    #[error("unknown policy: {0:?}")]
    UnknownPolicy(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit code of the failed command, if this error came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ExternalTool { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_external_tool(&self) -> bool {
        matches!(self, Error::ExternalTool { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "not run".to_string(),
    }
}

pub(crate) fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}
