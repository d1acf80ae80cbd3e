//! Chat command parsing

use std::fmt;

/// Verbs understood after the command prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    Link,
    Unlink,
    Refresh,
    Auto,
}

impl BridgeCommand {
    /// Parse `<prefix> <verb> [ignored...]`.
    ///
    /// Returns `None` for other messages and unknown verbs.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }

        match rest.split_whitespace().next()? {
            "link" => Some(BridgeCommand::Link),
            "unlink" => Some(BridgeCommand::Unlink),
            "refresh" => Some(BridgeCommand::Refresh),
            "auto" => Some(BridgeCommand::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            BridgeCommand::Link => "link",
            BridgeCommand::Unlink => "unlink",
            BridgeCommand::Refresh => "refresh",
            BridgeCommand::Auto => "auto",
        };
        f.write_str(verb)
    }
}
