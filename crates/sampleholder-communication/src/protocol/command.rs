//! `run[...]` command framing
//!
//! Requests are plain text of the form `run[ name, arg1, arg2 ]`, optionally
//! followed by a terminator character. Arguments are written in their
//! literal textual form.

use sampleholder_core::ProtocolError;
use std::fmt;

/// Positional command argument
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    /// Integer argument
    Int(i64),
    /// Floating point argument
    Float(f64),
    /// Bare text argument
    Text(String),
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for CommandArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for CommandArg {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for CommandArg {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for CommandArg {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for CommandArg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl CommandArg {
    /// Parse one argument token, preferring integer, then float, then text
    pub fn parse(token: &str) -> Self {
        if let Ok(v) = token.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = token.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::Text(token.to_string())
        }
    }

    /// Integer value, if this is an integer argument
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// A named firmware command with positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RunCommand {
    name: String,
    args: Vec<CommandArg>,
}

impl RunCommand {
    /// Create a command with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<CommandArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<CommandArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Positional arguments
    pub fn arguments(&self) -> &[CommandArg] {
        &self.args
    }

    /// Check that the command frames unambiguously
    ///
    /// The wire format has no escaping, so names and text arguments must not
    /// contain separators, brackets, or line breaks.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.name.is_empty() {
            return Err(ProtocolError::InvalidCommand {
                reason: "command name is empty".to_string(),
            });
        }
        if self.name.chars().any(|c| c.is_whitespace() || is_reserved(c)) {
            return Err(ProtocolError::InvalidCommand {
                reason: format!("command name {:?} contains reserved characters", self.name),
            });
        }
        for arg in &self.args {
            if let CommandArg::Text(text) = arg {
                if text.chars().any(|c| is_reserved(c) || c == '\n' || c == '\r') {
                    return Err(ProtocolError::InvalidCommand {
                        reason: format!("argument {:?} contains reserved characters", text),
                    });
                }
            }
        }
        Ok(())
    }

    /// Bytes written to the device, with the optional terminator appended
    pub fn frame(&self, terminator: Option<char>) -> Vec<u8> {
        let mut text = self.to_string();
        if let Some(t) = terminator {
            text.push(t);
        }
        text.into_bytes()
    }

    /// Parse a request line as sent by [`RunCommand::frame`]
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let body = line
            .trim()
            .strip_prefix("run[")
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| ProtocolError::InvalidCommand {
                reason: format!("not a run[...] request: {:?}", line),
            })?;

        let mut tokens = body.split(',').map(str::trim);
        let name = tokens.next().unwrap_or_default();
        let command = Self::new(name).args(tokens.map(CommandArg::parse));
        command.validate()?;
        Ok(command)
    }
}

impl fmt::Display for RunCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run[ {}", self.name)?;
        for arg in &self.args {
            write!(f, ", {}", arg)?;
        }
        write!(f, " ]")
    }
}

fn is_reserved(c: char) -> bool {
    matches!(c, ',' | '[' | ']')
}
