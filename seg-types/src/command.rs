//! Textual action commands: `type arg1 arg2 key=value ...`.
//!
//! Tokens are separated by whitespace. Double quotes group a token that
//! contains spaces (`\"` and `\\` escape inside quotes) and `[...]` groups
//! keep their inner spaces so vectors stay a single token. A token with an
//! unquoted `=` outside brackets is a key/value pair.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unterminated quote in '{0}'")]
    UnterminatedQuote(String),
    #[error("key/value pair without a key in '{0}'")]
    EmptyKey(String),
    #[error("unknown action type '{0}'")]
    UnknownType(String),
    #[error("{action}: expected {expected} argument(s), got {got} (usage: {usage})")]
    ArgumentCount {
        action: String,
        expected: usize,
        got: usize,
        usage: String,
    },
    #[error("{action}: missing required parameter '{name}'")]
    MissingParameter { action: String, name: String },
    #[error("{action}: unknown key '{key}'")]
    UnknownKey { action: String, key: String },
}

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionCommand {
    pub action_type: String,
    pub args: Vec<String>,
    pub keys: Vec<(String, String)>,
}

impl ActionCommand {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.push((key.into(), value.into()));
        self
    }

    /// Value of a key, matched case-insensitively.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn parse(text: &str) -> Result<Self, CommandParseError> {
        let mut tokens = tokenize(text)?.into_iter();
        let first = tokens.next().ok_or(CommandParseError::Empty)?;
        let mut cmd = ActionCommand::new(first.text.to_lowercase());
        for tok in tokens {
            match tok.eq_pos {
                Some(pos) => {
                    let key = tok.text[..pos].trim().to_lowercase();
                    if key.is_empty() {
                        return Err(CommandParseError::EmptyKey(tok.text));
                    }
                    let value = tok.text[pos + 1..].to_string();
                    cmd.keys.push((key, value));
                }
                None => cmd.args.push(tok.text),
            }
        }
        Ok(cmd)
    }
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.action_type)?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        for (key, value) in &self.keys {
            write!(f, " {}={}", key, quote(value))?;
        }
        Ok(())
    }
}

struct Token {
    text: String,
    /// Byte offset of the first unquoted, unbracketed `=`.
    eq_pos: Option<usize>,
}

fn tokenize(text: &str) -> Result<Vec<Token>, CommandParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut buf = String::new();
        let mut eq_pos = None;
        let mut depth = 0usize;
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() && depth == 0 {
                break;
            }
            chars.next();
            match c {
                '"' => {
                    let mut closed = false;
                    while let Some(q) = chars.next() {
                        match q {
                            '\\' => {
                                if let Some(esc) = chars.next() {
                                    buf.push(esc);
                                }
                            }
                            '"' => {
                                closed = true;
                                break;
                            }
                            other => buf.push(other),
                        }
                    }
                    if !closed {
                        return Err(CommandParseError::UnterminatedQuote(text.to_string()));
                    }
                }
                '[' => {
                    depth += 1;
                    buf.push(c);
                }
                ']' => {
                    depth = depth.saturating_sub(1);
                    buf.push(c);
                }
                '=' if depth == 0 && eq_pos.is_none() => {
                    eq_pos = Some(buf.len());
                    buf.push(c);
                }
                other => buf.push(other),
            }
        }
        tokens.push(Token { text: buf, eq_pos });
    }

    Ok(tokens)
}

/// Quote a value for export unless it is a plain word or a bracketed vector.
fn quote(value: &str) -> String {
    let bracketed = value.starts_with('[') && value.ends_with(']') && !value.contains('"');
    if bracketed {
        return value.to_string();
    }
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '=' | '[' | ']' | '\\'));
    if !needs_quotes {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
