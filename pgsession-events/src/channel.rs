use std::fmt;

use pgsession_core::SessionError;

/// Meta channel receiving every raw notification before it is decoded.
pub const NOTIFICATION_META: &str = "$notification";

/// A channel identifier accepted by `LISTEN`, `UNLISTEN` and `NOTIFY`.
///
/// Only `^[A-Za-z][A-Za-z0-9_]*$` is accepted, so quoting never needs escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(name: &str) -> Result<Self, SessionError> {
        if is_valid_identifier(name) {
            Ok(Identifier(name.to_string()))
        } else {
            Err(SessionError::InvalidChannelName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier in double quotes, ready to splice into a statement.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A channel name as seen by the event facade.
///
/// `$`-prefixed names are local meta channels that never reach the server;
/// everything else must be a valid [`Identifier`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// Local-only channel, stored without the leading `$`.
    Meta(String),
    /// Server channel backed by `LISTEN` / `NOTIFY`.
    Channel(Identifier),
}

impl ChannelName {
    pub fn parse(name: &str) -> Result<Self, SessionError> {
        match name.strip_prefix('$') {
            Some(meta) if !meta.is_empty() => Ok(ChannelName::Meta(meta.to_string())),
            Some(_) => Err(SessionError::InvalidChannelName(name.to_string())),
            None => Identifier::parse(name).map(ChannelName::Channel),
        }
    }

    pub fn meta(name: impl Into<String>) -> Self {
        ChannelName::Meta(name.into())
    }

    pub fn notification_meta() -> Self {
        ChannelName::Meta(NOTIFICATION_META[1..].to_string())
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, ChannelName::Meta(_))
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            ChannelName::Channel(ident) => Some(ident),
            ChannelName::Meta(_) => None,
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelName::Meta(name) => write!(f, "${name}"),
            ChannelName::Channel(ident) => write!(f, "{ident}"),
        }
    }
}

impl From<Identifier> for ChannelName {
    fn from(ident: Identifier) -> Self {
        ChannelName::Channel(ident)
    }
}

/// Render `value` as a PostgreSQL string literal.
///
/// Single quotes are doubled. When the value contains a backslash the
/// escape-string form `E'...'` is used and backslashes are doubled too, so
/// the literal reads the same regardless of `standard_conforming_strings`.
pub fn quote_literal(value: &str) -> String {
    let has_backslash = value.contains('\\');
    let mut out = String::with_capacity(value.len() + 3);
    if has_backslash {
        out.push('E');
    }
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
