//! Just enough statement parsing for the mock to emulate transactions and
//! LISTEN / NOTIFY. Everything else is treated as an opaque query.

/// A statement as understood by [`MockPool`](crate::MockPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Begin,
    Commit,
    Rollback,
    Listen(String),
    /// `None` for `UNLISTEN *`.
    Unlisten(Option<String>),
    Notify {
        channel: String,
        payload: Option<String>,
    },
    Other {
        tag: String,
    },
}

impl Command {
    /// The command tag a server would report.
    pub fn tag(&self) -> &str {
        match self {
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Rollback => "ROLLBACK",
            Command::Listen(_) => "LISTEN",
            Command::Unlisten(_) => "UNLISTEN",
            Command::Notify { .. } => "NOTIFY",
            Command::Other { tag } => tag,
        }
    }
}

/// Classify one SQL statement.
pub fn parse_command(sql: &str) -> Command {
    let sql = sql.trim().trim_end_matches(';').trim();
    let (keyword, rest) = match sql.find(char::is_whitespace) {
        Some(idx) => (&sql[..idx], sql[idx..].trim()),
        None => (sql, ""),
    };
    match keyword.to_ascii_uppercase().as_str() {
        "BEGIN" | "START" => Command::Begin,
        "COMMIT" | "END" => Command::Commit,
        "ROLLBACK" | "ABORT" => Command::Rollback,
        "LISTEN" => Command::Listen(parse_identifier(rest).0),
        "UNLISTEN" if rest == "*" => Command::Unlisten(None),
        "UNLISTEN" => Command::Unlisten(Some(parse_identifier(rest).0)),
        "NOTIFY" => {
            let (channel, rest) = parse_identifier(rest);
            let payload = rest
                .trim_start()
                .strip_prefix(',')
                .map(|literal| parse_literal(literal.trim()));
            Command::Notify { channel, payload }
        }
        other => Command::Other {
            tag: other.to_string(),
        },
    }
}

/// Parse a possibly quoted identifier, returning it and the unparsed rest.
/// Unquoted identifiers fold to lower case, as the server does.
fn parse_identifier(input: &str) -> (String, &str) {
    if let Some(quoted) = input.strip_prefix('"') {
        let mut ident = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    ident.push('"');
                    continue;
                }
                return (ident, &quoted[idx + 1..]);
            }
            ident.push(c);
        }
        (ident, "")
    } else {
        let end = input
            .find(|c: char| c == ',' || c.is_whitespace())
            .unwrap_or(input.len());
        (input[..end].to_lowercase(), &input[end..])
    }
}

/// Parse a `'...'` or `E'...'` string literal.
fn parse_literal(input: &str) -> String {
    let (escaped, body) = match input.strip_prefix(['E', 'e']) {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    let body = body.strip_prefix('\'').unwrap_or(body);

    let mut out = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            '\'' => break,
            '\\' if escaped => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_keywords() {
        assert_eq!(parse_command("BEGIN"), Command::Begin);
        assert_eq!(parse_command("commit;"), Command::Commit);
        assert_eq!(parse_command(" ROLLBACK "), Command::Rollback);
    }

    #[test]
    fn listen_and_unlisten() {
        assert_eq!(parse_command("LISTEN \"Test\""), Command::Listen("Test".into()));
        assert_eq!(parse_command("LISTEN Test"), Command::Listen("test".into()));
        assert_eq!(parse_command("UNLISTEN \"test\""), Command::Unlisten(Some("test".into())));
        assert_eq!(parse_command("UNLISTEN *"), Command::Unlisten(None));
    }

    #[test]
    fn notify_with_and_without_payload() {
        assert_eq!(
            parse_command("NOTIFY \"test\""),
            Command::Notify {
                channel: "test".into(),
                payload: None
            }
        );
        assert_eq!(
            parse_command("NOTIFY \"test\", 'it''s'"),
            Command::Notify {
                channel: "test".into(),
                payload: Some("it's".into())
            }
        );
        assert_eq!(
            parse_command(r#"NOTIFY "test", E'["a\\b"]'"#),
            Command::Notify {
                channel: "test".into(),
                payload: Some(r#"["a\b"]"#.into())
            }
        );
    }

    #[test]
    fn other_statements_keep_their_tag() {
        assert_eq!(parse_command("select * from accounts").tag(), "SELECT");
        assert_eq!(parse_command("INSERT INTO t VALUES (1)").tag(), "INSERT");
    }
}
