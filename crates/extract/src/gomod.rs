//! `go.mod` parsing, limited to the directives that affect ingestion.

use std::cmp::Ordering;

use crate::error::{ErrorKind, Result};
use crate::version::compare;

/// A retracted version, or inclusive range of versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retraction {
    pub low: String,
    pub high: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoMod {
    pub module_path: String,
    pub go_version: Option<String>,
    /// Text following `Deprecated:` in the comment attached to the module
    /// directive.
    pub deprecated: Option<String>,
    pub retractions: Vec<Retraction>,
}

impl GoMod {
    /// Returns `true` if `version` is covered by any `retract` directive.
    pub fn is_retracted(&self, version: &str) -> bool {
        self.retractions.iter().any(|r| {
            matches!(compare(&r.low, version), Ok(Ordering::Less | Ordering::Equal))
                && matches!(compare(version, &r.high), Ok(Ordering::Less | Ordering::Equal))
        })
    }
}

/// Split a line into code and trailing `//` comment (outside quotes).
fn split_comment(line: &str) -> (&str, Option<&str>) {
    let mut quote = None;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match (quote, b) {
            (None, b'"' | b'`') => quote = Some(b),
            (Some(q), _) if b == q => quote = None,
            (None, b'/') if bytes.get(i + 1) == Some(&b'/') => {
                return (line[..i].trim(), Some(line[i + 2..].trim()));
            },
            _ => {},
        }
    }
    (line.trim(), None)
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| token.strip_prefix('`').and_then(|t| t.strip_suffix('`')))
        .unwrap_or(token)
}

fn deprecation(comments: &[&str]) -> Option<String> {
    let start = comments.iter().position(|c| c.starts_with("Deprecated:"))?;
    let mut text = comments[start].trim_start_matches("Deprecated:").trim().to_string();
    for line in comments[start + 1..].iter().take_while(|line| !line.is_empty()) {
        text.push(' ');
        text.push_str(line);
    }
    Some(text.trim().to_string())
}

fn retraction(line: &str, rationale: String) -> Result<Retraction> {
    let invalid = || ErrorKind::InvalidGoMod(format!("invalid retract: {line}"));
    let (low, high) = match line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
        Some(range) => {
            let Some((low, high)) = range.split_once(',') else {
                exn::bail!(invalid());
            };
            (unquote(low.trim()), unquote(high.trim()))
        },
        None => (unquote(line), unquote(line)),
    };
    if compare(low, high).is_err() {
        exn::bail!(invalid());
    }
    Ok(Retraction { low: low.to_string(), high: high.to_string(), rationale })
}

/// Parse a `go.mod` file. A `module` directive is required.
pub fn parse_go_mod(contents: &[u8]) -> Result<GoMod> {
    let Ok(text) = std::str::from_utf8(contents) else {
        exn::bail!(ErrorKind::InvalidGoMod("invalid UTF-8".to_string()));
    };
    let mut go_mod = GoMod::default();
    let mut module_seen = false;
    let mut block: Option<&str> = None;
    let mut pending: Vec<&str> = Vec::new();

    for raw in text.lines() {
        let (code, comment) = split_comment(raw);
        if code.is_empty() {
            match comment {
                Some(comment) => pending.push(comment),
                None => pending.clear(),
            }
            continue;
        }
        let mut notes = std::mem::take(&mut pending);
        notes.extend(comment);

        if let Some(verb) = block {
            if code == ")" {
                block = None;
            } else if verb == "retract" {
                go_mod.retractions.push(retraction(code, notes.join("\n"))?);
            }
            continue;
        }

        let (verb, rest) = code.split_once(char::is_whitespace).unwrap_or((code, ""));
        let rest = rest.trim();
        if rest == "(" {
            block = Some(verb);
            continue;
        }
        match verb {
            "module" => {
                if module_seen || rest.is_empty() {
                    exn::bail!(ErrorKind::InvalidGoMod(format!("invalid module directive: {code}")));
                }
                module_seen = true;
                go_mod.module_path = unquote(rest).to_string();
                go_mod.deprecated = deprecation(&notes);
            },
            "go" => go_mod.go_version = Some(rest.to_string()),
            "retract" => go_mod.retractions.push(retraction(rest, notes.join("\n"))?),
            _ => {},
        }
    }

    if !module_seen {
        exn::bail!(ErrorKind::InvalidGoMod("missing module directive".to_string()));
    }
    Ok(go_mod)
}
