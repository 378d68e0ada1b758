//! Parsing of `{{...}}` reference tokens.
//!
//! Grammar (whitespace inside the braces is trimmed):
//!
//! ```text
//! $$column.args.NAME        argument of the column being resolved
//! $$table.args.NAME         query-level table argument
//! $name                     physical column of the current alias
//! name[arg:value]...        sibling logical column, optionally pinning arguments
//! join.join2.leaf           joined column; leaf may be `$physical` or pinned
//! ```

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::Bindings;
use crate::semantic::error::{SemanticError, SemanticResult};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());

/// A parsed reference token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    ColumnArgument(String),
    TableArgument(String),
    Physical(String),
    Logical { column: String, pinned: Bindings },
    /// `path` names the joins in traversal order; `leaf` is `Physical` or `Logical`.
    Joined { path: Vec<String>, leaf: Box<Reference> },
}

/// A token occurrence inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// Byte range of the whole `{{...}}` occurrence.
    pub span: Range<usize>,
    /// Trimmed body.
    pub body: &'a str,
}

/// All reference tokens in a template, in order.
pub fn tokens(template: &str) -> Vec<Token<'_>> {
    TOKEN
        .captures_iter(template)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            Some(Token {
                span: whole.range(),
                body: body.as_str(),
            })
        })
        .collect()
}

/// Replace every token with the result of `f`, stopping at the first error.
pub fn rewrite<F>(template: &str, mut f: F) -> SemanticResult<String>
where
    F: FnMut(&str) -> SemanticResult<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for token in tokens(template) {
        out.push_str(&template[last..token.span.start]);
        out.push_str(&f(token.body)?);
        last = token.span.end;
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Parse a trimmed token body.
pub fn parse(body: &str) -> SemanticResult<Reference> {
    let invalid = || SemanticError::InvalidReference(format!("'{{{{{}}}}}'", body));

    if let Some(rest) = body.strip_prefix("$$") {
        let (scope, name) = rest
            .split_once(".args.")
            .ok_or_else(invalid)?;
        if !is_identifier(name) {
            return Err(invalid());
        }
        return match scope {
            "column" => Ok(Reference::ColumnArgument(name.to_string())),
            "table" => Ok(Reference::TableArgument(name.to_string())),
            _ => Err(invalid()),
        };
    }

    // Split off pinned arguments before splitting the path on dots,
    // since pinned values may contain dots.
    let (head, pins) = match body.find('[') {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => (body, ""),
    };
    let pinned = parse_pins(pins).ok_or_else(invalid)?;

    let mut segments: Vec<&str> = head.split('.').map(str::trim).collect();
    let leaf_name = segments.pop().ok_or_else(invalid)?;
    if segments.iter().any(|s| !is_identifier(s)) {
        return Err(invalid());
    }

    let leaf = match leaf_name.strip_prefix('$') {
        Some(physical) if pinned.is_empty() && is_identifier(physical) => {
            Reference::Physical(physical.to_string())
        }
        Some(_) => return Err(invalid()),
        None if is_identifier(leaf_name) => Reference::Logical {
            column: leaf_name.to_string(),
            pinned,
        },
        None => return Err(invalid()),
    };

    if segments.is_empty() {
        Ok(leaf)
    } else {
        Ok(Reference::Joined {
            path: segments.into_iter().map(String::from).collect(),
            leaf: Box::new(leaf),
        })
    }
}

/// `[a:1][b:x]` → {a: 1, b: x}. `None` on malformed input.
fn parse_pins(mut pins: &str) -> Option<Bindings> {
    let mut bindings = Bindings::new();
    while !pins.is_empty() {
        let rest = pins.strip_prefix('[')?;
        let end = rest.find(']')?;
        let (name, value) = rest[..end].split_once(':')?;
        let name = name.trim();
        if !is_identifier(name) {
            return None;
        }
        bindings.insert(name.to_string(), value.trim().to_string());
        pins = rest[end + 1..].trim_start();
    }
    Some(bindings)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
