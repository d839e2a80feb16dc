//! Identifier token matching for generated DDL lines.
//!
//! Scripts produced by vendor scripting engines delimit identifiers with
//! brackets (`[Name]`) or double quotes (`"Name"`); hand-edited scripts
//! sometimes use bare names. [`find_identifier()`] locates the first
//! identifier on a line with two explicit branches so the text around it
//! can be reassembled exactly.

use std::{ops::Range, sync::LazyLock};

use regex::{Captures, Regex};

use crate::column_map::{ColumnNameMap, TableName, is_skip_sentinel};

static BRACKETED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<prefix>[^\["]*)(?:\[(?P<bracketed>[^\]]+)\]|"(?P<quoted>[^"]+)")(?P<suffix>.*)$"#,
    )
    .expect("bracketed identifier pattern")
});

static BARE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>\s*)(?P<name>[A-Za-z_#@][\w$#@]*)(?P<suffix>(?:[\s,].*)?)$")
        .expect("bare identifier pattern")
});

static LIST_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[^\]]+\]|"[^"]+"|[A-Za-z_#@][\w$#@]*"#).expect("identifier list pattern")
});

/// A line split around its first identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierToken<'a> {
    pub prefix: &'a str,
    pub name: &'a str,
    pub suffix: &'a str,
}

impl IdentifierToken<'_> {
    /// Rebuilds the line with `target` in place of the identifier, always bracketed.
    pub fn render(&self, target: &str) -> String {
        format!("{}[{}]{}", self.prefix, target, self.suffix)
    }
}

/// Finds the first bracketed or quoted identifier on `line`; only when the
/// line has no delimiters at all does it fall back to a leading bare word.
pub fn find_identifier(line: &str) -> Option<IdentifierToken<'_>> {
    if let Some(caps) = BRACKETED_TOKEN.captures(line) {
        let name = caps.name("bracketed").or_else(|| caps.name("quoted"))?;
        return Some(IdentifierToken {
            prefix: caps.name("prefix").map_or("", |m| m.as_str()),
            name: name.as_str(),
            suffix: caps.name("suffix").map_or("", |m| m.as_str()),
        });
    }
    if line.contains(['[', ']', '"']) {
        return None;
    }
    let caps = BARE_TOKEN.captures(line)?;
    Some(IdentifierToken {
        prefix: caps.name("prefix").map_or("", |m| m.as_str()),
        name: caps.name("name")?.as_str(),
        suffix: caps.name("suffix").map_or("", |m| m.as_str()),
    })
}

/// Regex fragment matching one identifier in any of the three forms.
///
/// The captured name lands in `{group}_b`, `{group}_q` or `{group}_w`;
/// read it back with [`captured_ident()`].
pub(crate) fn ident_pattern(group: &str) -> String {
    format!(
        r#"(?:\[(?P<{group}_b>[^\]]+)\]|"(?P<{group}_q>[^"]+)"|(?P<{group}_w>[A-Za-z_#@][\w$#@]*))"#
    )
}

/// Regex fragment matching `schema.table` or a bare `table`.
pub(crate) fn qualified_pattern(prefix: &str) -> String {
    format!(
        r"(?:{}\s*\.\s*)?{}",
        ident_pattern(&format!("{prefix}schema")),
        ident_pattern(&format!("{prefix}table"))
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CapturedIdent {
    pub name: String,
    /// Byte range of the whole token, delimiters included.
    pub token: Range<usize>,
}

pub(crate) fn captured_ident(caps: &Captures<'_>, group: &str) -> Option<CapturedIdent> {
    [("b", 1), ("q", 1), ("w", 0)]
        .into_iter()
        .find_map(|(form, delimiter_len)| {
            caps.name(&format!("{group}_{form}"))
                .map(|m| CapturedIdent {
                    name: m.as_str().to_string(),
                    token: m.start() - delimiter_len..m.end() + delimiter_len,
                })
        })
}

pub(crate) fn captured_table(caps: &Captures<'_>, prefix: &str) -> Option<TableName> {
    let table = captured_ident(caps, &format!("{prefix}table"))?;
    let schema = captured_ident(caps, &format!("{prefix}schema")).map(|ident| ident.name);
    Some(TableName::new(schema, table.name))
}

pub(crate) fn unquote(token: &str) -> &str {
    token
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .or_else(|| {
            token
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
        })
        .unwrap_or(token)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListRewrite {
    Unchanged,
    Rewritten(String),
    /// The list names a column that the map drops.
    DropsColumn(String),
}

/// Renames every mapped identifier inside `text[span]`.
pub(crate) fn rewrite_identifier_list(
    text: &str,
    span: Range<usize>,
    map: &ColumnNameMap,
) -> ListRewrite {
    let list = &text[span.clone()];
    let mut rewritten = String::with_capacity(text.len() + 16);
    rewritten.push_str(&text[..span.start]);
    let mut copied_to = 0usize;
    for token in LIST_TOKEN.find_iter(list) {
        let name = unquote(token.as_str());
        let Some(target) = map.get(name) else {
            continue;
        };
        if is_skip_sentinel(target) {
            return ListRewrite::DropsColumn(name.to_string());
        }
        rewritten.push_str(&list[copied_to..token.start()]);
        rewritten.push('[');
        rewritten.push_str(target);
        rewritten.push(']');
        copied_to = token.end();
    }
    if copied_to == 0 {
        return ListRewrite::Unchanged;
    }
    rewritten.push_str(&list[copied_to..]);
    rewritten.push_str(&text[span.end..]);
    ListRewrite::Rewritten(rewritten)
}
