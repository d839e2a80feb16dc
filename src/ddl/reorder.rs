//! Moves the primary-key column to the front of a buffered CREATE TABLE block.
//!
//! The block is split into three regions: prefix lines up to the first
//! column definition, one entry per column definition (continuation lines
//! stay attached to the column above them), and suffix lines starting at
//! the first table constraint or closing parenthesis. Only the column
//! region is ever rearranged.

use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use super::{
    statement::is_batch_terminator,
    token::{captured_ident, find_identifier, ident_pattern},
};
use crate::{
    column_map::{TableName, same_identifier},
    diagnostics::DiagnosticSink,
    io_utils::SourceLine,
};

static TABLE_PRIMARY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)\bCONSTRAINT\b.*?\bPRIMARY\s+KEY\b[^(]*\(\s*{}",
        ident_pattern("column")
    ))
    .expect("primary key constraint pattern")
});

static COLUMN_PRIMARY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").expect("column primary key pattern"));

static SUFFIX_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\)|CONSTRAINT\b|PRIMARY\s+KEY\b|UNIQUE\b|CHECK\b|FOREIGN\s+KEY\b|INDEX\b|PERIOD\s+FOR\b)",
    )
    .expect("table suffix pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Reordered,
    AlreadyFirst,
    NoPrimaryKey,
    PrimaryKeyNotFound,
}

#[derive(Debug, Clone)]
struct ColumnDefinition {
    name: String,
    lines: Vec<SourceLine>,
}

impl ColumnDefinition {
    fn last_code_line(&mut self) -> Option<&mut SourceLine> {
        self.lines
            .iter_mut()
            .rev()
            .find(|line| !line.body.trim().is_empty())
    }

    fn has_trailing_comma(&self) -> bool {
        self.lines
            .iter()
            .rev()
            .find(|line| !line.body.trim().is_empty())
            .is_some_and(|line| line.body.trim_end().ends_with(','))
    }

    fn ensure_trailing_comma(&mut self) {
        if self.has_trailing_comma() {
            return;
        }
        if let Some(line) = self.last_code_line() {
            let end = line.body.trim_end().len();
            line.body.insert(end, ',');
        }
    }

    fn strip_trailing_comma(&mut self) {
        if !self.has_trailing_comma() {
            return;
        }
        if let Some(line) = self.last_code_line() {
            let end = line.body.trim_end().len();
            line.body.remove(end - 1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Prefix,
    Columns,
    Suffix,
}

#[derive(Debug, Default)]
struct TableLayout {
    prefix: Vec<SourceLine>,
    columns: Vec<ColumnDefinition>,
    suffix: Vec<SourceLine>,
}

impl TableLayout {
    fn partition(lines: &[SourceLine], table: &TableName, sink: &mut dyn DiagnosticSink) -> Self {
        let mut layout = TableLayout::default();
        let mut region = Region::Prefix;
        let mut skipping_duplicate = false;
        for (position, line) in lines.iter().enumerate() {
            if position == 0 {
                layout.prefix.push(line.clone());
                continue;
            }
            if region != Region::Suffix
                && (is_batch_terminator(&line.body) || SUFFIX_START.is_match(&line.body))
            {
                region = Region::Suffix;
            }
            if region == Region::Suffix {
                layout.suffix.push(line.clone());
                continue;
            }
            match find_identifier(&line.body).filter(|token| token.prefix.trim().is_empty()) {
                Some(token) => {
                    region = Region::Columns;
                    if layout
                        .columns
                        .iter()
                        .any(|column| same_identifier(&column.name, token.name))
                    {
                        sink.warning(format!(
                            "Duplicate definition of column '{}' in table {table}; keeping the first",
                            token.name
                        ));
                        skipping_duplicate = true;
                    } else {
                        skipping_duplicate = false;
                        layout.columns.push(ColumnDefinition {
                            name: token.name.to_string(),
                            lines: vec![line.clone()],
                        });
                    }
                }
                None => match (region, layout.columns.last_mut()) {
                    (Region::Columns, Some(column)) => {
                        if !skipping_duplicate {
                            column.lines.push(line.clone());
                        }
                    }
                    _ => layout.prefix.push(line.clone()),
                },
            }
        }
        layout
    }

    fn discover_primary_key(&self) -> Option<String> {
        let suffix = self.suffix.iter().map(|line| line.body.as_str()).join("\n");
        if let Some(caps) = TABLE_PRIMARY_KEY.captures(&suffix) {
            return captured_ident(&caps, "column").map(|ident| ident.name);
        }
        self.columns
            .iter()
            .find(|column| {
                column
                    .lines
                    .iter()
                    .any(|line| COLUMN_PRIMARY_KEY.is_match(&line.body))
            })
            .map(|column| column.name.clone())
    }

    fn rebuild(self, primary_position: usize) -> Vec<SourceLine> {
        let TableLayout {
            prefix,
            mut columns,
            suffix,
        } = self;
        let separated = columns
            .last()
            .is_some_and(ColumnDefinition::has_trailing_comma);
        let primary = columns.remove(primary_position);
        columns.insert(0, primary);
        if !separated {
            let last = columns.len() - 1;
            for (position, column) in columns.iter_mut().enumerate() {
                if position == last {
                    column.strip_trailing_comma();
                } else {
                    column.ensure_trailing_comma();
                }
            }
        }
        prefix
            .into_iter()
            .chain(columns.into_iter().flat_map(|column| column.lines))
            .chain(suffix)
            .collect()
    }
}

/// Rebuilds a CREATE TABLE block with its primary-key column first.
///
/// `primary_key` is the caller-supplied key (already a target name); when
/// absent the key is read from the block itself. Blocks that cannot or need
/// not be reordered come back untouched.
pub fn promote_primary_key(
    lines: Vec<SourceLine>,
    primary_key: Option<&str>,
    table: &TableName,
    sink: &mut dyn DiagnosticSink,
) -> (Vec<SourceLine>, ReorderOutcome) {
    let layout = TableLayout::partition(&lines, table, sink);
    let Some(primary_key) = primary_key
        .map(str::to_string)
        .or_else(|| layout.discover_primary_key())
    else {
        sink.status(format!("No primary key found for table {table}; column order kept"));
        return (lines, ReorderOutcome::NoPrimaryKey);
    };
    let Some(position) = layout
        .columns
        .iter()
        .position(|column| same_identifier(&column.name, &primary_key))
    else {
        sink.warning(format!(
            "Primary key column '{primary_key}' is not among the columns of table {table}; column order kept"
        ));
        return (lines, ReorderOutcome::PrimaryKeyNotFound);
    };
    if position == 0 {
        sink.status(format!(
            "Primary key column '{primary_key}' is already first in table {table}"
        ));
        return (lines, ReorderOutcome::AlreadyFirst);
    }
    sink.status(format!(
        "Moved primary key column '{primary_key}' to the front of table {table}"
    ));
    (layout.rebuild(position), ReorderOutcome::Reordered)
}
