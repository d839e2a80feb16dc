//! Recognition of the statement lines that open a rewritable DDL block.

use std::{fmt, ops::Range, sync::LazyLock};

use regex::Regex;

use super::token::{captured_ident, captured_table, ident_pattern, qualified_pattern};
use crate::column_map::TableName;

/// Literal batch terminator line.
pub const BATCH_TERMINATOR: &str = "GO";

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*CREATE\s+TABLE\s+{}",
        qualified_pattern("")
    ))
    .expect("create table pattern")
});

static CREATE_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*CREATE\s+(?:UNIQUE\s+)?(?:(?:NON)?CLUSTERED\s+)?INDEX\s+{}\s+ON\s+{}",
        ident_pattern("index"),
        qualified_pattern("")
    ))
    .expect("create index pattern")
});

static CREATE_VIEW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*CREATE\s+(?:OR\s+ALTER\s+)?VIEW\s+{}",
        qualified_pattern("")
    ))
    .expect("create view pattern")
});

static ADD_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*ALTER\s+TABLE\s+{}.*\bADD\b.*\bDEFAULT\b.*\bFOR\s+{}",
        qualified_pattern(""),
        ident_pattern("column")
    ))
    .expect("default constraint pattern")
});

static ADD_FOREIGN_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*ALTER\s+TABLE\s+{}.*\bADD\b.*\bFOREIGN\s+KEY\s*\((?P<columns>[^)]*)\)",
        qualified_pattern("")
    ))
    .expect("foreign key constraint pattern")
});

static REFERENCES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*REFERENCES\s+{}\s*\((?P<columns>[^)]*)\)",
        qualified_pattern("ref_")
    ))
    .expect("references pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    CreateIndex { index: String },
    CreateView,
    /// `ALTER TABLE ... ADD ... DEFAULT ... FOR [column]`
    AddDefault { column: String },
    /// `ALTER TABLE ... ADD ... FOREIGN KEY ([column], ...)`
    AddForeignKey { column: String },
}

impl StatementKind {
    fn label(&self) -> &'static str {
        match self {
            StatementKind::CreateTable => "CREATE TABLE",
            StatementKind::CreateIndex { .. } => "CREATE INDEX",
            StatementKind::CreateView => "CREATE VIEW",
            StatementKind::AddDefault { .. } => "DEFAULT constraint",
            StatementKind::AddForeignKey { .. } => "FOREIGN KEY constraint",
        }
    }
}

/// An opening line recognised as the start of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: TableName,
    /// Span of the constrained column token(s) within the opening line.
    pub column_span: Option<Range<usize>>,
}

impl Statement {
    /// Matches `line` against the opening patterns in priority order.
    pub fn recognize(line: &str) -> Option<Statement> {
        if let Some(caps) = CREATE_TABLE.captures(line) {
            return Some(Statement {
                kind: StatementKind::CreateTable,
                table: captured_table(&caps, "")?,
                column_span: None,
            });
        }
        if let Some(caps) = CREATE_INDEX.captures(line) {
            return Some(Statement {
                kind: StatementKind::CreateIndex {
                    index: captured_ident(&caps, "index")?.name,
                },
                table: captured_table(&caps, "")?,
                column_span: None,
            });
        }
        if let Some(caps) = CREATE_VIEW.captures(line) {
            return Some(Statement {
                kind: StatementKind::CreateView,
                table: captured_table(&caps, "")?,
                column_span: None,
            });
        }
        if let Some(caps) = ADD_DEFAULT.captures(line) {
            let column = captured_ident(&caps, "column")?;
            return Some(Statement {
                kind: StatementKind::AddDefault {
                    column: column.name,
                },
                table: captured_table(&caps, "")?,
                column_span: Some(column.token),
            });
        }
        if let Some(caps) = ADD_FOREIGN_KEY.captures(line) {
            let columns = caps.name("columns")?;
            let column = super::token::unquote(columns.as_str().split(',').next()?.trim());
            return Some(Statement {
                kind: StatementKind::AddForeignKey {
                    column: column.to_string(),
                },
                table: captured_table(&caps, "")?,
                column_span: Some(columns.range()),
            });
        }
        None
    }

    /// CREATE TABLE and CREATE INDEX bodies have their column tokens renamed;
    /// views and constraints are only filtered.
    pub fn renames_columns(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::CreateTable | StatementKind::CreateIndex { .. }
        )
    }

    pub fn is_create_table(&self) -> bool {
        self.kind == StatementKind::CreateTable
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.kind.label(), self.table)
    }
}

/// A `REFERENCES [schema].[table] ([column], ...)` continuation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyReference {
    pub table: TableName,
    pub columns: Range<usize>,
}

impl ForeignKeyReference {
    pub fn parse(line: &str) -> Option<Self> {
        let caps = REFERENCES.captures(line)?;
        Some(ForeignKeyReference {
            table: captured_table(&caps, "ref_")?,
            columns: caps.name("columns")?.range(),
        })
    }
}

pub fn is_batch_terminator(line: &str) -> bool {
    line.trim() == BATCH_TERMINATOR
}
