//! Column renaming, column dropping, and primary-key reordering for
//! generated DDL scripts.
//!
//! [`DdlRewriter`] makes one forward pass over a script. Lines that open a
//! recognised statement start a block; the block runs to the next lone
//! `GO` line and is written out as a unit once complete. Everything outside
//! blocks is copied through untouched.

pub mod reorder;
pub mod statement;
pub mod token;

use std::{
    io::{self, BufRead, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::info;
use serde::Serialize;
use similar::TextDiff;

use self::{
    reorder::{ReorderOutcome, promote_primary_key},
    statement::{BATCH_TERMINATOR, ForeignKeyReference, Statement, is_batch_terminator},
    token::{ListRewrite, find_identifier, rewrite_identifier_list},
};
use crate::{
    cli::RewriteDdlArgs,
    column_map::{ColumnMaps, TableName, is_skip_sentinel},
    config::MigrationConfig,
    diagnostics::{DiagnosticSink, LogSink},
    io_utils::{self, EncodingWriter, LineReader, SourceLine, StagedFile},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub blocks: usize,
    pub suppressed_blocks: usize,
    pub unterminated_blocks: usize,
    pub renamed_lines: usize,
    pub dropped_columns: usize,
    pub reordered_tables: usize,
}

#[derive(Debug)]
struct Block {
    statement: Statement,
    lines: Vec<SourceLine>,
    terminated: bool,
    /// Set when a constraint names a column the maps drop.
    dropped_column: Option<String>,
}

#[derive(Debug)]
enum State {
    ScanningForBlockStart,
    InBlock(Block),
    FlushingBlock(Block),
}

pub struct DdlRewriter<'a> {
    maps: &'a ColumnMaps,
    skip_table: &'a dyn Fn(&TableName) -> bool,
    sink: &'a mut dyn DiagnosticSink,
    summary: RewriteSummary,
}

impl<'a> DdlRewriter<'a> {
    /// `skip_table` answers whether a table is excluded from data export;
    /// complete blocks for such tables are left out of the output.
    pub fn new(
        maps: &'a ColumnMaps,
        skip_table: &'a dyn Fn(&TableName) -> bool,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self {
            maps,
            skip_table,
            sink,
            summary: RewriteSummary::default(),
        }
    }

    /// Rewrites `input` into `output`. Only I/O failures are errors.
    pub fn rewrite<R: BufRead, W: Write>(
        mut self,
        input: R,
        mut output: W,
    ) -> io::Result<RewriteSummary> {
        let mut lines = LineReader::new(input);
        let mut state = State::ScanningForBlockStart;
        loop {
            state = match state {
                State::ScanningForBlockStart => match lines.next().transpose()? {
                    None => break,
                    Some(line) => match Statement::recognize(&line.body) {
                        Some(statement) => State::InBlock(self.open_block(statement, line)),
                        None => {
                            line.write_to(&mut output)?;
                            State::ScanningForBlockStart
                        }
                    },
                },
                State::InBlock(mut block) => match lines.next().transpose()? {
                    None => State::FlushingBlock(block),
                    Some(line) if is_batch_terminator(&line.body) => {
                        block.lines.push(line);
                        block.terminated = true;
                        State::FlushingBlock(block)
                    }
                    Some(line) => {
                        self.rewrite_line(&mut block, line);
                        State::InBlock(block)
                    }
                },
                State::FlushingBlock(block) => {
                    self.flush_block(block, &mut output)?;
                    State::ScanningForBlockStart
                }
            };
        }
        output.flush()?;
        Ok(self.summary)
    }

    fn open_block(&mut self, statement: Statement, mut line: SourceLine) -> Block {
        self.summary.blocks += 1;
        let maps = self.maps;
        let mut dropped_column = None;
        if let (Some(span), Some(map)) = (statement.column_span.clone(), maps.get(&statement.table))
        {
            match rewrite_identifier_list(&line.body, span, map) {
                ListRewrite::Unchanged => {}
                ListRewrite::Rewritten(body) => {
                    line.body = body;
                    self.summary.renamed_lines += 1;
                }
                ListRewrite::DropsColumn(column) => dropped_column = Some(column),
            }
        }
        Block {
            statement,
            lines: vec![line],
            terminated: false,
            dropped_column,
        }
    }

    fn rewrite_line(&mut self, block: &mut Block, mut line: SourceLine) {
        let maps = self.maps;
        if let Some(reference) = ForeignKeyReference::parse(&line.body) {
            if let Some(map) = maps.get(&reference.table) {
                match rewrite_identifier_list(&line.body, reference.columns, map) {
                    ListRewrite::Unchanged => {}
                    ListRewrite::Rewritten(body) => {
                        line.body = body;
                        self.summary.renamed_lines += 1;
                    }
                    ListRewrite::DropsColumn(column) => {
                        block
                            .dropped_column
                            .get_or_insert(format!("{}.{column}", reference.table));
                    }
                }
                block.lines.push(line);
                return;
            }
        }

        let table = &block.statement.table;
        let map = match maps.get(table) {
            Some(map) if block.statement.renames_columns() => map,
            _ => {
                block.lines.push(line);
                return;
            }
        };
        let rewritten = find_identifier(&line.body).and_then(|token| {
            map.get(token.name).map(|target| {
                if is_skip_sentinel(target) {
                    Err(token.name.to_string())
                } else {
                    Ok(token.render(target))
                }
            })
        });
        match rewritten {
            None => block.lines.push(line),
            Some(Err(column)) => {
                self.summary.dropped_columns += 1;
                self.sink
                    .status(format!("Dropped column '{column}' from {}", block.statement));
            }
            Some(Ok(body)) => {
                line.body = body;
                self.summary.renamed_lines += 1;
                block.lines.push(line);
            }
        }
    }

    fn flush_block<W: Write>(&mut self, block: Block, output: &mut W) -> io::Result<()> {
        let Block {
            statement,
            lines,
            terminated,
            dropped_column,
        } = block;
        if terminated {
            if (self.skip_table)(&statement.table) {
                self.summary.suppressed_blocks += 1;
                self.sink.status(format!(
                    "Suppressed {statement}: table is excluded from data export"
                ));
                return Ok(());
            }
            if let Some(column) = dropped_column {
                self.summary.suppressed_blocks += 1;
                self.sink.warning(format!(
                    "Suppressed {statement}: it references dropped column '{column}'"
                ));
                return Ok(());
            }
        } else {
            self.summary.unterminated_blocks += 1;
            self.sink.warning(format!(
                "No {BATCH_TERMINATOR} line after {statement}; writing its {} buffered line(s) as-is",
                lines.len()
            ));
        }

        let lines = if statement.is_create_table() {
            self.reorder(&statement, lines)
        } else {
            lines
        };
        for line in &lines {
            line.write_to(output)?;
        }
        Ok(())
    }

    /// Only tables with a non-empty column map or a primary-key hint are
    /// reordered, so an empty map leaves the block byte-identical.
    fn reorder(&mut self, statement: &Statement, lines: Vec<SourceLine>) -> Vec<SourceLine> {
        let maps = self.maps;
        let Some(map) = maps.get(&statement.table) else {
            return lines;
        };
        let hint = maps.primary_key(&statement.table);
        if map.is_empty() && hint.is_none() {
            return lines;
        }
        let primary_key = hint.map(|source| map.target(source));
        let (lines, outcome) =
            promote_primary_key(lines, primary_key, &statement.table, &mut *self.sink);
        if outcome == ReorderOutcome::Reordered {
            self.summary.reordered_tables += 1;
        }
        lines
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RewriteOptions {
    /// Forced input encoding; `None` sniffs the BOM.
    pub input_encoding: Option<&'static Encoding>,
    pub output_encoding: &'static Encoding,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            input_encoding: None,
            output_encoding: encoding_rs::UTF_8,
        }
    }
}

/// Rewrites the script at `input` into `output` through a staged file, so
/// `output` is only replaced once the whole script has been written.
pub fn rewrite_file(
    input: &Path,
    output: &Path,
    maps: &ColumnMaps,
    skip_table: &dyn Fn(&TableName) -> bool,
    options: &RewriteOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<RewriteSummary> {
    let reader = io_utils::open_text_reader(input, options.input_encoding)?;
    let mut staged = StagedFile::create(output)?;
    let summary = {
        let writer = EncodingWriter::new(BufWriter::new(staged.file()), options.output_encoding);
        DdlRewriter::new(maps, skip_table, sink)
            .rewrite(reader, writer)
            .with_context(|| format!("Rewriting {input:?}"))?
    };
    staged.commit()?;
    Ok(summary)
}

#[derive(Debug, Serialize)]
struct RewriteReport {
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RewriteSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn execute(args: &RewriteDdlArgs) -> Result<()> {
    if args.output.is_some() && args.inputs.len() > 1 {
        bail!("--output can only be used with a single input script");
    }
    let options = RewriteOptions {
        input_encoding: io_utils::resolve_input_encoding(args.input_encoding.as_deref())?,
        output_encoding: io_utils::resolve_encoding(args.output_encoding.as_deref())?,
    };
    let mut sink = LogSink;
    let config = match &args.config {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };
    let maps = config.column_maps(&mut sink)?;
    let mut registry = config.export_registry();
    for table in &args.skip_tables {
        registry.exclude(table);
    }
    let skip_table = |table: &TableName| registry.is_excluded(table);
    info!(
        "Loaded column maps for {} table(s); {} table(s) excluded from data export",
        maps.len(),
        registry.len()
    );

    let mut reports = Vec::with_capacity(args.inputs.len());
    let mut failures = 0usize;
    for input in &args.inputs {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| io_utils::updated_ddl_path(input));
        info!("Rewriting '{}' -> '{}'", input.display(), output.display());
        match rewrite_file(input, &output, &maps, &skip_table, &options, &mut sink) {
            Ok(summary) => {
                info!(
                    "✓ {} block(s): {} line(s) renamed, {} column(s) dropped, {} table(s) reordered, {} block(s) suppressed",
                    summary.blocks,
                    summary.renamed_lines,
                    summary.dropped_columns,
                    summary.reordered_tables,
                    summary.suppressed_blocks
                );
                if args.diff {
                    print_diff(input, &output, &options)?;
                }
                reports.push(RewriteReport {
                    input: input.clone(),
                    output,
                    summary: Some(summary),
                    error: None,
                });
            }
            Err(err) => {
                sink.error(format!("Failed to rewrite {input:?}: {err:#}"));
                failures += 1;
                reports.push(RewriteReport {
                    input: input.clone(),
                    output,
                    summary: None,
                    error: Some(format!("{err:#}")),
                });
            }
        }
    }

    if let Some(path) = &args.summary_json {
        io_utils::save_json(path, &reports)?;
    }
    if failures > 0 {
        bail!(
            "{failures} of {} DDL script(s) could not be rewritten",
            args.inputs.len()
        );
    }
    Ok(())
}

fn print_diff(input: &Path, output: &Path, options: &RewriteOptions) -> Result<()> {
    let before = io_utils::read_text(input, options.input_encoding)?;
    let after = io_utils::read_text(output, Some(options.output_encoding))?;
    let diff = TextDiff::from_lines(&before, &after);
    print!(
        "{}",
        diff.unified_diff()
            .context_radius(3)
            .header(&input.display().to_string(), &output.display().to_string())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_map::{ColumnNameMap, SKIP_SENTINEL};
    use crate::diagnostics::CollectedDiagnostics;

    fn rewrite(
        input: &str,
        maps: &ColumnMaps,
        skip: &dyn Fn(&TableName) -> bool,
    ) -> (String, RewriteSummary, CollectedDiagnostics) {
        let mut sink = CollectedDiagnostics::new();
        let mut output = Vec::new();
        let summary = DdlRewriter::new(maps, skip, &mut sink)
            .rewrite(input.as_bytes(), &mut output)
            .unwrap();
        (String::from_utf8(output).unwrap(), summary, sink)
    }

    fn no_skip(_: &TableName) -> bool {
        false
    }

    #[test]
    fn lines_outside_blocks_pass_through() {
        let input = "SET ANSI_NULLS ON\r\nGO\r\nSET QUOTED_IDENTIFIER ON\r\nGO\r\n";
        let (output, summary, _) = rewrite(input, &ColumnMaps::new(), &no_skip);
        assert_eq!(output, input);
        assert_eq!(summary.blocks, 0);
    }

    #[test]
    fn index_columns_are_renamed() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("CustNo", "CustomerId");
        let mut maps = ColumnMaps::new();
        maps.insert("Orders", map);
        let input = "CREATE NONCLUSTERED INDEX [IX_Orders_Cust] ON [dbo].[Orders]\n(\n\t[CustNo] ASC\n)\nGO\n";
        let (output, summary, _) = rewrite(input, &maps, &no_skip);
        assert_eq!(
            output,
            "CREATE NONCLUSTERED INDEX [IX_Orders_Cust] ON [dbo].[Orders]\n(\n\t[CustomerId] ASC\n)\nGO\n"
        );
        assert_eq!(summary.renamed_lines, 1);
    }

    #[test]
    fn views_are_never_renamed_inline() {
        let mut map = ColumnNameMap::new("ActiveOrders");
        map.insert("CustNo", "CustomerId");
        let mut maps = ColumnMaps::new();
        maps.insert("ActiveOrders", map);
        let input = "CREATE VIEW [dbo].[ActiveOrders]\nAS\nSELECT [CustNo]\nFROM [dbo].[Orders]\nGO\n";
        let (output, _, _) = rewrite(input, &maps, &no_skip);
        assert_eq!(output, input);
    }

    #[test]
    fn default_constraint_column_is_renamed_on_its_opening_line() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("Notes", "Comment");
        let mut maps = ColumnMaps::new();
        maps.insert("Orders", map);
        let input = "ALTER TABLE [dbo].[Orders] ADD  CONSTRAINT [DF_Orders_Notes]  DEFAULT ('') FOR [Notes]\nGO\n";
        let (output, _, _) = rewrite(input, &maps, &no_skip);
        assert_eq!(
            output,
            "ALTER TABLE [dbo].[Orders] ADD  CONSTRAINT [DF_Orders_Notes]  DEFAULT ('') FOR [Comment]\nGO\n"
        );
    }

    #[test]
    fn constraint_on_dropped_column_is_suppressed() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("Legacy", SKIP_SENTINEL);
        let mut maps = ColumnMaps::new();
        maps.insert("Orders", map);
        let input = "ALTER TABLE [dbo].[Orders] ADD  DEFAULT ((0)) FOR [Legacy]\nGO\nSELECT 1\n";
        let (output, summary, sink) = rewrite(input, &maps, &no_skip);
        assert_eq!(output, "SELECT 1\n");
        assert_eq!(summary.suppressed_blocks, 1);
        assert!(sink.contains("dropped column 'Legacy'"));
    }

    #[test]
    fn skipped_tables_are_suppressed_unless_unterminated() {
        let skip = |table: &TableName| table.name == "Audit";
        let input = "CREATE TABLE [dbo].[Audit](\n\t[Id] [int] NULL\n)\nGO\n";
        let (output, summary, _) = rewrite(input, &ColumnMaps::new(), &skip);
        assert_eq!(output, "");
        assert_eq!(summary.suppressed_blocks, 1);

        let unterminated = "CREATE TABLE [dbo].[Audit](\n\t[Id] [int] NULL\n)\n";
        let (output, summary, sink) = rewrite(unterminated, &ColumnMaps::new(), &skip);
        assert_eq!(output, unterminated);
        assert_eq!(summary.unterminated_blocks, 1);
        assert!(sink.contains("No GO line"));
    }

    #[test]
    fn caller_primary_key_is_resolved_through_the_map() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("OrderNo", "OrderId");
        let mut maps = ColumnMaps::new();
        maps.insert("Orders", map);
        maps.set_primary_key("Orders", "OrderNo");
        let input = "CREATE TABLE [dbo].[Orders](\n\t[Name] [nvarchar](20) NULL,\n\t[OrderNo] [int] NOT NULL\n)\nGO\n";
        let (output, summary, _) = rewrite(input, &maps, &no_skip);
        assert_eq!(
            output,
            "CREATE TABLE [dbo].[Orders](\n\t[OrderId] [int] NOT NULL,\n\t[Name] [nvarchar](20) NULL\n)\nGO\n"
        );
        assert_eq!(summary.reordered_tables, 1);
    }

    #[test]
    fn empty_map_leaves_table_untouched_unless_a_key_is_configured() {
        let input = "CREATE TABLE [dbo].[Orders](\n\t[Name] [nvarchar](20) NULL,\n\t[OrderNo] [int] NOT NULL,\n CONSTRAINT [PK_Orders] PRIMARY KEY CLUSTERED\n(\n\t[OrderNo] ASC\n)\n)\nGO\n";
        let mut maps = ColumnMaps::new();
        maps.insert("Orders", ColumnNameMap::new("Orders"));
        let (output, summary, _) = rewrite(input, &maps, &no_skip);
        assert_eq!(output, input);
        assert_eq!(summary.reordered_tables, 0);

        maps.set_primary_key("Orders", "OrderNo");
        let (output, summary, _) = rewrite(input, &maps, &no_skip);
        assert!(output.starts_with("CREATE TABLE [dbo].[Orders](\n\t[OrderNo] [int] NOT NULL,\n"));
        assert_eq!(summary.reordered_tables, 1);
    }
}
