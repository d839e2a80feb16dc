//! Deterministic row ordering for tab-delimited table dumps.
//!
//! A dump is split into the preamble, the `COPY ... FROM stdin;` line, the
//! data rows, the `\.` end-of-data line and the trailer. Only the data rows
//! are reordered; every other line is written back unchanged. Lines are
//! handled as bytes, so the dump's client encoding never matters, and all
//! of them are written with `\n` terminators.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, bail};
use log::{info, warn};
use regex::bytes::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    cli::SortDumpArgs,
    column_map::TableName,
    diagnostics::{DiagnosticSink, LogSink},
    io_utils::{self, RawLines, StagedFile},
    rows::{DataRow, promote_numeric_columns, sort_rows},
    sort_order::{SortOrders, SortSpec},
};

/// Subdirectory, next to the dump, that receives the unsorted original.
pub const ARCHIVE_DIR: &str = "PreSort";

pub const END_OF_DATA: &str = "\\.";

static COPY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*COPY\s+(?:(?P<schema>"(?-u:[^"])+"|[\w$]+)\s*\.\s*)?(?P<table>"(?-u:[^"])+"|[\w$]+)\s*(?:\((?-u:[^)])*\))?\s*FROM\s+stdin\b"#,
    )
    .expect("copy marker pattern")
});

fn copy_table(line: &[u8]) -> Option<TableName> {
    let caps = COPY_MARKER.captures(line)?;
    let unquote = |text: &[u8]| {
        String::from_utf8_lossy(text)
            .trim_matches('"')
            .to_string()
    };
    Some(TableName::new(
        caps.name("schema").map(|m| unquote(m.as_bytes())),
        unquote(caps.name("table")?.as_bytes()),
    ))
}

pub fn is_end_of_data(line: &[u8]) -> bool {
    line.starts_with(END_OF_DATA.as_bytes())
}

#[derive(Debug, Clone)]
pub struct DumpFile {
    pub preamble: Vec<Vec<u8>>,
    pub copy_marker: Vec<u8>,
    /// Table named by the copy marker.
    pub table: TableName,
    pub rows: Vec<DataRow>,
    pub end_marker: Vec<u8>,
    pub trailer: Vec<Vec<u8>>,
}

#[derive(Debug)]
pub enum ParsedDump {
    Complete(DumpFile),
    NoCopyMarker,
    NoEndMarker { table: TableName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Preamble,
    Data,
    Trailer,
}

impl DumpFile {
    pub fn read<R: BufRead>(input: R) -> io::Result<ParsedDump> {
        let mut preamble = Vec::new();
        let mut copy = None;
        let mut rows = Vec::new();
        let mut end_marker = None;
        let mut trailer = Vec::new();
        let mut region = Region::Preamble;
        for line in RawLines::new(input) {
            let body = line?;
            match region {
                Region::Preamble => match copy_table(&body) {
                    Some(table) => {
                        copy = Some((body, table));
                        region = Region::Data;
                    }
                    None => preamble.push(body),
                },
                Region::Data if is_end_of_data(&body) => {
                    end_marker = Some(body);
                    region = Region::Trailer;
                }
                Region::Data => rows.push(DataRow::parse(body)),
                Region::Trailer => trailer.push(body),
            }
        }
        let Some((copy_marker, table)) = copy else {
            return Ok(ParsedDump::NoCopyMarker);
        };
        let Some(end_marker) = end_marker else {
            return Ok(ParsedDump::NoEndMarker { table });
        };
        Ok(ParsedDump::Complete(DumpFile {
            preamble,
            copy_marker,
            table,
            rows,
            end_marker,
            trailer,
        }))
    }

    /// Sorts the data rows by `spec` after numeric promotion and returns the
    /// spec that was actually applied.
    pub fn sort(&mut self, spec: &SortSpec) -> SortSpec {
        let effective = promote_numeric_columns(spec, &self.rows);
        sort_rows(&mut self.rows, &effective);
        effective
    }

    pub fn write_to<W: Write>(&self, output: &mut W) -> io::Result<()> {
        let lines = self
            .preamble
            .iter()
            .chain([&self.copy_marker])
            .chain(self.rows.iter().map(|row| &row.raw))
            .chain([&self.end_marker])
            .chain(&self.trailer);
        for line in lines {
            output.write_all(line)?;
            output.write_all(b"\n")?;
        }
        output.flush()
    }
}

/// Passes writes through while hashing them.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOutcome {
    Sorted,
    NoSortSpec,
    NoCopyMarker,
    NoEndMarker,
    Failed,
}

impl SortOutcome {
    /// Outcomes that leave the file untouched.
    pub fn is_noop(self) -> bool {
        matches!(
            self,
            SortOutcome::NoSortSpec | SortOutcome::NoCopyMarker | SortOutcome::NoEndMarker
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SortReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub outcome: SortOutcome,
    pub rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub promoted_columns: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SortReport {
    fn untouched(path: &Path, table: Option<&TableName>, outcome: SortOutcome) -> Self {
        Self {
            path: path.to_path_buf(),
            table: table.map(TableName::qualified),
            outcome,
            rows: 0,
            promoted_columns: Vec::new(),
            sha256: None,
            archived: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SortOptions {
    /// Overrides the table named by the copy marker.
    pub table: Option<TableName>,
    /// Keep the unsorted original under [`ARCHIVE_DIR`].
    pub archive: bool,
}

/// Sorts the dump at `path` in place. Files without a sort spec or without
/// a complete data section are reported and left untouched.
pub fn sort_dump_file(
    path: &Path,
    orders: &SortOrders,
    options: &SortOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<SortReport> {
    let file = File::open(path).with_context(|| format!("Opening dump file {path:?}"))?;
    let parsed = DumpFile::read(BufReader::new(file))
        .with_context(|| format!("Reading dump file {path:?}"))?;
    let mut dump = match parsed {
        ParsedDump::Complete(dump) => dump,
        ParsedDump::NoCopyMarker => {
            sink.warning(format!(
                "{path:?} has no COPY ... FROM stdin line; left unsorted"
            ));
            return Ok(SortReport::untouched(path, None, SortOutcome::NoCopyMarker));
        }
        ParsedDump::NoEndMarker { table } => {
            sink.warning(format!(
                "{path:?} has no {END_OF_DATA} line after the COPY data for {table}; left unsorted"
            ));
            return Ok(SortReport::untouched(
                path,
                Some(&table),
                SortOutcome::NoEndMarker,
            ));
        }
    };

    let table = options.table.clone().unwrap_or_else(|| dump.table.clone());
    let Some(spec) = orders.resolve(&table).filter(|spec| !spec.is_empty()) else {
        sink.status(format!("No sort order for table {table}; {path:?} left as-is"));
        return Ok(SortReport::untouched(
            path,
            Some(&table),
            SortOutcome::NoSortSpec,
        ));
    };

    let effective = dump.sort(spec);
    let promoted_columns = effective
        .iter()
        .zip(spec.iter())
        .filter(|(applied, configured)| applied.numeric && !configured.numeric)
        .map(|(applied, _)| applied.index)
        .collect::<Vec<_>>();
    for index in &promoted_columns {
        sink.status(format!("Column {index} of table {table} sorts as numeric"));
    }

    let mut staged = StagedFile::create(path)?;
    let sha256 = {
        let mut writer = HashingWriter::new(BufWriter::new(staged.file()));
        dump.write_to(&mut writer)
            .with_context(|| format!("Writing sorted rows for {path:?}"))?;
        writer.finish()
    };
    let archived = if options.archive {
        Some(io_utils::archive_file(path, ARCHIVE_DIR)?)
    } else {
        None
    };
    staged.commit()?;

    Ok(SortReport {
        path: path.to_path_buf(),
        table: Some(table.qualified()),
        outcome: SortOutcome::Sorted,
        rows: dump.rows.len(),
        promoted_columns,
        sha256: Some(sha256),
        archived,
        error: None,
    })
}

pub fn execute(args: &SortDumpArgs) -> Result<()> {
    if args.table.is_some() && args.inputs.len() > 1 {
        bail!("--table can only be used with a single dump file");
    }
    let mut sink = LogSink;
    let load = SortOrders::load(&args.sort_order, &mut sink)?;
    if !load.is_clean() {
        warn!(
            "{} sort-order entr{} in {:?} could not be loaded",
            load.errors.len(),
            if load.errors.len() == 1 { "y" } else { "ies" },
            args.sort_order
        );
    }
    let options = SortOptions {
        table: args.table.as_deref().map(TableName::parse),
        archive: args.archive,
    };

    let mut reports = Vec::with_capacity(args.inputs.len());
    let mut failures = 0usize;
    for input in &args.inputs {
        match sort_dump_file(input, &load.orders, &options, &mut sink) {
            Ok(report) => {
                if report.outcome == SortOutcome::Sorted {
                    info!(
                        "✓ Sorted {} row(s) of {} in '{}' (sha256 {})",
                        report.rows,
                        report.table.as_deref().unwrap_or("?"),
                        input.display(),
                        report.sha256.as_deref().unwrap_or_default()
                    );
                }
                reports.push(report);
            }
            Err(err) => {
                sink.error(format!("Failed to sort {input:?}: {err:#}"));
                failures += 1;
                let mut report = SortReport::untouched(input, None, SortOutcome::Failed);
                report.error = Some(format!("{err:#}"));
                reports.push(report);
            }
        }
    }

    if let Some(path) = &args.summary_json {
        io_utils::save_json(path, &reports)?;
    }
    if failures > 0 {
        bail!(
            "{failures} of {} dump file(s) could not be sorted",
            args.inputs.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "SET client_encoding = 'UTF8';\n\nCOPY public.orders (id, name) FROM stdin;\n3\tc\n1\ta\n2\tb\n\\.\n\nSELECT 1;\n";

    fn read(text: &str) -> ParsedDump {
        DumpFile::read(text.as_bytes()).unwrap()
    }

    #[test]
    fn copy_marker_names_the_table() {
        let table = copy_table(b"COPY \"Sales\".\"Order Lines\" (\"Id\") FROM stdin;").unwrap();
        assert_eq!(table.schema.as_deref(), Some("Sales"));
        assert_eq!(table.name, "Order Lines");
        assert_eq!(
            copy_table(b"COPY orders FROM stdin;").unwrap(),
            TableName::parse("orders")
        );
        assert!(copy_table(b"COPY orders TO stdout;").is_none());
        assert_eq!(
            copy_table(b"COPY \"caf\xe9\" (\"r\xe9f\") FROM stdin;")
                .unwrap()
                .name,
            "caf\u{fffd}"
        );
    }

    #[test]
    fn regions_are_split_around_markers() {
        let ParsedDump::Complete(dump) = read(DUMP) else {
            panic!("expected complete dump");
        };
        assert_eq!(
            dump.preamble,
            vec![b"SET client_encoding = 'UTF8';".to_vec(), Vec::new()]
        );
        assert_eq!(dump.table, TableName::parse("public.orders"));
        assert_eq!(dump.rows.len(), 3);
        assert_eq!(dump.end_marker, b"\\.");
        assert_eq!(dump.trailer, vec![Vec::new(), b"SELECT 1;".to_vec()]);
    }

    #[test]
    fn sorted_dump_keeps_non_data_lines() {
        let ParsedDump::Complete(mut dump) = read(DUMP) else {
            panic!("expected complete dump");
        };
        let spec = SortSpec::new(vec![crate::sort_order::SortColumn {
            index: 1,
            numeric: false,
        }]);
        let effective = dump.sort(&spec);
        assert!(effective.columns[0].numeric);
        let mut output = Vec::new();
        dump.write_to(&mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "SET client_encoding = 'UTF8';\n\nCOPY public.orders (id, name) FROM stdin;\n1\ta\n2\tb\n3\tc\n\\.\n\nSELECT 1;\n"
        );
    }

    #[test]
    fn incomplete_dumps_are_detected() {
        assert!(matches!(read("SELECT 1;\n"), ParsedDump::NoCopyMarker));
        assert!(matches!(
            read("COPY orders FROM stdin;\n1\n"),
            ParsedDump::NoEndMarker { .. }
        ));
    }

    #[test]
    fn latin1_dump_round_trips_byte_for_byte() {
        let input: &[u8] = b"SET client_encoding = 'LATIN1';\nCOPY villes (nom) FROM stdin;\nz\xfcrich\ncaf\xe9\n\\.\n";
        let ParsedDump::Complete(mut dump) = DumpFile::read(input).unwrap() else {
            panic!("expected complete dump");
        };
        dump.sort(&SortSpec::new(vec![crate::sort_order::SortColumn {
            index: 1,
            numeric: false,
        }]));
        let mut output = Vec::new();
        dump.write_to(&mut output).unwrap();
        assert_eq!(
            output,
            b"SET client_encoding = 'LATIN1';\nCOPY villes (nom) FROM stdin;\ncaf\xe9\nz\xfcrich\n\\.\n"
        );
    }

    #[test]
    fn hashing_writer_matches_direct_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"rows\n").unwrap();
        assert_eq!(writer.finish(), format!("{:x}", Sha256::digest(b"rows\n")));
    }
}
