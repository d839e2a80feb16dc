use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Rewrite generated DDL and sort table dumps for schema migrations",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rename, drop, and reorder columns in generated DDL scripts
    RewriteDdl(RewriteDdlArgs),
    /// Sort the data rows of tab-delimited COPY dumps in place
    SortDump(SortDumpArgs),
    /// Show configured column maps and sort orders
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
pub struct RewriteDdlArgs {
    /// DDL script(s) to rewrite
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// YAML migration config with column maps and export settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Output path (single input only; defaults to <name>_UpdatedColumnNames.<ext>)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Tables to leave out of the rewritten script, as `table` or `schema.table`
    #[arg(long = "skip-table", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub skip_tables: Vec<String>,
    /// Character encoding of the input scripts (BOM-sniffed when omitted)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Character encoding of the rewritten scripts (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print a unified diff of every rewritten script
    #[arg(long)]
    pub diff: bool,
    /// Write per-file rewrite counters to this JSON file
    #[arg(long = "summary-json")]
    pub summary_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SortDumpArgs {
    /// Dump file(s) to sort in place
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// Tab-delimited sort-order file (table, column numbers, numeric flag)
    #[arg(short = 's', long = "sort-order")]
    pub sort_order: PathBuf,
    /// Table name to look up instead of the one on the COPY line
    #[arg(long)]
    pub table: Option<String>,
    /// Keep each unsorted original in a PreSort directory beside it
    #[arg(long)]
    pub archive: bool,
    /// Write per-file sort results to this JSON file
    #[arg(long = "summary-json")]
    pub summary_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// YAML migration config to display
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Sort-order file to display
    #[arg(short = 's', long = "sort-order")]
    pub sort_order: Option<PathBuf>,
    /// Only show this table, as `table` or `schema.table`
    #[arg(long)]
    pub table: Option<String>,
    /// Find the source column that maps to this target column name
    #[arg(long = "target-column", requires = "table")]
    pub target_column: Option<String>,
}
