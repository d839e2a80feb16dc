pub mod cli;
pub mod column_map;
pub mod config;
pub mod data;
pub mod ddl;
pub mod diagnostics;
pub mod dump;
pub mod inspect;
pub mod io_utils;
pub mod rows;
pub mod sort_order;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("schemaport", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    debug!("{:?}", cli.command);
    match cli.command {
        Commands::RewriteDdl(args) => ddl::execute(&args),
        Commands::SortDump(args) => dump::execute(&args),
        Commands::Inspect(args) => inspect::execute(&args),
    }
}
