use anyhow::{Result, anyhow, bail};
use log::info;

use crate::{
    cli::InspectArgs,
    column_map::{ColumnMaps, TableName, is_skip_sentinel, same_identifier},
    config::{ExportRegistry, MigrationConfig},
    diagnostics::LogSink,
    sort_order::SortOrders,
    table::TextTable,
};

pub fn execute(args: &InspectArgs) -> Result<()> {
    if args.config.is_none() && args.sort_order.is_none() {
        bail!("Nothing to inspect: pass --config and/or --sort-order");
    }
    let mut sink = LogSink;
    let filter = args.table.as_deref().map(TableName::parse);

    if let Some(target) = &args.target_column {
        let (Some(path), Some(table)) = (&args.config, &filter) else {
            bail!("--target-column needs both --config and --table");
        };
        let maps = MigrationConfig::load(path)?.column_maps(&mut sink)?;
        let map = maps
            .get(table)
            .ok_or_else(|| anyhow!("No column map configured for table {table}"))?;
        println!("{}", map.source(target));
        return Ok(());
    }

    if let Some(path) = &args.config {
        let config = MigrationConfig::load(path)?;
        let maps = config.column_maps(&mut sink)?;
        let registry = config.export_registry();
        let table = column_map_table(&config, &maps, &registry, filter.as_ref());
        if table.is_empty() {
            info!("No column maps in {path:?} match the requested table");
        } else {
            info!("Column maps from {path:?}");
            print!("{table}");
        }
    }
    if let Some(path) = &args.sort_order {
        let load = SortOrders::load(path, &mut sink)?;
        info!(
            "Sort orders from {path:?} ({} rejected entr{})",
            load.errors.len(),
            if load.errors.len() == 1 { "y" } else { "ies" }
        );
        let table = sort_order_table(&load.orders, filter.as_ref());
        if table.is_empty() {
            info!("No sort order in {path:?} matches the requested table");
        } else {
            print!("{table}");
        }
    }
    Ok(())
}

fn matches_filter(filter: Option<&TableName>, table: &TableName) -> bool {
    filter.is_none_or(|filter| {
        same_identifier(&filter.name, &table.name)
            && match (&filter.schema, &table.schema) {
                (Some(wanted), Some(actual)) => same_identifier(wanted, actual),
                (Some(_), None) => false,
                (None, _) => true,
            }
    })
}

pub fn column_map_table(
    config: &MigrationConfig,
    maps: &ColumnMaps,
    registry: &ExportRegistry,
    filter: Option<&TableName>,
) -> TextTable {
    let mut table = TextTable::new(["Table", "Source", "Target", "Notes"]);
    for entry in &config.tables {
        let name = entry.table_name();
        if !matches_filter(filter, &name) {
            continue;
        }
        let primary_key = maps.primary_key(&name);
        if registry.is_excluded(&name) {
            table.push_row([
                name.qualified(),
                String::new(),
                String::new(),
                "no data export".to_string(),
            ]);
        }
        let Some(map) = maps.get(&name) else {
            continue;
        };
        for (source, target) in map.iter() {
            let note = if is_skip_sentinel(target) {
                "dropped"
            } else if primary_key.is_some_and(|key| same_identifier(key, source)) {
                "primary key"
            } else {
                ""
            };
            table.push_row([
                name.qualified(),
                source.to_string(),
                target.to_string(),
                note.to_string(),
            ]);
        }
    }
    table
}

pub fn sort_order_table(orders: &SortOrders, filter: Option<&TableName>) -> TextTable {
    let mut table = TextTable::new(["Table", "Sort columns"]);
    match filter {
        Some(filter) => {
            if let Some(spec) = orders.resolve(filter) {
                table.push_row([filter.qualified(), spec.to_string()]);
            }
        }
        None => {
            for (name, spec) in orders.iter() {
                table.push_row([name.to_string(), spec.to_string()]);
            }
        }
    }
    table
}
