//! YAML migration configuration: per-table column renames, primary-key
//! hints, and which tables take part in the data export.
//!
//! ```yaml
//! tables:
//!   - name: Orders
//!     schema: dbo
//!     primary_key: OrderNo
//!     columns:
//!       CustNo: CustomerId
//!       Legacy: <skip>
//!   - name: AuditLog
//!     export_data: false
//! ```

use std::{collections::HashSet, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::{
    column_map::{ColumnMaps, ColumnNameMap, SKIP_SENTINEL, TableName, identifier_key},
    diagnostics::DiagnosticSink,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default = "default_export_data")]
    pub export_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Source column name to target column name; a null target or
    /// `<skip>` drops the column.
    #[serde(default)]
    pub columns: serde_yaml::Mapping,
}

fn default_export_data() -> bool {
    true
}

impl TableConfig {
    pub fn table_name(&self) -> TableName {
        TableName::new(self.schema.clone(), self.name.trim())
    }

    fn key(&self) -> String {
        self.table_name().qualified()
    }
}

impl MigrationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing migration config")
    }

    /// Builds the column maps. Mapping a source column twice keeps the
    /// later target and reports a warning.
    pub fn column_maps(&self, sink: &mut dyn DiagnosticSink) -> Result<ColumnMaps> {
        let mut maps = ColumnMaps::new();
        for table in &self.tables {
            let key = table.key();
            let mut map = ColumnNameMap::new(table.name.trim());
            for (source, target) in &table.columns {
                let source = scalar_text(source)
                    .ok_or_else(|| anyhow!("Table '{key}' has a non-scalar column name"))?;
                let target = match target {
                    Value::Null => SKIP_SENTINEL.to_string(),
                    other => scalar_text(other).ok_or_else(|| {
                        anyhow!("Column '{source}' of table '{key}' must map to a name")
                    })?,
                };
                if let Some(previous) = map.insert(source.clone(), target.clone()) {
                    sink.warning(format!(
                        "Column '{source}' of table '{key}' is mapped more than once; '{previous}' replaced by '{target}'"
                    ));
                }
            }
            if let Some(primary_key) = &table.primary_key {
                maps.set_primary_key(&key, primary_key.trim());
            }
            maps.insert(&key, map);
        }
        Ok(maps)
    }

    pub fn export_registry(&self) -> ExportRegistry {
        let mut registry = ExportRegistry::default();
        for table in self.tables.iter().filter(|table| !table.export_data) {
            registry.exclude(&table.key());
        }
        registry
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Tables excluded from data export, keyed the same way as column maps.
#[derive(Debug, Clone, Default)]
pub struct ExportRegistry {
    excluded: HashSet<String>,
}

impl ExportRegistry {
    /// Excludes `table`, given as `table` or `schema.table`.
    pub fn exclude(&mut self, table: &str) {
        let table = table.trim();
        if !table.is_empty() {
            self.excluded.insert(identifier_key(table));
        }
    }

    pub fn is_excluded(&self, table: &TableName) -> bool {
        table
            .lookup_keys()
            .iter()
            .any(|key| self.excluded.contains(&identifier_key(key)))
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}
