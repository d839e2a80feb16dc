//! Per-table column rename maps and the table names they are keyed by.
//!
//! A [`ColumnNameMap`] maps source column names to target column names for
//! one table. Keys compare case-insensitively (Unicode lowercase, so `Ö`
//! matches `ö` but `ß` does not match `SS`), lookups of unmapped
//! names fall back to the name itself, and the reserved [`SKIP_SENTINEL`]
//! target drops the column from rewritten DDL.

use std::{collections::HashMap, fmt};

/// Target name meaning "omit this column".
pub const SKIP_SENTINEL: &str = "<skip>";

pub fn is_skip_sentinel(target: &str) -> bool {
    target.eq_ignore_ascii_case(SKIP_SENTINEL)
}

/// Lookup key for an identifier or table name.
pub fn identifier_key(name: &str) -> String {
    name.to_lowercase()
}

pub fn same_identifier(left: &str, right: &str) -> bool {
    left == right || identifier_key(left) == identifier_key(right)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()),
            name: name.into(),
        }
    }

    /// Parses `table` or `schema.table`.
    pub fn parse(value: &str) -> Self {
        match value.trim().split_once('.') {
            Some((schema, name)) => Self::new(Some(schema.trim().to_string()), name.trim()),
            None => Self::new(None, value.trim()),
        }
    }

    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Keys to try, most specific last: the bare name, then `schema.table`.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = vec![self.name.clone()];
        if self.schema.is_some() {
            keys.push(self.qualified());
        }
        keys
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnRename {
    source: String,
    target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNameMap {
    table: String,
    entries: Vec<ColumnRename>,
    index: HashMap<String, usize>,
}

impl ColumnNameMap {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds or replaces a mapping, returning the target it replaced.
    pub fn insert(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Option<String> {
        let source = source.into();
        let target = target.into();
        let key = identifier_key(&source);
        if let Some(&position) = self.index.get(&key) {
            let previous = std::mem::replace(&mut self.entries[position].target, target);
            return Some(previous);
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(ColumnRename { source, target });
        None
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.index
            .get(&identifier_key(source))
            .map(|&position| self.entries[position].target.as_str())
    }

    /// Target name for `source`, or `source` itself when unmapped.
    pub fn target<'a>(&'a self, source: &'a str) -> &'a str {
        self.get(source).unwrap_or(source)
    }

    /// Reverse lookup: the first source (in insertion order) mapping to
    /// `target`, or `target` itself. Not unique when several sources share a
    /// target.
    pub fn source<'a>(&'a self, target: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|entry| same_identifier(&entry.target, target))
            .map_or(target, |entry| entry.source.as_str())
    }

    pub fn is_skipped(&self, source: &str) -> bool {
        self.get(source).is_some_and(is_skip_sentinel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|entry| (entry.source.as_str(), entry.target.as_str()))
    }
}

/// Column maps and primary-key hints for every configured table.
#[derive(Debug, Clone, Default)]
pub struct ColumnMaps {
    maps: Vec<ColumnNameMap>,
    by_table: HashMap<String, usize>,
    primary_keys: HashMap<String, String>,
}

impl ColumnMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `map` under `key` (a bare or schema-qualified table name).
    pub fn insert(&mut self, key: &str, map: ColumnNameMap) {
        let key = identifier_key(key);
        match self.by_table.get(&key) {
            Some(&position) => self.maps[position] = map,
            None => {
                self.by_table.insert(key, self.maps.len());
                self.maps.push(map);
            }
        }
    }

    pub fn set_primary_key(&mut self, key: &str, column: impl Into<String>) {
        self.primary_keys
            .insert(identifier_key(key), column.into());
    }

    pub fn get(&self, table: &TableName) -> Option<&ColumnNameMap> {
        table
            .lookup_keys()
            .iter()
            .find_map(|key| self.by_table.get(&identifier_key(key)))
            .map(|&position| &self.maps[position])
    }

    /// Caller-supplied primary key for `table`, as a source column name.
    pub fn primary_key(&self, table: &TableName) -> Option<&str> {
        table
            .lookup_keys()
            .iter()
            .find_map(|key| self.primary_keys.get(&identifier_key(key)))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnNameMap> {
        self.maps.iter()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_falls_back_to_identity_and_ignores_case() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("CustNo", "CustomerId");
        assert_eq!(map.target("custno"), "CustomerId");
        assert_eq!(map.target("CUSTNO"), "CustomerId");
        assert_eq!(map.target("Region"), "Region");
        assert!(map.get("Region").is_none());
    }

    #[test]
    fn reinserting_a_source_overwrites_in_place() {
        let mut map = ColumnNameMap::new("Orders");
        assert_eq!(map.insert("CustNo", "CustomerId"), None);
        assert_eq!(
            map.insert("custno", "Customer"),
            Some("CustomerId".to_string())
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.target("CustNo"), "Customer");
    }

    #[test]
    fn source_returns_first_inserted_match() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("ShipName", "Name");
        map.insert("BillName", "Name");
        assert_eq!(map.source("Name"), "ShipName");
        assert_eq!(map.source("name"), "ShipName");
        assert_eq!(map.source("Unknown"), "Unknown");
    }

    #[test]
    fn skip_sentinel_is_case_insensitive() {
        let mut map = ColumnNameMap::new("Orders");
        map.insert("Legacy", "<SKIP>");
        assert!(map.is_skipped("legacy"));
        assert!(!map.is_skipped("Other"));
    }

    #[test]
    fn column_maps_resolve_bare_then_qualified_names() {
        let mut maps = ColumnMaps::new();
        maps.insert("sales.Orders", ColumnNameMap::new("Orders"));
        maps.set_primary_key("Customers", "CustomerKey");
        maps.insert("Customers", ColumnNameMap::new("Customers"));

        let orders = TableName::new(Some("Sales".to_string()), "orders");
        assert_eq!(maps.get(&orders).map(|m| m.table()), Some("Orders"));

        let customers = TableName::new(Some("dbo".to_string()), "CUSTOMERS");
        assert!(maps.get(&customers).is_some());
        assert_eq!(maps.primary_key(&customers), Some("CustomerKey"));

        assert!(maps.get(&TableName::parse("Missing")).is_none());
    }

    #[test]
    fn non_ascii_names_match_regardless_of_case() {
        let mut map = ColumnNameMap::new("Maße");
        map.insert("Ölpreis", "OilPrice");
        map.insert("Größe", "Size");
        assert_eq!(map.target("ÖLPREIS"), "OilPrice");
        assert_eq!(map.target("GRÖßE"), "Size");
        assert_eq!(map.source("oilprice"), "Ölpreis");

        let mut maps = ColumnMaps::new();
        maps.insert("ÄNDERUNGEN", ColumnNameMap::new("Änderungen"));
        assert!(maps.get(&TableName::parse("dbo.änderungen")).is_some());
    }

    #[test]
    fn table_name_parse_splits_schema() {
        let table = TableName::parse("dbo.Orders");
        assert_eq!(table.schema.as_deref(), Some("dbo"));
        assert_eq!(table.name, "Orders");
        assert_eq!(table.to_string(), "dbo.Orders");
        assert_eq!(TableName::parse("Orders").lookup_keys(), vec!["Orders"]);
    }
}
