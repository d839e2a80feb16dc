//! Plain-text tables for `inspect` output.

use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Adds a row; missing cells render blank and extra cells are dropped.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row = cells
            .into_iter()
            .map(|cell| flatten_cell(cell.into()))
            .take(self.headers.len())
            .collect::<Vec<_>>();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(position, header)| {
                self.rows
                    .iter()
                    .map(|row| row[position].chars().count())
                    .chain([header.chars().count(), 3])
                    .max()
                    .unwrap_or(3)
            })
            .collect()
    }
}

fn flatten_cell(cell: String) -> String {
    if cell.contains(['\n', '\r', '\t']) {
        cell.replace(['\n', '\r', '\t'], " ")
    } else {
        cell
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(f, "{}", line.trim_end())
}

impl fmt::Display for TextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        write_line(f, &self.headers, &widths)?;
        let rule = widths.iter().map(|&width| "-".repeat(width)).collect::<Vec<_>>();
        write_line(f, &rule, &widths)?;
        for row in &self.rows {
            write_line(f, row, &widths)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_to_widest_cell() {
        let mut table = TextTable::new(["Source", "Target"]);
        table.push_row(["CustNo", "CustomerId"]);
        table.push_row(["Id"]);
        assert_eq!(
            table.to_string(),
            "Source  Target\n------  ----------\nCustNo  CustomerId\nId\n"
        );
    }

    #[test]
    fn control_characters_are_flattened() {
        let mut table = TextTable::new(["Value"]);
        table.push_row(["a\tb"]);
        assert!(table.to_string().ends_with("a b\n"));
    }
}
