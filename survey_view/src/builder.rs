pub use crate::config::*;

use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// A builder for assembling a raw table out of several spreadsheets.
///
/// Columns are matched by name. The expected columns are always part of the
/// table; other columns are appended in the order in which they are first seen.
/// A source that does not have a column gets `RawCell::Empty` for it.
///
/// ```
/// use survey_view::builder::TableBuilder;
/// use survey_view::RawCell;
///
/// let mut builder = TableBuilder::new();
/// builder.add_source(
///     "first.xlsx",
///     &["KEY".to_string(), "Village".to_string()],
///     vec![vec![RawCell::Text("uuid:1".to_string()), RawCell::Text("Ba".to_string())]],
/// );
/// let table = builder.build();
/// assert_eq!(table.rows.len(), 1);
/// assert_eq!(table.get(0, "Province"), Some(&RawCell::Empty));
/// ```
pub struct TableBuilder {
    pub(crate) _columns: Vec<String>,
    pub(crate) _index: HashMap<String, usize>,
    pub(crate) _observed: Vec<bool>,
    pub(crate) _rows: Vec<Vec<RawCell>>,
    pub(crate) _sources: Vec<String>,
}

/// A table in which all the rows have the same columns.
#[derive(PartialEq, Debug, Clone)]
pub struct RawTable {
    pub columns: Vec<String>,
    /// For each column, whether at least one source provided it.
    pub observed: Vec<bool>,
    pub rows: Vec<Vec<RawCell>>,
    pub sources: Vec<String>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&RawCell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn is_observed(&self, column: &str) -> bool {
        self.column_index(column)
            .map(|idx| self.observed[idx])
            .unwrap_or(false)
    }
}

impl TableBuilder {
    pub fn new() -> TableBuilder {
        let mut b = TableBuilder {
            _columns: Vec::new(),
            _index: HashMap::new(),
            _observed: Vec::new(),
            _rows: Vec::new(),
            _sources: Vec::new(),
        };
        for c in EXPECTED_COLUMNS.iter() {
            b.column_slot(c);
        }
        b
    }

    /// Adds the content of one spreadsheet.
    ///
    /// header: the names in the first row of the sheet. Blank names are replaced
    /// by `Unnamed: <position>`. A name repeated within the sheet gets a `.1`, `.2`, ...
    /// suffix, so that every column of the sheet is kept.
    /// rows: the data rows. They may be shorter or longer than the header.
    pub fn add_source(&mut self, source: &str, header: &[String], rows: Vec<Vec<RawCell>>) {
        let mut seen: HashSet<String> = HashSet::new();
        let mapping: Vec<usize> = header
            .iter()
            .enumerate()
            .map(|(pos, name)| {
                let name = name.trim();
                let base = if name.is_empty() {
                    format!("Unnamed: {}", pos)
                } else {
                    name.to_string()
                };
                let mut unique = base.clone();
                let mut dup = 0;
                while seen.contains(&unique) {
                    dup += 1;
                    unique = format!("{}.{}", base, dup);
                }
                if dup > 0 {
                    warn!(
                        "add_source: {}: repeated column {} renamed {}",
                        source, base, unique
                    );
                }
                seen.insert(unique.clone());
                let slot = self.column_slot(&unique);
                self._observed[slot] = true;
                slot
            })
            .collect();
        debug!(
            "add_source: {}: {} columns, {} rows",
            source,
            mapping.len(),
            rows.len()
        );

        for row in rows {
            // Blank lines at the end of a sheet are common.
            if row.iter().all(|c| c.is_empty()) {
                continue;
            }
            let mut aligned: Vec<RawCell> = vec![RawCell::Empty; self._columns.len()];
            for (cell, slot) in row.into_iter().zip(mapping.iter()) {
                aligned[*slot] = cell;
            }
            self._rows.push(aligned);
        }
        self._sources.push(source.to_string());
    }

    pub fn build(self) -> RawTable {
        let width = self._columns.len();
        // Rows added before a new column appeared are padded here.
        let rows = self
            ._rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, RawCell::Empty);
                r
            })
            .collect();
        RawTable {
            columns: self._columns,
            observed: self._observed,
            rows,
            sources: self._sources,
        }
    }

    fn column_slot(&mut self, name: &str) -> usize {
        if let Some(idx) = self._index.get(name) {
            return *idx;
        }
        let idx = self._columns.len();
        self._columns.push(name.to_string());
        self._index.insert(name.to_string(), idx);
        self._observed.push(false);
        idx
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        TableBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn expected_columns_always_present() {
        let table = TableBuilder::new().build();
        for c in EXPECTED_COLUMNS.iter() {
            assert!(table.column_index(c).is_some(), "missing {}", c);
            assert!(!table.is_observed(c));
        }
        assert!(table.rows.is_empty());
    }

    #[test]
    fn union_of_columns_across_sources() {
        let mut b = TableBuilder::new();
        b.add_source(
            "a.xlsx",
            &header(&["KEY", "Extra_A"]),
            vec![vec![text("k1"), text("a")]],
        );
        b.add_source(
            "b.xlsx",
            &header(&["Extra_B", "KEY"]),
            vec![vec![text("b"), text("k2")]],
        );
        let table = b.build();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.get(0, "KEY"), Some(&text("k1")));
        assert_eq!(table.get(0, "Extra_A"), Some(&text("a")));
        assert_eq!(table.get(0, "Extra_B"), Some(&RawCell::Empty));
        assert_eq!(table.get(1, "KEY"), Some(&text("k2")));
        assert_eq!(table.get(1, "Extra_A"), Some(&RawCell::Empty));
        assert_eq!(table.get(1, "Extra_B"), Some(&text("b")));
        assert!(table.is_observed("Extra_B"));
        assert!(!table.is_observed("Province"));
        assert_eq!(table.sources, vec!["a.xlsx", "b.xlsx"]);
    }

    #[test]
    fn short_rows_and_blank_headers() {
        let mut b = TableBuilder::new();
        b.add_source(
            "a.xlsx",
            &header(&["KEY", "", "Village"]),
            vec![vec![text("k1"), text("x")], vec![RawCell::Empty, RawCell::Empty]],
        );
        let table = b.build();
        // The blank line is dropped.
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.get(0, "Unnamed: 1"), Some(&text("x")));
        assert_eq!(table.get(0, "Village"), Some(&RawCell::Empty));
    }

    #[test]
    fn repeated_headers_keep_every_column() {
        let mut b = TableBuilder::new();
        b.add_source(
            "a.xlsx",
            &header(&["KEY", "Note", "KEY", "Note", "KEY"]),
            vec![vec![text("k1"), text("n1"), text("k2"), text("n2"), text("k3")]],
        );
        b.add_source(
            "b.xlsx",
            &header(&["KEY", "KEY"]),
            vec![vec![text("k4"), text("k5")]],
        );
        let table = b.build();
        assert_eq!(table.get(0, "KEY"), Some(&text("k1")));
        assert_eq!(table.get(0, "KEY.1"), Some(&text("k2")));
        assert_eq!(table.get(0, "KEY.2"), Some(&text("k3")));
        assert_eq!(table.get(0, "Note"), Some(&text("n1")));
        assert_eq!(table.get(0, "Note.1"), Some(&text("n2")));
        // Repeats line up across sources by their suffixed names.
        assert_eq!(table.get(1, "KEY"), Some(&text("k4")));
        assert_eq!(table.get(1, "KEY.1"), Some(&text("k5")));
        assert_eq!(table.get(1, "KEY.2"), Some(&RawCell::Empty));
    }
}
