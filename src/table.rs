use crate::domain::Fields;

/// A text-typed row set with ordered columns. Missing cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Appends a row, padding short rows with missing cells and cutting long ones.
    pub fn push_row(&mut self, mut row: Vec<Option<String>>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    /// The non-missing cells of one row keyed by column name.
    pub fn fields(&self, row: usize) -> Fields {
        let Some(values) = self.rows.get(row) else {
            return Fields::new();
        };
        self.columns
            .iter()
            .zip(values)
            .filter_map(|(column, value)| Some((column.clone(), value.clone()?)))
            .collect()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// Stacks tables vertically. Columns are the union of all inputs in order of
    /// first appearance; cells a table lacks are missing.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        let mut merged = Table::default();
        for table in tables {
            let positions = table
                .columns
                .iter()
                .map(|column| match merged.column_index(column) {
                    Some(index) => index,
                    None => {
                        merged.columns.push(column.clone());
                        for row in &mut merged.rows {
                            row.push(None);
                        }
                        merged.columns.len() - 1
                    }
                })
                .collect::<Vec<_>>();

            for row in table.rows {
                let mut out = vec![None; merged.columns.len()];
                for (value, &index) in row.into_iter().zip(&positions) {
                    out[index] = value;
                }
                merged.rows.push(out);
            }
        }
        merged
    }
}

/// Normalizes a raw cell: surrounding whitespace is trimmed and blank cells
/// become missing.
pub fn cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
