//! Named-column numeric table of tracks.

use crate::IoError;

/// Largest accepted class label; larger values are treated as corrupt data.
pub const MAX_LABEL: usize = u16::MAX as usize;

/// A named column: one value for scalar fields, `width` for vector fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    width: usize,
}

impl Column {
    /// Create a column. `width` is clamped to at least 1.
    #[must_use]
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width: width.max(1),
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values per row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }
}

/// N tracks by K named columns of `f64`, stored row-major.
///
/// Column 0 is the label column. Every row holds exactly
/// [`row_width`](Self::row_width) values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<Column>,
    values: Vec<f64>,
    n_rows: usize,
}

impl FeatureTable {
    /// Build a table from columns and per-track rows.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::EmptyFieldList`] without columns and
    /// [`IoError::RowWidth`] when a row does not match the column widths.
    pub fn from_rows(columns: Vec<Column>, rows: &[Vec<f64>]) -> Result<Self, IoError> {
        let width = row_width(&columns)?;
        let mut values = Vec::with_capacity(rows.len() * width);
        for (row, r) in rows.iter().enumerate() {
            if r.len() != width {
                return Err(IoError::RowWidth {
                    row,
                    expected: width,
                    got: r.len(),
                });
            }
            values.extend_from_slice(r);
        }
        Ok(Self {
            columns,
            values,
            n_rows: rows.len(),
        })
    }

    /// Build a table from columns and a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::EmptyFieldList`] without columns and
    /// [`IoError::RowWidth`] when the buffer is not a whole number of rows.
    pub fn from_flat(columns: Vec<Column>, values: Vec<f64>) -> Result<Self, IoError> {
        let width = row_width(&columns)?;
        if values.len() % width != 0 {
            return Err(IoError::RowWidth {
                row: values.len() / width,
                expected: width,
                got: values.len() % width,
            });
        }
        Ok(Self {
            n_rows: values.len() / width,
            columns,
            values,
        })
    }

    /// Columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Number of tracks.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of named columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Values per row (sum of column widths).
    #[must_use]
    pub fn row_width(&self) -> usize {
        self.columns.iter().map(Column::width).sum()
    }

    /// Values of row `index`, or `None` past the end.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let width = self.row_width();
        self.values.get(index * width..(index + 1) * width)
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.row_width())
    }

    /// Flat row-major buffer.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Class labels from column 0.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::LabelNotScalar`] if column 0 is a vector and
    /// [`IoError::InvalidLabel`] for negative, fractional, non-finite or
    /// out-of-range (above [`MAX_LABEL`]) values.
    pub fn labels(&self) -> Result<Vec<usize>, IoError> {
        let label = &self.columns[0];
        if label.width != 1 {
            return Err(IoError::LabelNotScalar {
                column: label.name.clone(),
                width: label.width,
            });
        }
        self.rows()
            .enumerate()
            .map(|(row, r)| {
                let value = r[0];
                if value.is_finite()
                    && value >= 0.0
                    && value.fract() == 0.0
                    && value <= MAX_LABEL as f64
                {
                    Ok(value as usize)
                } else {
                    Err(IoError::InvalidLabel { row, value })
                }
            })
            .collect()
    }

    /// Feature rows: every row with the label column's values removed.
    #[must_use]
    pub fn feature_rows(&self) -> Vec<Vec<f64>> {
        let skip = self.columns[0].width;
        self.rows().map(|r| r[skip..].to_vec()).collect()
    }

    /// One name per feature value: `name` for scalars, `name[j]` for vectors.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.columns[1..]
            .iter()
            .flat_map(|c| {
                (0..c.width).map(move |j| {
                    if c.width == 1 {
                        c.name.clone()
                    } else {
                        format!("{}[{j}]", c.name)
                    }
                })
            })
            .collect()
    }

    /// Subset of rows, in the given order, with the same columns.
    ///
    /// Indices past the end are skipped.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut values = Vec::with_capacity(indices.len() * self.row_width());
        let mut n_rows = 0;
        for row in indices.iter().filter_map(|&i| self.row(i)) {
            values.extend_from_slice(row);
            n_rows += 1;
        }
        Self {
            columns: self.columns.clone(),
            values,
            n_rows,
        }
    }
}

fn row_width(columns: &[Column]) -> Result<usize, IoError> {
    if columns.is_empty() {
        return Err(IoError::EmptyFieldList);
    }
    Ok(columns.iter().map(Column::width).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_table() -> FeatureTable {
        let columns = vec![Column::new("label", 1), Column::new("x", 1), Column::new("y", 1)];
        let rows = vec![vec![0.0, 1.0, 4.0], vec![1.0, 2.0, 5.0], vec![0.0, 3.0, 6.0]];
        FeatureTable::from_rows(columns, &rows).unwrap()
    }

    #[test]
    fn shape_and_rows() {
        let table = scalar_table();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column_names(), vec!["label", "x", "y"]);
        assert_eq!(table.row(1), Some(&[1.0, 2.0, 5.0][..]));
        assert_eq!(table.row(3), None);
        assert_eq!(table.labels().unwrap(), vec![0, 1, 0]);
        assert_eq!(table.feature_rows()[2], vec![3.0, 6.0]);
    }

    #[test]
    fn vector_columns_expand_feature_names() {
        let columns = vec![Column::new("isPuff", 1), Column::new("pos", 2), Column::new("amp", 1)];
        let table = FeatureTable::from_flat(columns, vec![1.0, 0.5, 0.6, 9.0]).unwrap();
        assert_eq!(table.row_width(), 4);
        assert_eq!(table.feature_names(), vec!["pos[0]", "pos[1]", "amp"]);
        assert_eq!(table.feature_rows(), vec![vec![0.5, 0.6, 9.0]]);
    }

    #[test]
    fn mismatched_rows_rejected() {
        let columns = vec![Column::new("label", 1), Column::new("x", 1)];
        assert!(matches!(
            FeatureTable::from_rows(columns.clone(), &[vec![0.0, 1.0], vec![1.0]]),
            Err(IoError::RowWidth { row: 1, expected: 2, got: 1 })
        ));
        assert!(matches!(
            FeatureTable::from_flat(columns, vec![0.0, 1.0, 2.0]),
            Err(IoError::RowWidth { .. })
        ));
        assert!(matches!(FeatureTable::from_flat(vec![], vec![]), Err(IoError::EmptyFieldList)));
    }

    #[test]
    fn bad_labels_rejected() {
        let columns = vec![Column::new("label", 1), Column::new("x", 1)];
        for bad in [-1.0, 0.5, f64::NAN, 1e9, MAX_LABEL as f64 + 1.0] {
            let table = FeatureTable::from_rows(columns.clone(), &[vec![bad, 1.0]]).unwrap();
            assert!(matches!(table.labels(), Err(IoError::InvalidLabel { row: 0, .. })));
        }
        let table = FeatureTable::from_flat(vec![Column::new("label", 2)], vec![0.0, 1.0]).unwrap();
        assert!(matches!(table.labels(), Err(IoError::LabelNotScalar { width: 2, .. })));

        let table = FeatureTable::from_rows(columns, &[vec![MAX_LABEL as f64, 1.0]]).unwrap();
        assert_eq!(table.labels().unwrap(), vec![MAX_LABEL]);
    }

    #[test]
    fn select_rows_keeps_columns() {
        let table = scalar_table();
        let subset = table.select_rows(&[2, 0, 7]);
        assert_eq!(subset.n_rows(), 2);
        assert_eq!(subset.columns(), table.columns());
        assert_eq!(subset.row(0), table.row(2));
        assert!(table.select_rows(&[]).rows().next().is_none());
    }
}
