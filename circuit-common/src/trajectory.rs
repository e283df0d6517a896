use serde::{Serialize, Deserialize};

/// Dense record of one lineage: one row per checkpoint, one column per species.
///
/// Rows are stored contiguously (row-major) so a whole trajectory can be appended
/// to a CSV file or serialized without reshaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Identifier written into column 1 of every row.
    pub cell_id: u32,
    columns: usize,
    values: Vec<f64>,
}

impl Trajectory {
    pub fn new(cell_id: u32, columns: usize) -> Self {
        Trajectory { cell_id, columns, values: Vec::new() }
    }

    pub fn with_capacity(cell_id: u32, columns: usize, rows: usize) -> Self {
        Trajectory { cell_id, columns, values: Vec::with_capacity(columns * rows) }
    }

    /// Appends a checkpoint row. Panics if the row width does not match the column count.
    pub fn push_row(&mut self, row: &[f64]) {
        assert_eq!(row.len(), self.columns, "trajectory row width mismatch");
        self.values.extend_from_slice(row);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of checkpoint rows.
    pub fn len(&self) -> usize {
        if self.columns == 0 { 0 } else { self.values.len() / self.columns }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index * self.columns..(index + 1) * self.columns]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.columns.max(1))
    }

    /// Values of one column across all checkpoints.
    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows().map(move |row| row[index])
    }

    pub fn last_row(&self) -> Option<&[f64]> {
        if self.is_empty() { None } else { Some(self.row(self.len() - 1)) }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_columns_line_up() {
        let mut trajectory = Trajectory::new(3, 3);
        trajectory.push_row(&[0.0, 3.0, 10.0]);
        trajectory.push_row(&[1.0, 3.0, 12.0]);
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.row(1), &[1.0, 3.0, 12.0]);
        assert_eq!(trajectory.column(2).collect::<Vec<_>>(), vec![10.0, 12.0]);
        assert_eq!(trajectory.last_row(), Some(&[1.0, 3.0, 12.0][..]));
    }

    #[test]
    #[should_panic(expected = "row width mismatch")]
    fn rejects_ragged_rows() {
        let mut trajectory = Trajectory::new(1, 3);
        trajectory.push_row(&[0.0, 1.0]);
    }
}
