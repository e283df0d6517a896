use crate::error::SimulationError;

/// Column holding simulation time.
pub const TIME: usize = 0;
/// Column holding the integer cell identifier.
pub const CELL: usize = 1;
/// Column holding cell size (division mode only).
pub const SIZE: usize = 2;

/// Mutable state vector of one lineage, indexed by species column.
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    values: Vec<f64>,
}

impl CellState {
    /// Creates a state from the declared initial values, stamping the cell identifier.
    pub fn new(initial: &[f64], cell_id: u32) -> Self {
        let mut values = initial.to_vec();
        values[CELL] = cell_id as f64;
        Self { values }
    }

    pub fn time(&self) -> f64 {
        self.values[TIME]
    }

    pub fn set_time(&mut self, time: f64) {
        self.values[TIME] = time;
    }

    pub fn advance_time(&mut self, dt: f64) {
        self.values[TIME] += dt;
    }

    pub fn size(&self) -> f64 {
        self.values[SIZE]
    }

    pub fn set_size(&mut self, size: f64) {
        self.values[SIZE] = size;
    }

    pub fn set_cell(&mut self, cell_id: u32) {
        self.values[CELL] = cell_id as f64;
    }

    pub fn get(&self, column: usize) -> f64 {
        self.values[column]
    }

    pub fn set(&mut self, column: usize, value: f64) {
        self.values[column] = value;
    }

    /// Adds a sparse list of `(column, delta)` changes.
    pub fn apply(&mut self, changes: &[(usize, f64)]) {
        for &(column, delta) in changes {
            self.values[column] += delta;
        }
    }

    /// Copies the values at `indices` into `out`, replacing its contents.
    pub fn gather(&self, indices: &[usize], out: &mut Vec<f64>) {
        out.clear();
        out.extend(indices.iter().map(|&i| self.values[i]));
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads a column as a molecule count for binomial sampling.
    pub fn count(&self, column: usize, species: &str) -> Result<u64, SimulationError> {
        let value = self.values[column];
        if value < 0.0 || !value.is_finite() {
            return Err(SimulationError::NegativeCount {
                species: species.to_string(),
                value,
            });
        }
        Ok(value.round() as u64)
    }
}
