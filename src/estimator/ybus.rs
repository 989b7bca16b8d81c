//! Network admittance model.

use std::path::Path;

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::io::FileError;
use crate::units::Bases;

/// Per-unit nodal admittance matrix of the feeder.
///
/// Square and complex, with three per-phase rows per bus. Loaded once at
/// startup and read-only thereafter.
#[derive(Debug, Clone)]
pub struct Ybus {
    y: DMatrix<Complex64>,
}

impl Ybus {
    /// Loads an admittance matrix from CSV and normalizes it to per-unit.
    ///
    /// Each record is one matrix row with real and imaginary parts
    /// interleaved, so a row carries exactly `2 × order` numeric fields.
    ///
    /// # Errors
    ///
    /// Returns a [`FileError`] when the file is missing, a cell fails to
    /// parse, the matrix is not square, or its order is not a multiple
    /// of three.
    pub fn from_csv_file(path: &Path, bases: Bases) -> Result<Self, FileError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| FileError::new(path, format!("cannot open admittance matrix: {e}")))?;

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| FileError::new(path, format!("bad admittance row: {e}")))?;
            let mut row = Vec::with_capacity(record.len());
            for cell in record.iter() {
                let value: f64 = cell.parse().map_err(|_| {
                    FileError::new(path, format!("non-numeric admittance cell \"{cell}\""))
                })?;
                row.push(value);
            }
            rows.push(row);
        }

        let order = rows.len();
        if order == 0 || order % 3 != 0 {
            return Err(FileError::new(
                path,
                format!("admittance matrix order {order} is not a positive multiple of 3"),
            ));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != 2 * order {
                return Err(FileError::new(
                    path,
                    format!(
                        "admittance row {i} has {} fields, expected {}",
                        row.len(),
                        2 * order
                    ),
                ));
            }
        }

        let base = bases.admittance();
        let y = DMatrix::from_fn(order, order, |i, j| {
            Complex64::new(rows[i][2 * j], rows[i][2 * j + 1]) / base
        });
        Ok(Self { y })
    }

    /// Wraps an already per-unit matrix.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not square or its order is not a multiple
    /// of three.
    pub fn from_matrix(y: DMatrix<Complex64>) -> Self {
        assert_eq!(y.nrows(), y.ncols(), "admittance matrix must be square");
        assert!(
            y.nrows() > 0 && y.nrows() % 3 == 0,
            "admittance matrix order must be a positive multiple of 3"
        );
        Self { y }
    }

    /// Number of per-phase nodes.
    pub fn order(&self) -> usize {
        self.y.nrows()
    }

    /// Number of buses (three phase slots each).
    pub fn buses(&self) -> usize {
        self.order() / 3
    }

    /// Real part of an entry.
    pub fn g(&self, i: usize, j: usize) -> f64 {
        self.y[(i, j)].re
    }

    /// Imaginary part of an entry.
    pub fn b(&self, i: usize, j: usize) -> f64 {
        self.y[(i, j)].im
    }

    /// Series admittance of the branch between two buses: the negated
    /// 3×3 off-diagonal block, split into conductance and susceptance.
    pub fn branch_block(&self, from_bus: usize, to_bus: usize) -> ([[f64; 3]; 3], [[f64; 3]; 3]) {
        let mut g = [[0.0; 3]; 3];
        let mut b = [[0.0; 3]; 3];
        for r in 0..3 {
            for c in 0..3 {
                let y = -self.y[(3 * from_bus + r, 3 * to_bus + c)];
                g[r][c] = y.re;
                b[r][c] = y.im;
            }
        }
        (g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_matrix() -> DMatrix<Complex64> {
        let y = Complex64::new(2.0, -6.0);
        let mut m = DMatrix::<Complex64>::zeros(6, 6);
        for p in 0..3 {
            m[(p, p)] += y;
            m[(3 + p, 3 + p)] += y;
            m[(p, 3 + p)] -= y;
            m[(3 + p, p)] -= y;
        }
        m
    }

    #[test]
    fn branch_block_negates_the_coupling_block() {
        let ybus = Ybus::from_matrix(two_bus_matrix());
        let (g, b) = ybus.branch_block(0, 1);
        for p in 0..3 {
            assert_eq!(g[p][p], 2.0);
            assert_eq!(b[p][p], -6.0);
        }
        assert_eq!(g[0][1], 0.0);
    }

    #[test]
    fn entry_accessors_split_real_and_imaginary() {
        let ybus = Ybus::from_matrix(two_bus_matrix());
        assert_eq!(ybus.g(0, 0), 2.0);
        assert_eq!(ybus.b(0, 0), -6.0);
        assert_eq!(ybus.g(0, 3), -2.0);
        assert_eq!(ybus.buses(), 2);
    }

    #[test]
    #[should_panic]
    fn non_multiple_of_three_order_panics() {
        Ybus::from_matrix(DMatrix::<Complex64>::zeros(4, 4));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Ybus::from_csv_file(
            Path::new("/nonexistent/ymat.csv"),
            Bases::new(1000.0, 2400.0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ymat.csv"));
    }
}
