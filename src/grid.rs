use crate::error::{ExtractError, ExtractResult};
use std::path::Path;
use tracing::debug;

/// Dense 3D grid indexed `[layer, row, col]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    layers: usize,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

fn cell_count(layers: usize, rows: usize, cols: usize) -> Option<usize> {
    layers.checked_mul(rows)?.checked_mul(cols)
}

impl Grid {
    /// Grid with every cell set to `value`, or `None` if the cell count
    /// does not fit in `usize`.
    pub fn try_filled(layers: usize, rows: usize, cols: usize, value: f64) -> Option<Self> {
        Some(Grid {
            layers,
            rows,
            cols,
            data: vec![value; cell_count(layers, rows, cols)?],
        })
    }

    #[cfg(test)]
    pub fn filled(layers: usize, rows: usize, cols: usize, value: f64) -> Self {
        Self::try_filled(layers, rows, cols, value).expect("grid size overflows usize")
    }

    #[cfg(test)]
    pub fn from_vec(layers: usize, rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        if cell_count(layers, rows, cols) != Some(data.len()) {
            return None;
        }
        Some(Grid {
            layers,
            rows,
            cols,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.layers, self.rows, self.cols)
    }

    fn offset(&self, layer: usize, row: usize, col: usize) -> usize {
        (layer * self.rows + row) * self.cols + col
    }

    pub fn get(&self, layer: usize, row: usize, col: usize) -> Option<f64> {
        if layer >= self.layers || row >= self.rows || col >= self.cols {
            return None;
        }
        Some(self.data[self.offset(layer, row, col)])
    }

    pub fn set(&mut self, layer: usize, row: usize, col: usize, value: f64) {
        let idx = self.offset(layer, row, col);
        self.data[idx] = value;
    }

    /// Samples with signed cell indices; anything outside the grid is `None`.
    pub fn sample(&self, layer: usize, row: i64, col: i64) -> Option<f64> {
        let row = usize::try_from(row).ok()?;
        let col = usize::try_from(col).ok()?;
        self.get(layer, row, col)
    }

    /// Index of the top (last) layer.
    pub fn surface_layer(&self) -> Option<usize> {
        self.layers.checked_sub(1)
    }

    pub fn flip_rows(&mut self) {
        let plane = self.rows * self.cols;
        for layer in 0..self.layers {
            let base = layer * plane;
            for row in 0..self.rows / 2 {
                let top = base + row * self.cols;
                let bottom = base + (self.rows - 1 - row) * self.cols;
                for col in 0..self.cols {
                    self.data.swap(top + col, bottom + col);
                }
            }
        }
    }
}

/// Decoder for a grid file format.
pub trait GridReader: Sync {
    fn read(&self, path: &Path) -> ExtractResult<Grid>;
}

/// Loads `path` through `reader`, optionally reversing the row axis so row 0
/// is the southern edge.
pub fn load_grid<R: GridReader + ?Sized>(
    reader: &R,
    path: &Path,
    flip_rows: bool,
) -> ExtractResult<Grid> {
    if !path.is_file() {
        return Err(ExtractError::GridFileMissing(path.to_path_buf()));
    }
    let mut grid = reader.read(path)?;
    if flip_rows {
        grid.flip_rows();
    }
    debug!(path = ?path, shape = ?grid.shape(), flip_rows, "loaded grid");
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::pfb::{PfbReader, write_pfb};

    fn numbered(layers: usize, rows: usize, cols: usize) -> Grid {
        let data = (0..layers * rows * cols).map(|v| v as f64).collect();
        Grid::from_vec(layers, rows, cols, data).unwrap()
    }

    #[test]
    fn get_uses_layer_row_col_order() {
        let grid = numbered(2, 3, 4);
        assert_eq!(grid.get(0, 0, 1), Some(1.0));
        assert_eq!(grid.get(0, 1, 0), Some(4.0));
        assert_eq!(grid.get(1, 0, 0), Some(12.0));
        assert_eq!(grid.get(2, 0, 0), None);
    }

    #[test]
    fn sample_rejects_negative_indices() {
        let grid = numbered(1, 2, 2);
        assert_eq!(grid.sample(0, -1, 0), None);
        assert_eq!(grid.sample(0, 0, 2), None);
        assert_eq!(grid.sample(0, 1, 1), Some(3.0));
    }

    #[test]
    fn flip_rows_reverses_each_layer() {
        let mut grid = numbered(2, 3, 2);
        grid.flip_rows();
        assert_eq!(grid.get(0, 0, 0), Some(4.0));
        assert_eq!(grid.get(0, 1, 1), Some(3.0));
        assert_eq!(grid.get(0, 2, 1), Some(1.0));
        assert_eq!(grid.get(1, 0, 0), Some(10.0));
        assert_eq!(grid.get(1, 2, 0), Some(6.0));
    }

    #[test]
    fn surface_layer_is_last() {
        assert_eq!(numbered(5, 1, 1).surface_layer(), Some(4));
        assert_eq!(Grid::filled(0, 1, 1, 0.0).surface_layer(), None);
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        assert!(Grid::try_filled(usize::MAX, 2, 1, 0.0).is_none());
        assert!(Grid::from_vec(usize::MAX, 2, 1, Vec::new()).is_none());
        assert_eq!(Grid::try_filled(2, 3, 4, 1.5).map(|g| g.shape()), Some((2, 3, 4)));
    }

    #[test]
    fn load_grid_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_grid(&PfbReader, &dir.path().join("nope.pfb"), false).unwrap_err();
        assert!(matches!(err, ExtractError::GridFileMissing(_)));
    }

    #[test]
    fn load_grid_flips_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.pfb");
        let grid = numbered(1, 3, 2);
        write_pfb(&path, &grid).unwrap();

        let raw = load_grid(&PfbReader, &path, false).unwrap();
        assert_eq!(raw, grid);

        let flipped = load_grid(&PfbReader, &path, true).unwrap();
        assert_eq!(flipped.get(0, 0, 0), Some(4.0));
        assert_eq!(flipped.get(0, 2, 0), Some(0.0));
    }
}
