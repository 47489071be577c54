//! ParFlow binary (`.pfb`) grid reader.
//!
//! Layout, all big-endian:
//! - header: `x0, y0, z0: f64`, `nx, ny, nz: i32`, `dx, dy, dz: f64`, `num_subgrids: i32`
//! - per subgrid: `ix, iy, iz, nx, ny, nz, rx, ry, rz: i32`, then `nx * ny * nz`
//!   `f64` values with x varying fastest, then y, then z.

use crate::error::{ExtractError, ExtractResult};
use crate::grid::{Grid, GridReader};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct PfbReader;

impl GridReader for PfbReader {
    fn read(&self, path: &Path) -> ExtractResult<Grid> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::GridReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        parse_pfb(&bytes).map_err(|reason| ExtractError::GridReadError {
            path: path.to_path_buf(),
            reason,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| format!("unexpected end of data at byte {}", self.pos))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn f64(&mut self) -> Result<f64, String> {
        Ok(f64::from_be_bytes(self.take::<8>()?))
    }

    fn dim(&mut self, name: &str) -> Result<usize, String> {
        let v = i32::from_be_bytes(self.take::<4>()?);
        usize::try_from(v).map_err(|_| format!("negative {}: {}", name, v))
    }
}

pub fn parse_pfb(bytes: &[u8]) -> Result<Grid, String> {
    let mut cur = Cursor { bytes, pos: 0 };

    // origin
    for _ in 0..3 {
        cur.f64()?;
    }
    let nx = cur.dim("nx")?;
    let ny = cur.dim("ny")?;
    let nz = cur.dim("nz")?;
    // spacing
    for _ in 0..3 {
        cur.f64()?;
    }
    let num_subgrids = cur.dim("num_subgrids")?;

    // Every cell needs 8 bytes, so a header claiming more cells than the
    // remaining data can hold is corrupt.
    let cells = nx
        .checked_mul(ny)
        .and_then(|v| v.checked_mul(nz))
        .ok_or_else(|| format!("grid size {} x {} x {} overflows", nx, ny, nz))?;
    let available = (bytes.len() - cur.pos) / 8;
    if cells > available {
        return Err(format!(
            "header claims {} x {} x {} cells but only {} values fit in the file",
            nx, ny, nz, available
        ));
    }
    let mut grid = Grid::try_filled(nz, ny, nx, 0.0)
        .ok_or_else(|| format!("grid size {} x {} x {} overflows", nx, ny, nz))?;

    for s in 0..num_subgrids {
        let ix = cur.dim("ix")?;
        let iy = cur.dim("iy")?;
        let iz = cur.dim("iz")?;
        let snx = cur.dim("subgrid nx")?;
        let sny = cur.dim("subgrid ny")?;
        let snz = cur.dim("subgrid nz")?;
        // refinement levels, unused
        for _ in 0..3 {
            cur.dim("r")?;
        }

        if ix + snx > nx || iy + sny > ny || iz + snz > nz {
            return Err(format!(
                "subgrid {} at ({}, {}, {}) size ({}, {}, {}) exceeds grid ({}, {}, {})",
                s, ix, iy, iz, snx, sny, snz, nx, ny, nz
            ));
        }

        for k in 0..snz {
            for j in 0..sny {
                for i in 0..snx {
                    let value = cur.f64()?;
                    grid.set(iz + k, iy + j, ix + i, value);
                }
            }
        }
    }

    Ok(grid)
}

/// Writes `grid` as a single-subgrid pfb file.
#[cfg(test)]
pub fn write_pfb(path: &Path, grid: &Grid) -> std::io::Result<()> {
    let (nz, ny, nx) = grid.shape();
    let mut out = Vec::new();
    for v in [0.0f64, 0.0, 0.0] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    for n in [nx, ny, nz] {
        out.extend_from_slice(&(n as i32).to_be_bytes());
    }
    for v in [1000.0f64, 1000.0, 2.0] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&1i32.to_be_bytes());
    for n in [0, 0, 0, nx, ny, nz, 0, 0, 0] {
        out.extend_from_slice(&(n as i32).to_be_bytes());
    }
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v = grid.get(k, j, i).unwrap_or(0.0);
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    std::fs::write(path, out)
}
