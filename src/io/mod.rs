pub mod csv;
pub mod hydrograph;
pub mod pfb;
