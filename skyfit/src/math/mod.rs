//! Numeric building blocks: robust statistics and least-squares surface fits.

pub mod polynomial;
pub mod statistics;
