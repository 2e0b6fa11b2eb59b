//! Least-squares fitting of 2D polynomial surfaces.
//!
//! Terms are ordered by total degree, then by falling power of `x`:
//! `1, x, y, x², xy, y², x³, ...`. Fits accumulate the normal equations
//! `(AᵀA) c = Aᵀb` sample by sample, so the design matrix is never stored.

use crate::config::{polynomial_terms, MAX_POLYNOMIAL_DEGREE};

/// Pivots smaller than this fraction of the largest diagonal entry of `AᵀA`
/// mark the system as singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitError {
    /// Fewer samples than polynomial terms.
    TooFewSamples { found: usize, required: usize },
    /// The normal equations have no unique solution.
    Singular,
}

/// Total-degree-`k` polynomial basis in two variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolynomialBasis {
    degree: u8,
}

impl PolynomialBasis {
    pub fn new(degree: u8) -> Self {
        assert!(
            degree <= MAX_POLYNOMIAL_DEGREE,
            "Polynomial degree must be 0-{MAX_POLYNOMIAL_DEGREE}"
        );
        Self { degree }
    }

    #[inline]
    pub fn degree(&self) -> u8 {
        self.degree
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        polynomial_terms(self.degree)
    }

    /// Writes the basis terms at `(x, y)` into `out[..num_terms]`.
    pub fn fill_terms(&self, x: f64, y: f64, out: &mut [f64]) {
        debug_assert!(out.len() >= self.num_terms());
        let k = self.degree as usize;
        let mut x_pow = [1.0; MAX_POLYNOMIAL_DEGREE as usize + 1];
        let mut y_pow = [1.0; MAX_POLYNOMIAL_DEGREE as usize + 1];
        for p in 1..=k {
            x_pow[p] = x_pow[p - 1] * x;
            y_pow[p] = y_pow[p - 1] * y;
        }
        let mut i = 0;
        for d in 0..=k {
            for j in 0..=d {
                out[i] = x_pow[d - j] * y_pow[j];
                i += 1;
            }
        }
    }

    /// Evaluates `Σ coeffs[i] · term_i(x, y)` using `scratch` for the terms.
    pub fn evaluate(&self, coeffs: &[f64], x: f64, y: f64, scratch: &mut [f64]) -> f64 {
        let n = self.num_terms();
        self.fill_terms(x, y, &mut scratch[..n]);
        scratch[..n].iter().zip(coeffs).map(|(t, c)| t * c).sum()
    }
}

/// Incrementally accumulated normal equations for a polynomial fit.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    basis: PolynomialBasis,
    /// Row-major `AᵀA`, `m × m`.
    ata: Vec<f64>,
    atb: Vec<f64>,
    terms: Vec<f64>,
    samples: usize,
}

impl NormalEquations {
    pub fn new(basis: PolynomialBasis) -> Self {
        let m = basis.num_terms();
        Self {
            basis,
            ata: vec![0.0; m * m],
            atb: vec![0.0; m],
            terms: vec![0.0; m],
            samples: 0,
        }
    }

    /// Clears accumulated samples, keeping allocations.
    pub fn reset(&mut self) {
        self.ata.fill(0.0);
        self.atb.fill(0.0);
        self.samples = 0;
    }

    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn add(&mut self, x: f64, y: f64, value: f64) {
        let m = self.terms.len();
        self.basis.fill_terms(x, y, &mut self.terms);
        for i in 0..m {
            let ti = self.terms[i];
            self.atb[i] += ti * value;
            // Upper triangle only; mirrored in solve().
            for j in i..m {
                self.ata[i * m + j] += ti * self.terms[j];
            }
        }
        self.samples += 1;
    }

    /// Solves for the polynomial coefficients.
    pub fn solve(&self) -> Result<Vec<f64>, FitError> {
        let m = self.terms.len();
        if self.samples < m {
            return Err(FitError::TooFewSamples {
                found: self.samples,
                required: m,
            });
        }

        let mut a = self.ata.clone();
        for i in 0..m {
            for j in 0..i {
                a[i * m + j] = a[j * m + i];
            }
        }
        solve_linear_system(&mut a, self.atb.clone(), m)
    }
}

/// Solve `a · x = b` (`a` is `n × n`, row-major) by Gaussian elimination with
/// partial pivoting. `a` is destroyed.
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(a: &mut [f64], mut b: Vec<f64>, n: usize) -> Result<Vec<f64>, FitError> {
    let scale = (0..n).map(|i| a[i * n + i].abs()).fold(0.0, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return Err(FitError::Singular);
    }
    let threshold = scale * SINGULAR_TOLERANCE;

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col * n + col].abs();
        for row in (col + 1)..n {
            let val = a[row * n + col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < threshold {
            return Err(FitError::Singular);
        }

        if max_row != col {
            for j in 0..n {
                a.swap(col * n + j, max_row * n + j);
            }
            b.swap(col, max_row);
        }

        for row in (col + 1)..n {
            let factor = a[row * n + col] / a[col * n + col];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                a[row * n + j] -= factor * a[col * n + j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i * n + j] * x[j];
        }
        x[i] = sum / a[i * n + i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(FitError::Singular)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_degree_2() {
        let basis = PolynomialBasis::new(2);
        let mut out = [0.0; 6];
        basis.fill_terms(0.5, -2.0, &mut out);
        // 1, x, y, x², xy, y²
        let expected = [1.0, 0.5, -2.0, 0.25, -1.0, 4.0];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12, "{out:?}");
        }
    }

    #[test]
    fn test_terms_at_zero_x() {
        let basis = PolynomialBasis::new(3);
        let mut out = [0.0; 10];
        basis.fill_terms(0.0, 2.0, &mut out);
        // 1, x, y, x², xy, y², x³, x²y, xy², y³
        let expected = [1.0, 0.0, 2.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 8.0];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_terms_degree_0() {
        let basis = PolynomialBasis::new(0);
        let mut out = [0.0; 1];
        basis.fill_terms(3.0, 4.0, &mut out);
        assert_eq!(out, [1.0]);
    }

    #[test]
    fn test_fit_recovers_quadratic() {
        let basis = PolynomialBasis::new(2);
        let truth = [1.5, -0.5, 2.0, 0.25, -1.0, 0.75];
        let mut scratch = [0.0; 6];
        let mut normal = NormalEquations::new(basis);
        for iy in 0..9 {
            for ix in 0..9 {
                let x = -1.0 + ix as f64 * 0.25;
                let y = -1.0 + iy as f64 * 0.25;
                let v = basis.evaluate(&truth, x, y, &mut scratch);
                normal.add(x, y, v);
            }
        }
        let coeffs = normal.solve().unwrap();
        for (c, t) in coeffs.iter().zip(truth) {
            assert!((c - t).abs() < 1e-9, "{coeffs:?}");
        }
    }

    #[test]
    fn test_fit_too_few_samples() {
        let mut normal = NormalEquations::new(PolynomialBasis::new(1));
        normal.add(0.0, 0.0, 1.0);
        normal.add(1.0, 0.0, 1.0);
        assert_eq!(
            normal.solve(),
            Err(FitError::TooFewSamples {
                found: 2,
                required: 3
            })
        );
    }

    #[test]
    fn test_collinear_samples_are_singular() {
        // All samples on y = 0 cannot constrain the y coefficient.
        let mut normal = NormalEquations::new(PolynomialBasis::new(1));
        for i in 0..10 {
            normal.add(i as f64 * 0.1, 0.0, 2.0);
        }
        assert_eq!(normal.solve(), Err(FitError::Singular));
    }

    #[test]
    fn test_reset_clears_samples() {
        let mut normal = NormalEquations::new(PolynomialBasis::new(0));
        normal.add(0.0, 0.0, 5.0);
        normal.reset();
        assert_eq!(normal.samples(), 0);
        normal.add(0.3, 0.1, 2.0);
        assert_eq!(normal.solve().unwrap(), vec![2.0]);
    }
}
