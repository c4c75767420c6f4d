use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Taper applied to an analysis window before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    Rectangular,
    Hann,
    Tukey,
}

/// Cosine fraction of the Tukey window.
pub const TUKEY_ALPHA: f64 = 0.2;

/// Symmetric Hann window of `n` points.
pub fn hann(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos())) as f32)
        .collect()
}

/// Tukey (tapered cosine) window of `n` points.
pub fn tukey(n: usize, alpha: f64) -> Vec<f32> {
    if n < 2 || alpha <= 0.0 {
        return vec![1.0; n];
    }
    if alpha >= 1.0 {
        return hann(n);
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = i as f64 / denom;
            let w = if x < alpha / 2.0 {
                0.5 * (1.0 + (2.0 * PI / alpha * (x - alpha / 2.0)).cos())
            } else if x <= 1.0 - alpha / 2.0 {
                1.0
            } else {
                0.5 * (1.0 + (2.0 * PI / alpha * (x - 1.0 + alpha / 2.0)).cos())
            };
            w as f32
        })
        .collect()
}

/// Precomputed taper plus the amplitude correction that restores the energy
/// removed by it (`1 / sqrt(Σw² / n)`).
#[derive(Debug, Clone)]
pub(crate) struct WindowTable {
    coefficients: Vec<f32>,
    energy_correction: f64,
}

impl WindowTable {
    pub(crate) fn new(window_type: WindowType, n: usize) -> Self {
        let coefficients = match window_type {
            WindowType::Rectangular => Vec::new(),
            WindowType::Hann => hann(n),
            WindowType::Tukey => tukey(n, TUKEY_ALPHA),
        };
        let energy_correction = if coefficients.is_empty() {
            1.0
        } else {
            let energy: f64 = coefficients.iter().map(|&w| (w as f64) * (w as f64)).sum();
            1.0 / (energy / n as f64).sqrt()
        };
        Self {
            coefficients,
            energy_correction,
        }
    }

    #[inline]
    pub(crate) fn weight(&self, index: usize) -> f32 {
        self.coefficients.get(index).copied().unwrap_or(1.0)
    }

    pub(crate) fn energy_correction(&self) -> f64 {
        self.energy_correction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hann_is_symmetric_and_zero_at_edges() {
        let w = hann(101);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[100], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[50], 1.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[10], w[90], epsilon = 1e-6);
    }

    #[test]
    fn hann_energy_correction_is_about_sqrt_8_over_3() {
        let table = WindowTable::new(WindowType::Hann, 44_100);
        assert_abs_diff_eq!(table.energy_correction(), (8.0f64 / 3.0).sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn tukey_is_flat_in_the_middle() {
        let w = tukey(1000, TUKEY_ALPHA);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-6);
        assert!(w[200..800].iter().all(|&v| v == 1.0));
        let table = WindowTable::new(WindowType::Tukey, 1000);
        assert!(table.energy_correction() > 1.0);
    }

    #[test]
    fn rectangular_has_unit_weights() {
        let table = WindowTable::new(WindowType::Rectangular, 64);
        assert_eq!(table.weight(10), 1.0);
        assert_eq!(table.energy_correction(), 1.0);
    }
}
