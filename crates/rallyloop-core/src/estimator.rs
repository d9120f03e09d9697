//! Paddle position estimation from normalized channel intensities.
//!
//! Each sensor channel sits at a fixed point along the vertical axis of the
//! field: channel `i` of `N` at `(2i + 1) / (2N)` of the axis length (1/6,
//! 3/6 and 5/6 for the standard three-electrode array). A quadratic is fitted
//! through those points by least squares, evaluated on a uniform grid of
//! `axis_len` points from 0 to `axis_len`, and the paddle is centred on the
//! index of the first grid point where the curve peaks.
//!
//! With exactly three channels the fit passes through every point.

use libm::{fabs, round};
use nalgebra::{Matrix3, Vector3};

use crate::error::EstimateError;
use crate::types::NormalizedReading;

/// Channels needed for a quadratic fit.
pub const MIN_FIT_CHANNELS: usize = 3;

/// Curve spread below which the fit is treated as flat.
const FLAT_EPSILON: f64 = 1e-9;

/// Result of a successful estimate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EstimatedPosition {
    /// Grid index of the fitted peak
    pub peak: f32,
    /// Paddle top coordinate, clamped into the field
    pub paddle_top: i32,
}

/// Quadratic peak estimator for a fixed axis and paddle extent.
#[derive(Clone, Debug)]
pub struct PositionEstimator {
    axis_len: u32,
    extent: u32,
}

impl PositionEstimator {
    /// Create an estimator for an axis of `axis_len` units and a paddle
    /// spanning `extent` units along it.
    #[must_use]
    pub const fn new(axis_len: u32, extent: u32) -> Self {
        Self { axis_len, extent }
    }

    /// Axis length in field units.
    #[inline]
    #[must_use]
    pub const fn axis_len(&self) -> u32 {
        self.axis_len
    }

    /// Paddle extent along the axis.
    #[inline]
    #[must_use]
    pub const fn extent(&self) -> u32 {
        self.extent
    }

    /// Axis position of channel `index` out of `channels`.
    #[must_use]
    pub fn abscissa(&self, index: usize, channels: usize) -> f64 {
        if channels == 0 {
            return 0.0;
        }
        let fraction = (2 * index + 1) as f64 / (2 * channels) as f64;
        fraction * f64::from(self.axis_len)
    }

    /// Largest valid paddle top coordinate.
    #[inline]
    #[must_use]
    pub const fn max_top(&self) -> i32 {
        self.axis_len.saturating_sub(self.extent) as i32
    }

    /// Estimate the paddle position from a normalized reading.
    ///
    /// # Errors
    ///
    /// Returns an [`EstimateError`] when the reading is unusable; the caller
    /// should keep the previous position.
    pub fn estimate(&self, reading: &NormalizedReading) -> Result<EstimatedPosition, EstimateError> {
        let values = reading.values();
        if values.len() < MIN_FIT_CHANNELS {
            return Err(EstimateError::TooFewChannels {
                got: values.len() as u8,
                need: MIN_FIT_CHANNELS as u8,
            });
        }
        if let Some(channel) = values.iter().position(|v| !v.is_finite()) {
            return Err(EstimateError::NonFinite { channel: channel as u8 });
        }
        if self.axis_len < 2 {
            return Err(EstimateError::FlatResponse);
        }

        let coeffs = self.fit(values)?;
        let peak = self.peak(&coeffs)?;

        let half = f64::from(self.extent) / 2.0;
        let top = round(peak - half) as i32;
        Ok(EstimatedPosition {
            peak: peak as f32,
            paddle_top: top.clamp(0, self.max_top()),
        })
    }

    /// Least-squares quadratic over the channel abscissas.
    ///
    /// Abscissas are scaled into [0, 1] to keep the normal equations well
    /// conditioned. Returns `[c0, c1, c2]` for `c0 + c1*u + c2*u^2`.
    fn fit(&self, values: &[f32]) -> Result<Vector3<f64>, EstimateError> {
        let axis = f64::from(self.axis_len);
        let n = values.len();

        let mut ata = Matrix3::<f64>::zeros();
        let mut aty = Vector3::<f64>::zeros();
        for (i, &y) in values.iter().enumerate() {
            let u = self.abscissa(i, n) / axis;
            let row = Vector3::new(1.0, u, u * u);
            ata += row * row.transpose();
            aty += row * f64::from(y);
        }

        let inverse = ata.try_inverse().ok_or(EstimateError::Singular)?;
        let coeffs = inverse * aty;
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(EstimateError::Singular);
        }
        Ok(coeffs)
    }

    /// Index of the first grid point where the curve reaches its maximum.
    fn peak(&self, coeffs: &Vector3<f64>) -> Result<f64, EstimateError> {
        let axis = f64::from(self.axis_len);
        let points = self.axis_len as usize;
        let step = axis / (points - 1) as f64;

        let mut best_k = 0usize;
        let mut best_y = f64::NEG_INFINITY;
        let mut lowest = f64::INFINITY;
        for k in 0..points {
            let x = k as f64 * step;
            let u = x / axis;
            let y = coeffs[0] + coeffs[1] * u + coeffs[2] * u * u;
            if y > best_y {
                best_y = y;
                best_k = k;
            }
            if y < lowest {
                lowest = y;
            }
        }

        if fabs(best_y - lowest) < FLAT_EPSILON {
            return Err(EstimateError::FlatResponse);
        }
        Ok(best_k as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(values: &[f32]) -> NormalizedReading {
        NormalizedReading::new(0, values)
    }

    #[test]
    fn test_abscissas() {
        let est = PositionEstimator::new(600, 200);
        assert!((est.abscissa(0, 3) - 100.0).abs() < 1e-9);
        assert!((est.abscissa(1, 3) - 300.0).abs() < 1e-9);
        assert!((est.abscissa(2, 3) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_peak_at_middle_channel() {
        let est = PositionEstimator::new(600, 200);
        let pos = est.estimate(&reading(&[0.2, 1.0, 0.2])).unwrap();

        assert!((pos.peak - 300.0).abs() <= 1.0);
        assert!((pos.paddle_top - 200).abs() <= 1);
    }

    #[test]
    fn test_top_channel_clamps_to_zero() {
        let est = PositionEstimator::new(600, 200);
        let pos = est.estimate(&reading(&[1.0, 0.3, 0.0])).unwrap();

        assert!(pos.peak < 150.0);
        assert_eq!(pos.paddle_top, 0);
    }

    #[test]
    fn test_bottom_channel_clamps_to_max() {
        let est = PositionEstimator::new(600, 200);
        let pos = est.estimate(&reading(&[0.0, 0.1, 1.0])).unwrap();

        assert!((pos.peak - 599.0).abs() < 0.5);
        assert_eq!(pos.paddle_top, 400);
    }

    #[test]
    fn test_flat_reading_is_degenerate() {
        let est = PositionEstimator::new(600, 200);
        assert_eq!(
            est.estimate(&reading(&[0.5, 0.5, 0.5])),
            Err(EstimateError::FlatResponse)
        );
    }

    #[test]
    fn test_too_few_channels() {
        let est = PositionEstimator::new(600, 200);
        assert_eq!(
            est.estimate(&reading(&[0.5, 0.9])),
            Err(EstimateError::TooFewChannels { got: 2, need: 3 })
        );
    }

    #[test]
    fn test_more_channels_least_squares() {
        let est = PositionEstimator::new(600, 100);
        let pos = est.estimate(&reading(&[0.0, 0.4, 0.9, 0.9, 0.4, 0.0])).unwrap();

        assert!((pos.peak - 300.0).abs() < 5.0);
        assert!((pos.paddle_top - 250).abs() <= 5);
    }

    #[test]
    fn test_output_within_field() {
        let est = PositionEstimator::new(480, 160);
        for a in 0..5 {
            for b in 0..5 {
                let values = [a as f32 / 4.0, b as f32 / 4.0, 0.7];
                if let Ok(pos) = est.estimate(&reading(&values)) {
                    assert!(pos.paddle_top >= 0 && pos.paddle_top <= 320);
                }
            }
        }
    }
}
