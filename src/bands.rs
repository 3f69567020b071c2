//! Frequency band utilities.
//!
//! Material coefficients are sampled at band centre frequencies. Libraries
//! come with their own band set (octave, third-octave, ...) and the solver may
//! want another, so coefficients are resampled by linear interpolation in
//! log-frequency. Outside the source range the end values are held, the way
//! `numpy.interp` behaves.

use ndarray::Array1;
use ndarray_interp::interp1d::{Interp1DBuilder, Linear};

use crate::error::{Error, Result};


/// Octave band centres commonly used for room acoustics, in Hz.
pub const OCTAVE_CENTERS: [f64; 6] = [125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0];

/// ISO 266 nominal third-octave band centres from 50 Hz to 10 kHz.
pub const THIRD_OCTAVE_CENTERS: [f64; 24] = [
    50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0, 400.0, 500.0, 630.0, 800.0,
    1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0, 6300.0, 8000.0, 10000.0,
];

/// Checks that band centres are finite, positive and strictly increasing.
pub fn validate_bands(bands: &[f64]) -> Result<()> {
    if bands.is_empty() {
        return Err(Error::InvalidBands("no bands given".to_string()));
    }
    if let Some(f) = bands.iter().find(|f| !f.is_finite() || **f <= 0.0) {
        return Err(Error::InvalidBands(format!(
            "band centre {} is not a positive frequency",
            f
        )));
    }
    if let Some(w) = bands.windows(2).find(|w| w[1] <= w[0]) {
        return Err(Error::InvalidBands(format!(
            "bands must be strictly increasing, found {} after {}",
            w[1], w[0]
        )));
    }
    Ok(())
}

/// Resamples `values` given at `src_freqs` onto `dst_freqs`, interpolating
/// linearly in log10(frequency) and clamping to the end values outside the
/// source range.
pub fn resample_bands(
    src_freqs: &Array1<f64>,
    values: &Array1<f64>,
    dst_freqs: &Array1<f64>,
) -> Result<Array1<f64>> {
    validate_bands(&src_freqs.to_vec())?;
    validate_bands(&dst_freqs.to_vec())?;
    if src_freqs.len() != values.len() {
        return Err(Error::Resample(format!(
            "{} bands but {} values",
            src_freqs.len(),
            values.len()
        )));
    }

    if src_freqs.len() == 1 {
        return Ok(Array1::from_elem(dst_freqs.len(), values[0]));
    }

    let log_src = src_freqs.mapv(f64::log10);
    let (lo, hi) = (log_src[0], log_src[log_src.len() - 1]);
    let query = dst_freqs.mapv(|f| f.log10().clamp(lo, hi));

    let interpolator = Interp1DBuilder::new(values.clone())
        .x(log_src)
        .strategy(Linear::new())
        .build()
        .map_err(|e| Error::Resample(e.to_string()))?;
    interpolator
        .interp_array(&query)
        .map_err(|e| Error::Resample(e.to_string()))
}
