// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Frequency-frequency weighting ("delay weighting") for delay-weighted abscal.

The expected variance of the visibilities as a function of delay is supplied
per baseline-length bin. For each baseline, the variance of its bin is
interpolated onto an oversampled delay grid, inverted, and inverse Fourier
transformed back into the frequency domain. The first `Nfreqs` lags of the
result define a Hermitian Toeplitz matrix for that baseline.
 */

mod error;

pub use error::DelayWeightError;

use log::{debug, warn};
use ndarray::prelude::*;
use rustfft::FftPlanner;

use crate::{
    c64,
    context::CalData,
    math::{fft_freqs, interp},
    params::DelayWeightParams,
};

/// The index of the baseline-length bin containing `length`, if any. `edges`
/// must be ascending.
fn coverage_bin(length: f64, edges: &[f64]) -> Option<usize> {
    let num_le = edges.partition_point(|&e| e <= length);
    if num_le == 0 || num_le >= edges.len() {
        None
    } else {
        Some(num_le - 1)
    }
}

/// Calculate the delay-weighting matrices of each baseline. The returned
/// array has shape `(Nbls, Nfreqs, Nfreqs)`.
///
/// Baselines whose lengths aren't covered by any bin get a matrix of zeros,
/// which drops them from delay-weighted abscal. The matrices are scaled so
/// that the sum of their traces is `Nfreqs * Nbls`, as it would be for
/// identity matrices.
pub fn delay_weight_matrices(
    baseline_lengths: &[f64],
    num_freqs: usize,
    channel_width: f64,
    params: &DelayWeightParams,
) -> Result<Array3<c64>, DelayWeightError> {
    params.validate()?;
    if num_freqs == 0 {
        return Err(DelayWeightError::NoFrequencies);
    }
    if !(channel_width > 0.0 && channel_width.is_finite()) {
        return Err(DelayWeightError::BadChannelWidth(channel_width));
    }

    let num_delays = num_freqs * params.oversample_factor;
    let delays = fft_freqs(num_delays, channel_width);
    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(num_delays);
    let ifft_scale = 1.0 / num_delays as f64;

    // Many baselines share a bin; only transform each bin once.
    let num_bins = params.delay_spectrum_variance.nrows();
    let mut bin_lags: Vec<Option<Vec<c64>>> = vec![None; num_bins];

    let num_bls = baseline_lengths.len();
    let mut weights = Array3::zeros((num_bls, num_freqs, num_freqs));
    for (&length, mut weight_mat) in baseline_lengths.iter().zip(weights.outer_iter_mut()) {
        let bin = match coverage_bin(length, &params.bl_length_bin_edges) {
            Some(b) => b,
            None => {
                warn!("Baseline length range does not cover baseline of length {length} m. Skipping.");
                continue;
            }
        };

        let lags = bin_lags[bin].get_or_insert_with(|| {
            let variance = params.delay_spectrum_variance.row(bin).to_vec();
            let mut buffer: Vec<c64> = delays
                .iter()
                .map(|&delay| c64::new(1.0 / interp(delay, &params.delay_axis, &variance), 0.0))
                .collect();
            ifft.process(&mut buffer);
            buffer.truncate(num_freqs);
            buffer.iter_mut().for_each(|v| *v *= ifft_scale);
            buffer
        });

        for ((f1, f2), w) in weight_mat.indexed_iter_mut() {
            let lag = lags[f1.abs_diff(f2)];
            *w = if f1 < f2 { lag.conj() } else { lag };
        }
    }

    let trace_sum: f64 = weights
        .outer_iter()
        .map(|m| m.diag().iter().map(|v| v.re).sum::<f64>())
        .sum();
    if trace_sum == 0.0 || !trace_sum.is_finite() {
        return Err(DelayWeightError::NoCoverage);
    }
    let normalisation = (num_freqs * num_bls) as f64 / trace_sum;
    debug!("Delay weight normalisation factor: {normalisation}");
    weights.mapv_inplace(|w| w * normalisation);

    Ok(weights)
}

/// Calculate the delay-weighting matrices of `cal_data`'s baselines and store
/// them as its `dwcal_inv_covariance`, the same for all times and visibility
/// polarisations.
pub fn get_dwcal_weights_from_delay_spectra(
    cal_data: &mut CalData,
    params: &DelayWeightParams,
) -> Result<(), DelayWeightError> {
    let matrices = delay_weight_matrices(
        &cal_data.metadata.baseline_lengths(),
        cal_data.num_freqs(),
        cal_data.metadata.channel_width,
        params,
    )?;
    let shape = (
        cal_data.num_times(),
        cal_data.num_baselines(),
        cal_data.num_freqs(),
        cal_data.num_freqs(),
        cal_data.num_vis_pols(),
    );
    cal_data.dwcal_inv_covariance = Some(Array5::from_shape_fn(shape, |(_, b, f1, f2, _)| {
        matrices[(b, f1, f2)]
    }));
    Ok(())
}
