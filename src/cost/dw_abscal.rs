// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The delay-weighted absolute calibration cost function.
//!
//! Every frequency has its own (amp, φx, φy). The residuals of a baseline
//! across all frequencies form a vector r, and the cost of that baseline is
//! the quadratic form `r^H K r`, with
//! `K[p, q] = sqrt(w_p w_q) · inv_covariance[p, q]` for visibility weights w.
//! With an identity inverse covariance, the cost is the sum over frequencies of
//! the single-frequency abscal cost.
//!
//! The inverse covariance of each baseline must be Hermitian.

use ndarray::prelude::*;

use crate::{c64, math::cexp};

/// Quantities for a single (time, baseline), over all frequencies.
struct BaselineTerms {
    u: f64,
    v: f64,
    /// The phase-rotated model of each frequency.
    rotated_model: Vec<c64>,
    residual: Vec<c64>,
    /// The frequency-frequency weighting kernel. Shape `(Nfreqs, Nfreqs)`.
    kernel: Array2<c64>,
    /// `kernel · residual`.
    weighted_residual: Vec<c64>,
}

/// Iterate over every (time, baseline) with at least one unflagged
/// frequency.
#[allow(clippy::too_many_arguments)]
fn for_each_baseline<F: FnMut(&BaselineTerms)>(
    amp: ArrayView1<f64>,
    phase_grad: ArrayView2<f64>,
    model_visibilities: ArrayView3<c64>,
    data_visibilities: ArrayView3<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView3<f64>,
    dwcal_inv_covariance: ArrayView4<c64>,
    mut f: F,
) {
    let num_freqs = amp.len();
    for (((model_t, data_t), weights_t), inv_cov_t) in model_visibilities
        .outer_iter()
        .zip(data_visibilities.outer_iter())
        .zip(visibility_weights.outer_iter())
        .zip(dwcal_inv_covariance.outer_iter())
    {
        for ((((model, data), weights), inv_cov), uv) in model_t
            .outer_iter()
            .zip(data_t.outer_iter())
            .zip(weights_t.outer_iter())
            .zip(inv_cov_t.outer_iter())
            .zip(uv.outer_iter())
        {
            if !weights.iter().any(|&w| w > 0.0) {
                continue;
            }
            let (u, v) = (uv[0], uv[1]);

            // Flagged visibilities may be NaN; their terms are zeroed.
            let rotated_model: Vec<c64> = (0..num_freqs)
                .map(|i_freq| {
                    if weights[i_freq] > 0.0 {
                        cexp(phase_grad[(0, i_freq)] * u + phase_grad[(1, i_freq)] * v)
                            * model[i_freq]
                    } else {
                        c64::default()
                    }
                })
                .collect();
            let residual: Vec<c64> = (0..num_freqs)
                .map(|i_freq| {
                    if weights[i_freq] > 0.0 {
                        data[i_freq] - amp[i_freq].powi(2) * rotated_model[i_freq]
                    } else {
                        c64::default()
                    }
                })
                .collect();

            let sqrt_weights: Vec<f64> = weights.iter().map(|w| w.max(0.0).sqrt()).collect();
            let kernel = Array2::from_shape_fn((num_freqs, num_freqs), |(p, q)| {
                inv_cov[(p, q)] * (sqrt_weights[p] * sqrt_weights[q])
            });
            let weighted_residual: Vec<c64> = kernel
                .outer_iter()
                .map(|row| {
                    row.iter()
                        .zip(residual.iter())
                        .map(|(&k, &r)| k * r)
                        .sum()
                })
                .collect();

            f(&BaselineTerms {
                u,
                v,
                rotated_model,
                residual,
                kernel,
                weighted_residual,
            });
        }
    }
}

/// Calculate the value of the delay-weighted abscal cost function.
///
/// * `amp` has shape `(Nfreqs,)` and `phase_grad` has shape `(2, Nfreqs)`
/// * `model_visibilities`, `data_visibilities` and `visibility_weights` have
///   shape `(Ntimes, Nbls, Nfreqs)`
/// * `uv` has shape `(Nbls, 2)` \[metres\]
/// * `dwcal_inv_covariance` has shape `(Ntimes, Nbls, Nfreqs, Nfreqs)`
#[allow(clippy::too_many_arguments)]
pub fn cost_function_dw_abscal(
    amp: ArrayView1<f64>,
    phase_grad: ArrayView2<f64>,
    model_visibilities: ArrayView3<c64>,
    data_visibilities: ArrayView3<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView3<f64>,
    dwcal_inv_covariance: ArrayView4<c64>,
) -> f64 {
    let mut cost = 0.0;
    for_each_baseline(
        amp,
        phase_grad,
        model_visibilities,
        data_visibilities,
        uv,
        visibility_weights,
        dwcal_inv_covariance,
        |t| {
            cost += t
                .residual
                .iter()
                .zip(t.weighted_residual.iter())
                .map(|(r, s)| (r.conj() * s).re)
                .sum::<f64>();
        },
    );
    cost
}

/// Calculate the derivatives of the delay-weighted abscal cost function.
/// Returns shape `(3, Nfreqs)`; the first axis is (amp, φx, φy).
#[allow(clippy::too_many_arguments)]
pub fn jacobian_dw_abscal(
    amp: ArrayView1<f64>,
    phase_grad: ArrayView2<f64>,
    model_visibilities: ArrayView3<c64>,
    data_visibilities: ArrayView3<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView3<f64>,
    dwcal_inv_covariance: ArrayView4<c64>,
) -> Array2<f64> {
    let mut jac = Array2::zeros((3, amp.len()));
    for_each_baseline(
        amp,
        phase_grad,
        model_visibilities,
        data_visibilities,
        uv,
        visibility_weights,
        dwcal_inv_covariance,
        |t| {
            for (i_freq, (&q, &s)) in t
                .rotated_model
                .iter()
                .zip(t.weighted_residual.iter())
                .enumerate()
            {
                let a = amp[i_freq];
                let sq = s.conj() * q;
                jac[(0, i_freq)] -= 4.0 * a * sq.re;
                jac[(1, i_freq)] += 2.0 * a * a * t.u * sq.im;
                jac[(2, i_freq)] += 2.0 * a * a * t.v * sq.im;
            }
        },
    );
    jac
}

/// Calculate the Hessian of the delay-weighted abscal cost function. Returns
/// shape `(3 Nfreqs, 3 Nfreqs)`, where parameter `p` at frequency `f` has
/// index `p * Nfreqs + f` and `p` counts (amp, φx, φy).
#[allow(clippy::too_many_arguments)]
pub fn hess_dw_abscal(
    amp: ArrayView1<f64>,
    phase_grad: ArrayView2<f64>,
    model_visibilities: ArrayView3<c64>,
    data_visibilities: ArrayView3<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView3<f64>,
    dwcal_inv_covariance: ArrayView4<c64>,
) -> Array2<f64> {
    let num_freqs = amp.len();
    let mut hess = Array2::zeros((3 * num_freqs, 3 * num_freqs));
    for_each_baseline(
        amp,
        phase_grad,
        model_visibilities,
        data_visibilities,
        uv,
        visibility_weights,
        dwcal_inv_covariance,
        |t| {
            // Derivatives of the predicted visibilities with respect to each
            // parameter.
            let mut derivs = Array2::<c64>::zeros((3, num_freqs));
            for (i_freq, &q) in t.rotated_model.iter().enumerate() {
                let a = amp[i_freq];
                derivs[(0, i_freq)] = 2.0 * a * q;
                derivs[(1, i_freq)] = c64::i() * t.u * a * a * q;
                derivs[(2, i_freq)] = c64::i() * t.v * a * a * q;
            }

            for ((f_a, f_b), &k) in t.kernel.indexed_iter() {
                if k == c64::default() {
                    continue;
                }
                for theta in 0..3 {
                    let lhs = derivs[(theta, f_a)].conj() * k;
                    for eta in 0..3 {
                        hess[(theta * num_freqs + f_a, eta * num_freqs + f_b)] +=
                            2.0 * (lhs * derivs[(eta, f_b)]).re;
                    }
                }
            }

            // Second derivatives of the predicted visibilities only couple
            // parameters of the same frequency.
            for (i_freq, (&q, &s)) in t
                .rotated_model
                .iter()
                .zip(t.weighted_residual.iter())
                .enumerate()
            {
                let a = amp[i_freq];
                let sq = s.conj() * q;
                let uv = [t.u, t.v];
                hess[(i_freq, i_freq)] -= 4.0 * sq.re;
                for (k, &uv_k) in uv.iter().enumerate() {
                    let cross = 4.0 * a * uv_k * sq.im;
                    hess[(i_freq, (k + 1) * num_freqs + i_freq)] += cross;
                    hess[((k + 1) * num_freqs + i_freq, i_freq)] += cross;
                    for (l, &uv_l) in uv.iter().enumerate() {
                        hess[((k + 1) * num_freqs + i_freq, (l + 1) * num_freqs + i_freq)] +=
                            2.0 * a * a * uv_k * uv_l * sq.re;
                    }
                }
            }
        },
    );
    hess
}
