// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-polarisation, single-frequency gain cost function.
//!
//! cost = Σ weight |data - g_i conj(g_j) model|² + λ (Σ_k arg(g_k))²
//!
//! The second term removes the degeneracy of a global phase rotation of all
//! gains.

use ndarray::prelude::*;

use crate::{c64, context::BaselineMap};

/// The Hessian of [`cost_function_single_pol`], split into blocks. `Nants` is
/// the number of gains.
#[derive(Debug, Clone)]
pub struct GainHessian {
    /// ∂²C / ∂Re(g_k) ∂Re(g_l). Shape `(Nants, Nants)`.
    pub real_real: Array2<f64>,

    /// ∂²C / ∂Im(g_k) ∂Re(g_l). Shape `(Nants, Nants)`.
    pub real_imag: Array2<f64>,

    /// ∂²C / ∂Im(g_k) ∂Im(g_l). Shape `(Nants, Nants)`.
    pub imag_imag: Array2<f64>,
}

impl GainHessian {
    fn zeros(num_ants: usize) -> GainHessian {
        GainHessian {
            real_real: Array2::zeros((num_ants, num_ants)),
            real_imag: Array2::zeros((num_ants, num_ants)),
            imag_imag: Array2::zeros((num_ants, num_ants)),
        }
    }

    /// Assemble the full `(2 Nants, 2 Nants)` Hessian. The first `Nants` rows
    /// and columns correspond to the real parts of the gains, and the rest to
    /// the imaginary parts.
    pub fn assemble(&self) -> Array2<f64> {
        let n = self.real_real.nrows();
        let mut hess = Array2::zeros((2 * n, 2 * n));
        hess.slice_mut(s![..n, ..n]).assign(&self.real_real);
        hess.slice_mut(s![n.., ..n]).assign(&self.real_imag);
        hess.slice_mut(s![..n, n..]).assign(&self.real_imag.t());
        hess.slice_mut(s![n.., n..]).assign(&self.imag_imag);
        hess
    }
}

/// The sum of the gain phases, and the derivatives of each phase with respect
/// to the real and imaginary parts of its gain.
fn phase_sum_and_derivatives(gains: ArrayView1<c64>) -> (f64, Vec<(f64, f64)>) {
    let sum = gains.iter().map(|g| g.arg()).sum();
    let derivs = gains
        .iter()
        .map(|g| {
            let norm_sqr = g.norm_sqr();
            (-g.im / norm_sqr, g.re / norm_sqr)
        })
        .collect();
    (sum, derivs)
}

/// Calculate the value of the cost function.
///
/// * `gains` has shape `(Nants,)`
/// * `model_visibilities`, `data_visibilities` and `visibility_weights` have
///   shape `(Ntimes, Nbls)`
/// * `lambda_val` is the weight of the phase regularisation term
pub fn cost_function_single_pol(
    gains: ArrayView1<c64>,
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    visibility_weights: ArrayView2<f64>,
    baselines: &BaselineMap,
    lambda_val: f64,
) -> f64 {
    let mut cost = 0.0;
    for ((model_b, data_b), weights_b) in model_visibilities
        .outer_iter()
        .zip(data_visibilities.outer_iter())
        .zip(visibility_weights.outer_iter())
    {
        for (((&m, &d), &w), (i, j)) in model_b
            .iter()
            .zip(data_b.iter())
            .zip(weights_b.iter())
            .zip(baselines.iter())
        {
            if w == 0.0 {
                continue;
            }
            let residual = d - gains[i] * gains[j].conj() * m;
            cost += w * residual.norm_sqr();
        }
    }

    let (phase_sum, _) = phase_sum_and_derivatives(gains);
    cost + lambda_val * phase_sum * phase_sum
}

/// Calculate the derivatives of the cost function with respect to the gains.
/// The real part of each returned value is the derivative with respect to
/// the real part of the gain; the imaginary part is the derivative with
/// respect to the imaginary part of the gain. Shape `(Nants,)`.
pub fn jacobian_single_pol(
    gains: ArrayView1<c64>,
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    visibility_weights: ArrayView2<f64>,
    baselines: &BaselineMap,
    lambda_val: f64,
) -> Array1<c64> {
    let mut jac = Array1::zeros(gains.len());
    for ((model_b, data_b), weights_b) in model_visibilities
        .outer_iter()
        .zip(data_visibilities.outer_iter())
        .zip(visibility_weights.outer_iter())
    {
        for (((&m, &d), &w), (i, j)) in model_b
            .iter()
            .zip(data_b.iter())
            .zip(weights_b.iter())
            .zip(baselines.iter())
        {
            if w == 0.0 {
                continue;
            }
            let (gi, gj) = (gains[i], gains[j]);
            let residual = d - gi * gj.conj() * m;
            jac[i] -= 2.0 * w * gj * m.conj() * residual;
            jac[j] -= 2.0 * w * gi * m * residual.conj();
        }
    }

    let (phase_sum, phase_derivs) = phase_sum_and_derivatives(gains);
    let scale = 2.0 * lambda_val * phase_sum;
    for (jac, (d_re, d_im)) in jac.iter_mut().zip(phase_derivs) {
        *jac += c64::new(scale * d_re, scale * d_im);
    }
    jac
}

/// Calculate the Hessian of the cost function with respect to the real and
/// imaginary parts of the gains.
pub fn hessian_single_pol(
    gains: ArrayView1<c64>,
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    visibility_weights: ArrayView2<f64>,
    baselines: &BaselineMap,
    lambda_val: f64,
) -> GainHessian {
    let num_ants = gains.len();
    let mut hess = GainHessian::zeros(num_ants);
    let GainHessian {
        real_real,
        real_imag,
        imag_imag,
    } = &mut hess;

    for ((model_b, data_b), weights_b) in model_visibilities
        .outer_iter()
        .zip(data_visibilities.outer_iter())
        .zip(visibility_weights.outer_iter())
    {
        for (((&m, &d), &w), (i, j)) in model_b
            .iter()
            .zip(data_b.iter())
            .zip(weights_b.iter())
            .zip(baselines.iter())
        {
            if w == 0.0 {
                continue;
            }
            let (gi, gj) = (gains[i], gains[j]);
            let model_norm_sqr = m.norm_sqr();
            let residual = d - gi * gj.conj() * m;
            let gain_product = gi * gj * model_norm_sqr;
            let res_model = residual.conj() * m;
            let w2 = 2.0 * w;

            // Terms with the same antenna.
            let diag_i = w2 * gj.norm_sqr() * model_norm_sqr;
            let diag_j = w2 * gi.norm_sqr() * model_norm_sqr;
            real_real[(i, i)] += diag_i;
            imag_imag[(i, i)] += diag_i;
            real_real[(j, j)] += diag_j;
            imag_imag[(j, j)] += diag_j;

            // Terms between the baseline's two antennas.
            let rr = w2 * (gain_product.re - res_model.re);
            real_real[(i, j)] += rr;
            real_real[(j, i)] += rr;
            let ii = w2 * (-gain_product.re - res_model.re);
            imag_imag[(i, j)] += ii;
            imag_imag[(j, i)] += ii;
            // ∂Im(g_i) ∂Re(g_j)
            real_imag[(i, j)] += w2 * (gain_product.im + res_model.im);
            // ∂Im(g_j) ∂Re(g_i)
            real_imag[(j, i)] += w2 * (gain_product.im - res_model.im);
        }
    }

    // Phase regularisation.
    let (phase_sum, phase_derivs) = phase_sum_and_derivatives(gains);
    let two_lambda = 2.0 * lambda_val;
    for (k, &(dk_re, dk_im)) in phase_derivs.iter().enumerate() {
        for (l, &(dl_re, dl_im)) in phase_derivs.iter().enumerate() {
            real_real[(k, l)] += two_lambda * dk_re * dl_re;
            imag_imag[(k, l)] += two_lambda * dk_im * dl_im;
            real_imag[(k, l)] += two_lambda * dk_im * dl_re;
        }
    }
    for (k, g) in gains.iter().enumerate() {
        let norm_4 = g.norm_sqr().powi(2);
        let scale = two_lambda * phase_sum / norm_4;
        real_real[(k, k)] += scale * 2.0 * g.re * g.im;
        imag_imag[(k, k)] -= scale * 2.0 * g.re * g.im;
        real_imag[(k, k)] += scale * (g.im * g.im - g.re * g.re);
    }

    hess
}
