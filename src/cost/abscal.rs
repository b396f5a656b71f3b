// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The single-frequency absolute calibration cost function.
//!
//! The predicted visibility of baseline b is
//! `amp² exp(i (φx u_b + φy v_b)) model_b`, where (u_b, v_b) is the position of
//! the baseline in the UV plane. The parameters are ordered (amp, φx, φy).

use ndarray::prelude::*;

use crate::{c64, math::cexp};

/// Per-visibility quantities shared by the cost function and its
/// derivatives.
struct AbscalTerm {
    weight: f64,
    u: f64,
    v: f64,
    /// The phase-rotated model.
    rotated_model: c64,
    residual: c64,
}

/// Iterate over every unflagged visibility, calling `f` with its
/// [`AbscalTerm`].
fn for_each_term<F: FnMut(AbscalTerm)>(
    amp: f64,
    phase_grad: [f64; 2],
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView2<f64>,
    mut f: F,
) {
    let amp_sqr = amp * amp;
    for ((model_b, data_b), weights_b) in model_visibilities
        .outer_iter()
        .zip(data_visibilities.outer_iter())
        .zip(visibility_weights.outer_iter())
    {
        for (((&m, &d), &weight), uv) in model_b
            .iter()
            .zip(data_b.iter())
            .zip(weights_b.iter())
            .zip(uv.outer_iter())
        {
            if weight == 0.0 {
                continue;
            }
            let (u, v) = (uv[0], uv[1]);
            let rotated_model = cexp(phase_grad[0] * u + phase_grad[1] * v) * m;
            f(AbscalTerm {
                weight,
                u,
                v,
                rotated_model,
                residual: d - amp_sqr * rotated_model,
            });
        }
    }
}

/// Calculate the value of the abscal cost function.
///
/// * `model_visibilities`, `data_visibilities` and `visibility_weights` have
///   shape `(Ntimes, Nbls)`
/// * `uv` has shape `(Nbls, 2)` \[metres\]
pub fn cost_function_abs_cal(
    amp: f64,
    phase_grad: [f64; 2],
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView2<f64>,
) -> f64 {
    let mut cost = 0.0;
    for_each_term(
        amp,
        phase_grad,
        model_visibilities,
        data_visibilities,
        uv,
        visibility_weights,
        |t| cost += t.weight * t.residual.norm_sqr(),
    );
    cost
}

/// Calculate the derivatives of the abscal cost function with respect to
/// (amp, φx, φy).
pub fn jacobian_abs_cal(
    amp: f64,
    phase_grad: [f64; 2],
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView2<f64>,
) -> Array1<f64> {
    let mut jac = Array1::zeros(3);
    let amp_sqr = amp * amp;
    for_each_term(
        amp,
        phase_grad,
        model_visibilities,
        data_visibilities,
        uv,
        visibility_weights,
        |t| {
            let rq = t.residual.conj() * t.rotated_model;
            jac[0] -= 4.0 * amp * t.weight * rq.re;
            jac[1] += 2.0 * amp_sqr * t.weight * t.u * rq.im;
            jac[2] += 2.0 * amp_sqr * t.weight * t.v * rq.im;
        },
    );
    jac
}

/// Calculate the 3x3 Hessian of the abscal cost function with respect to
/// (amp, φx, φy).
pub fn hess_abs_cal(
    amp: f64,
    phase_grad: [f64; 2],
    model_visibilities: ArrayView2<c64>,
    data_visibilities: ArrayView2<c64>,
    uv: ArrayView2<f64>,
    visibility_weights: ArrayView2<f64>,
) -> Array2<f64> {
    let mut hess = Array2::zeros((3, 3));
    let amp_sqr = amp * amp;
    let amp_4 = amp_sqr * amp_sqr;
    for_each_term(
        amp,
        phase_grad,
        model_visibilities,
        data_visibilities,
        uv,
        visibility_weights,
        |t| {
            let w = t.weight;
            let model_norm_sqr = t.rotated_model.norm_sqr();
            let rq = t.residual.conj() * t.rotated_model;
            let uv = [t.u, t.v];

            hess[(0, 0)] += w * (8.0 * amp_sqr * model_norm_sqr - 4.0 * rq.re);
            for (k, &uv_k) in uv.iter().enumerate() {
                hess[(0, k + 1)] += 4.0 * amp * w * uv_k * rq.im;
                for (l, &uv_l) in uv.iter().enumerate() {
                    hess[(k + 1, l + 1)] +=
                        2.0 * w * uv_k * uv_l * (amp_4 * model_norm_sqr + amp_sqr * rq.re);
                }
            }
        },
    );
    hess[(1, 0)] = hess[(0, 1)];
    hess[(2, 0)] = hess[(0, 2)];
    hess
}
