// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The relative phase between the gains of the two feed polarisations.
//!
//! Per-polarisation calibration leaves each feed's gains with an arbitrary
//! overall phase. Only the cross-hand visibilities constrain the difference.
//! Rotating the first feed's gains by `exp(-iψ/2)` and the second feed's by
//! `exp(iψ/2)` multiplies the (feed 0, feed 1) prediction by `exp(-iψ)` and the
//! (feed 1, feed 0) prediction by `exp(iψ)`; ψ has a closed-form weighted
//! least-squares solution.
//!
//! Cross-polarisation inputs have shape `(Ntimes, Nbls, 2)`, where index 0 of
//! the last axis is the (feed 0, feed 1) visibility polarisation (e.g. XY when
//! the feeds are ordered X, Y) and index 1 is (feed 1, feed 0).

use ndarray::prelude::*;

use crate::{c64, context::BaselineMap, math::cexp};

/// The predicted (feed 0, feed 1) and (feed 1, feed 0) visibilities of a
/// baseline.
fn predictions(gains: ArrayView2<c64>, i: usize, j: usize, model: ArrayView1<c64>) -> [c64; 2] {
    [
        gains[(i, 0)] * gains[(j, 1)].conj() * model[0],
        gains[(i, 1)] * gains[(j, 0)].conj() * model[1],
    ]
}

/// Find the crosspol phase ψ minimising [`crosspol_cost`].
///
/// * `gains` has shape `(Nants, 2)`
///
/// Flagged visibilities and those involving non-finite gains are ignored. If
/// nothing constrains the phase, 0 is returned.
pub fn set_crosspol_phase(
    gains: ArrayView2<c64>,
    crosspol_model: ArrayView3<c64>,
    crosspol_data: ArrayView3<c64>,
    crosspol_weights: ArrayView3<f64>,
    baselines: &BaselineMap,
) -> f64 {
    let mut sum = c64::default();
    for ((model_t, data_t), weights_t) in crosspol_model
        .outer_iter()
        .zip(crosspol_data.outer_iter())
        .zip(crosspol_weights.outer_iter())
    {
        for (((model, data), weights), (i, j)) in model_t
            .outer_iter()
            .zip(data_t.outer_iter())
            .zip(weights_t.outer_iter())
            .zip(baselines.iter())
        {
            let [pred_01, pred_10] = predictions(gains, i, j, model);
            if weights[0] > 0.0 && pred_01.is_finite() && data[0].is_finite() {
                sum += weights[0] * data[0].conj() * pred_01;
            }
            if weights[1] > 0.0 && pred_10.is_finite() && data[1].is_finite() {
                sum += weights[1] * data[1] * pred_10.conj();
            }
        }
    }
    sum.arg()
}

/// The weighted sum of squared cross-polarisation residuals after applying
/// the crosspol phase `crosspol_phase` to the gains.
pub fn crosspol_cost(
    gains: ArrayView2<c64>,
    crosspol_phase: f64,
    crosspol_model: ArrayView3<c64>,
    crosspol_data: ArrayView3<c64>,
    crosspol_weights: ArrayView3<f64>,
    baselines: &BaselineMap,
) -> f64 {
    let rotations = [cexp(-crosspol_phase), cexp(crosspol_phase)];
    let mut cost = 0.0;
    for ((model_t, data_t), weights_t) in crosspol_model
        .outer_iter()
        .zip(crosspol_data.outer_iter())
        .zip(crosspol_weights.outer_iter())
    {
        for (((model, data), weights), (i, j)) in model_t
            .outer_iter()
            .zip(data_t.outer_iter())
            .zip(weights_t.outer_iter())
            .zip(baselines.iter())
        {
            let preds = predictions(gains, i, j, model);
            for k in 0..2 {
                if weights[k] > 0.0 {
                    cost += weights[k] * (data[k] - rotations[k] * preds[k]).norm_sqr();
                }
            }
        }
    }
    cost
}
