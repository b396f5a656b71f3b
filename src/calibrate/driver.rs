// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solving a single calibration sub-problem: flattening parameters for the
//! optimiser, running it and unpacking (and tidying) the result.

use log::{debug, info};
use ndarray::prelude::*;

use super::SolveReport;
use crate::{
    c64,
    context::{BaselineMap, FeedPol},
    cost::{
        cost_function_abs_cal, cost_function_dw_abscal, cost_function_single_pol, hess_abs_cal,
        hess_dw_abscal, hessian_single_pol, jacobian_abs_cal, jacobian_dw_abscal,
        jacobian_single_pol,
    },
    math::{cexp, circular_mean_phase},
    optimise::{minimise_newton_cg, Objective},
    params::{AbscalParams, CalibrationParams},
};

const NAN_GAIN: c64 = c64::new(f64::NAN, f64::NAN);

/// Gains are flattened as `[re..., im...]`.
fn flatten_gains(gains: ArrayView1<c64>) -> Array1<f64> {
    gains
        .iter()
        .map(|g| g.re)
        .chain(gains.iter().map(|g| g.im))
        .collect()
}

fn unflatten_gains(x: ArrayView1<f64>) -> Array1<c64> {
    let num_ants = x.len() / 2;
    Array1::from_shape_fn(num_ants, |i| c64::new(x[i], x[num_ants + i]))
}

struct GainObjective<'a> {
    model: ArrayView2<'a, c64>,
    data: ArrayView2<'a, c64>,
    weights: ArrayView2<'a, f64>,
    baselines: &'a BaselineMap,
    lambda_val: f64,
}

impl Objective for GainObjective<'_> {
    fn cost(&self, x: ArrayView1<f64>) -> f64 {
        cost_function_single_pol(
            unflatten_gains(x).view(),
            self.model,
            self.data,
            self.weights,
            self.baselines,
            self.lambda_val,
        )
    }

    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let jac = jacobian_single_pol(
            unflatten_gains(x).view(),
            self.model,
            self.data,
            self.weights,
            self.baselines,
            self.lambda_val,
        );
        flatten_gains(jac.view())
    }

    fn hessian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        hessian_single_pol(
            unflatten_gains(x).view(),
            self.model,
            self.data,
            self.weights,
            self.baselines,
            self.lambda_val,
        )
        .assemble()
    }
}

/// Solve for the gains of a single frequency and feed polarisation.
///
/// * `initial_gains` has shape `(Nants,)`
/// * `model`, `data` and `weights` have shape `(Ntimes, Nbls)`
///
/// Antennas without any unflagged visibilities are left out of the solve and
/// get NaN gains. If everything is flagged, the optimiser isn't run at all.
/// The solved gains are rotated so that the circular mean of their phases is
/// zero.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve_gains(
    initial_gains: ArrayView1<c64>,
    model: ArrayView2<c64>,
    data: ArrayView2<c64>,
    weights: ArrayView2<f64>,
    baselines: &BaselineMap,
    params: &CalibrationParams,
    feed_pol: FeedPol,
    freq_index: usize,
) -> (Array1<c64>, SolveReport) {
    let num_ants = initial_gains.len();
    let ant_weights = baselines.antenna_weights(weights);
    let keep: Vec<bool> = ant_weights.iter().map(|&w| w > 0.0).collect();
    let kept_ants: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter(|(_, &k)| k)
        .map(|(i, _)| i)
        .collect();
    if kept_ants.is_empty() {
        let report = SolveReport::all_flagged(feed_pol, Some(freq_index));
        report.log();
        return (Array1::from_elem(num_ants, NAN_GAIN), report);
    }

    let (sub_baselines, kept_baselines) = baselines.subset(&keep);
    let model = model.select(Axis(1), &kept_baselines);
    let data = data.select(Axis(1), &kept_baselines);
    let weights = weights.select(Axis(1), &kept_baselines);
    let objective = GainObjective {
        model: model.view(),
        data: data.view(),
        weights: weights.view(),
        baselines: &sub_baselines,
        lambda_val: params.lambda_val,
    };

    // The phase regulariser isn't differentiable at zero.
    let x0 = flatten_gains(
        kept_ants
            .iter()
            .map(|&i| {
                let g = initial_gains[i];
                if g.is_finite() && g.norm_sqr() > 0.0 {
                    g
                } else {
                    c64::new(1.0, 0.0)
                }
            })
            .collect::<Array1<_>>()
            .view(),
    );
    let initial_cost = objective.cost(x0.view());
    let result = minimise_newton_cg(&objective, x0.view(), params.xtol, params.maxiter);

    let mut solved = unflatten_gains(result.x.view());
    let mean_phase = circular_mean_phase(solved.iter());
    if mean_phase.is_finite() {
        let rotation = cexp(-mean_phase);
        solved.mapv_inplace(|g| g * rotation);
    }
    let mut gains = Array1::from_elem(num_ants, NAN_GAIN);
    for (&i_ant, &g) in kept_ants.iter().zip(solved.iter()) {
        gains[i_ant] = g;
    }

    let report = SolveReport::from_result(
        feed_pol,
        Some(freq_index),
        initial_cost,
        &result,
        num_ants - kept_ants.len(),
    );
    report.log();
    (gains, report)
}

struct AbscalObjective<'a> {
    model: ArrayView2<'a, c64>,
    data: ArrayView2<'a, c64>,
    uv: ArrayView2<'a, f64>,
    weights: ArrayView2<'a, f64>,
}

impl Objective for AbscalObjective<'_> {
    fn cost(&self, x: ArrayView1<f64>) -> f64 {
        cost_function_abs_cal(x[0], [x[1], x[2]], self.model, self.data, self.uv, self.weights)
    }

    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        jacobian_abs_cal(x[0], [x[1], x[2]], self.model, self.data, self.uv, self.weights)
    }

    fn hessian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        hess_abs_cal(x[0], [x[1], x[2]], self.model, self.data, self.uv, self.weights)
    }
}

/// Solve for the abscal parameters (amp, φx, φy) of a single frequency and
/// feed polarisation.
///
/// * `initial` has shape `(3,)`
/// * `model`, `data` and `weights` have shape `(Ntimes, Nbls)`
/// * `uv` has shape `(Nbls, 2)`
///
/// If everything is flagged, NaN parameters are returned.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve_abscal<'a>(
    initial: ArrayView1<f64>,
    model: ArrayView2<'a, c64>,
    data: ArrayView2<'a, c64>,
    uv: ArrayView2<'a, f64>,
    weights: ArrayView2<'a, f64>,
    params: &AbscalParams,
    feed_pol: FeedPol,
    freq_index: usize,
) -> (Array1<f64>, SolveReport) {
    if !weights.iter().any(|&w| w > 0.0) {
        let report = SolveReport::all_flagged(feed_pol, Some(freq_index));
        report.log();
        return (Array1::from_elem(3, f64::NAN), report);
    }

    let objective = AbscalObjective {
        model,
        data,
        uv,
        weights,
    };
    let x0 = if initial.iter().all(|v| v.is_finite()) {
        initial.to_owned()
    } else {
        array![1.0, 0.0, 0.0]
    };
    let initial_cost = objective.cost(x0.view());
    let result = minimise_newton_cg(&objective, x0.view(), params.xtol, params.maxiter);

    let mut solved = result.x.clone();
    // Only the square of the amplitude is constrained.
    solved[0] = solved[0].abs();
    let report = SolveReport::from_result(feed_pol, Some(freq_index), initial_cost, &result, 0);
    report.log();
    (solved, report)
}

struct DwAbscalObjective<'a> {
    model: ArrayView3<'a, c64>,
    data: ArrayView3<'a, c64>,
    uv: ArrayView2<'a, f64>,
    weights: ArrayView3<'a, f64>,
    inv_covariance: ArrayView4<'a, c64>,
}

impl DwAbscalObjective<'_> {
    /// Parameters are flattened as `[amp..., φx..., φy...]`, each over
    /// frequency.
    fn unflatten(x: ArrayView1<f64>) -> Array2<f64> {
        let num_freqs = x.len() / 3;
        Array2::from_shape_fn((3, num_freqs), |(p, f)| x[p * num_freqs + f])
    }
}

impl Objective for DwAbscalObjective<'_> {
    fn cost(&self, x: ArrayView1<f64>) -> f64 {
        let params = Self::unflatten(x);
        cost_function_dw_abscal(
            params.row(0),
            params.slice(s![1.., ..]),
            self.model,
            self.data,
            self.uv,
            self.weights,
            self.inv_covariance,
        )
    }

    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let params = Self::unflatten(x);
        jacobian_dw_abscal(
            params.row(0),
            params.slice(s![1.., ..]),
            self.model,
            self.data,
            self.uv,
            self.weights,
            self.inv_covariance,
        )
        .iter()
        .copied()
        .collect()
    }

    fn hessian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        let params = Self::unflatten(x);
        hess_dw_abscal(
            params.row(0),
            params.slice(s![1.., ..]),
            self.model,
            self.data,
            self.uv,
            self.weights,
            self.inv_covariance,
        )
    }
}

/// Solve for the abscal parameters of every frequency of a single feed
/// polarisation jointly, weighting residuals across frequency.
///
/// * `initial` has shape `(3, Nfreqs)`
/// * `model`, `data` and `weights` have shape `(Ntimes, Nbls, Nfreqs)`
/// * `uv` has shape `(Nbls, 2)`
/// * `inv_covariance` has shape `(Ntimes, Nbls, Nfreqs, Nfreqs)`
///
/// Frequencies without any unflagged visibilities get NaN parameters.
#[allow(clippy::too_many_arguments)]
pub(crate) fn solve_dw_abscal<'a>(
    initial: ArrayView2<f64>,
    model: ArrayView3<'a, c64>,
    data: ArrayView3<'a, c64>,
    uv: ArrayView2<'a, f64>,
    weights: ArrayView3<'a, f64>,
    inv_covariance: ArrayView4<'a, c64>,
    params: &AbscalParams,
    feed_pol: FeedPol,
) -> (Array2<f64>, SolveReport) {
    let num_freqs = initial.len_of(Axis(1));
    let freq_flagged: Vec<bool> = weights
        .axis_iter(Axis(2))
        .map(|w| !w.iter().any(|&w| w > 0.0))
        .collect();
    if freq_flagged.iter().all(|&f| f) {
        let report = SolveReport::all_flagged(feed_pol, None);
        report.log();
        return (Array2::from_elem((3, num_freqs), f64::NAN), report);
    }

    let objective = DwAbscalObjective {
        model,
        data,
        uv,
        weights,
        inv_covariance,
    };
    let mut x0 = initial.to_owned();
    for mut column in x0.columns_mut() {
        if column.iter().any(|v| !v.is_finite()) {
            column.assign(&array![1.0, 0.0, 0.0]);
        }
    }
    let x0: Array1<f64> = x0.iter().copied().collect();

    let initial_cost = objective.cost(x0.view());
    info!("{feed_pol} delay-weighted abscal: initial cost {initial_cost:e}");
    let result = minimise_newton_cg(&objective, x0.view(), params.xtol, params.maxiter);
    let final_grad = objective.gradient(result.x.view());
    info!(
        "{feed_pol} delay-weighted abscal: final cost {:e} after {} iterations",
        result.cost, result.num_iterations
    );
    debug!("{feed_pol} delay-weighted abscal: final gradient {final_grad}");

    let mut solved = DwAbscalObjective::unflatten(result.x.view());
    solved.row_mut(0).mapv_inplace(f64::abs);
    for (mut column, &flagged) in solved.columns_mut().into_iter().zip(freq_flagged.iter()) {
        if flagged {
            column.fill(f64::NAN);
        }
    }

    let report = SolveReport::from_result(feed_pol, None, initial_cost, &result, 0);
    report.log();
    (solved, report)
}
