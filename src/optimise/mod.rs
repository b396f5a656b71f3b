// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A truncated-Newton (Newton-CG) minimiser for smooth real-valued cost
//! functions with analytic gradients and Hessians.
//!
//! Each outer iteration approximately solves `H p = -g` with conjugate
//! gradients, stopping early on negative curvature, then takes a
//! backtracking line search along `p`. Iteration stops once the sum of the
//! absolute parameter updates is no more than `n * xtol`.

#[cfg(test)]
mod tests;

use log::trace;
use ndarray::prelude::*;

/// Something that can be minimised with [`minimise_newton_cg`].
pub trait Objective {
    fn cost(&self, x: ArrayView1<f64>) -> f64;

    /// The derivatives of the cost with respect to each parameter.
    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64>;

    /// The second derivatives of the cost. This must be symmetric.
    fn hessian(&self, x: ArrayView1<f64>) -> Array2<f64>;
}

/// Why the optimiser stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxIterations,
    PrecisionLoss,
    CgMaxIterations,
    NonFiniteCost,
}

impl Termination {
    pub fn message(self) -> &'static str {
        match self {
            Termination::Converged => "Optimization terminated successfully.",
            Termination::MaxIterations => "Maximum number of iterations has been exceeded.",
            Termination::PrecisionLoss => {
                "Desired error not necessarily achieved due to precision loss."
            }
            Termination::CgMaxIterations => "CG iterations didn't converge. The Hessian is not positive definite.",
            Termination::NonFiniteCost => "The cost function returned a non-finite value.",
        }
    }
}

/// The result of [`minimise_newton_cg`].
#[derive(Debug, Clone)]
pub struct OptimiseResult {
    /// The best parameters found. When the optimiser hasn't converged, these
    /// may still be useful.
    pub x: Array1<f64>,

    /// The cost at `x`.
    pub cost: f64,

    /// The number of outer (Newton) iterations performed.
    pub num_iterations: usize,

    pub termination: Termination,
}

impl OptimiseResult {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    pub fn message(&self) -> &'static str {
        self.termination.message()
    }
}

/// The sufficient-decrease constant of the Armijo condition.
const ARMIJO_C1: f64 = 1e-4;

/// The maximum number of step halvings tried by the line search.
const MAX_LINE_SEARCH_HALVINGS: usize = 60;

/// Minimise `objective` starting from `x0`.
///
/// `xtol` is the average per-parameter step size below which the optimiser
/// is considered converged, and `maxiter` is the maximum number of Newton
/// iterations. Failing to converge isn't an error; the [`Termination`] in the
/// result says why the optimiser stopped.
pub fn minimise_newton_cg<O: Objective + ?Sized>(
    objective: &O,
    x0: ArrayView1<f64>,
    xtol: f64,
    maxiter: usize,
) -> OptimiseResult {
    let n = x0.len();
    let mut x = x0.to_owned();
    let mut cost = objective.cost(x.view());
    if !cost.is_finite() {
        return OptimiseResult {
            x,
            cost,
            num_iterations: 0,
            termination: Termination::NonFiniteCost,
        };
    }

    let xtol_total = n as f64 * xtol;
    let cg_maxiter = 20 * n.max(1);
    let mut update_size = 2.0 * xtol_total;
    let mut k = 0;

    while update_size > xtol_total {
        if k >= maxiter {
            return OptimiseResult {
                x,
                cost,
                num_iterations: k,
                termination: Termination::MaxIterations,
            };
        }

        let grad = objective.gradient(x.view());
        let hess = objective.hessian(x.view());
        let step = match conjugate_gradient_step(&grad, &hess, cg_maxiter) {
            Some(s) => s,
            None => {
                return OptimiseResult {
                    x,
                    cost,
                    num_iterations: k,
                    termination: Termination::CgMaxIterations,
                }
            }
        };

        match backtracking_line_search(objective, x.view(), cost, &grad, &step) {
            Some((alpha, new_cost)) => {
                let update = step * alpha;
                update_size = update.iter().map(|u| u.abs()).sum();
                x += &update;
                cost = new_cost;
            }
            None => {
                return OptimiseResult {
                    x,
                    cost,
                    num_iterations: k,
                    termination: Termination::PrecisionLoss,
                }
            }
        }
        k += 1;
        trace!("Newton-CG iteration {k}: cost {cost:e}, step {update_size:e}");
    }

    OptimiseResult {
        x,
        cost,
        num_iterations: k,
        termination: Termination::Converged,
    }
}

/// Approximately solve `hess · p = -grad` with conjugate gradients. The
/// tolerance tightens as the gradient shrinks. If negative curvature is found
/// on the first CG iteration, a scaled steepest-descent step is returned.
/// `None` is returned if CG doesn't terminate within `cg_maxiter` iterations.
fn conjugate_gradient_step(
    grad: &Array1<f64>,
    hess: &Array2<f64>,
    cg_maxiter: usize,
) -> Option<Array1<f64>> {
    let b = -grad;
    let mag_grad: f64 = b.iter().map(|v| v.abs()).sum();
    let eta = 0.5f64.min(mag_grad.sqrt());
    let term_cond = eta * mag_grad;

    let mut xsupi = Array1::zeros(grad.len());
    let mut ri = grad.clone();
    let mut psupi = -&ri;
    let mut dri0 = ri.dot(&ri);

    for i in 0..cg_maxiter {
        if ri.iter().map(|v| v.abs()).sum::<f64>() <= term_cond {
            return Some(xsupi);
        }
        let ap = hess.dot(&psupi);
        let curv = psupi.dot(&ap);
        if (0.0..=3.0 * f64::EPSILON).contains(&curv) {
            return Some(xsupi);
        } else if curv < 0.0 {
            if i > 0 {
                return Some(xsupi);
            }
            return Some(b * (dri0 / -curv));
        }
        let alpha = dri0 / curv;
        xsupi.scaled_add(alpha, &psupi);
        ri.scaled_add(alpha, &ap);
        let dri1 = ri.dot(&ri);
        let beta = dri1 / dri0;
        psupi = &psupi * beta - &ri;
        dri0 = dri1;
    }

    None
}

/// Find a step length along `step` satisfying the Armijo sufficient-decrease
/// condition by repeatedly halving a unit step. Returns the step length and
/// the cost there, or `None` if no decrease could be found.
fn backtracking_line_search<O: Objective + ?Sized>(
    objective: &O,
    x: ArrayView1<f64>,
    cost: f64,
    grad: &Array1<f64>,
    step: &Array1<f64>,
) -> Option<(f64, f64)> {
    if step.iter().all(|&s| s == 0.0) {
        return Some((0.0, cost));
    }
    let slope = grad.dot(step);
    let mut alpha = 1.0;
    let mut x_new = x.to_owned();
    for _ in 0..MAX_LINE_SEARCH_HALVINGS {
        x_new.assign(&x);
        x_new.scaled_add(alpha, step);
        let new_cost = objective.cost(x_new.view());
        if new_cost.is_finite() && new_cost <= cost + ARMIJO_C1 * alpha * slope.min(0.0) {
            return Some((alpha, new_cost));
        }
        alpha *= 0.5;
    }
    None
}
