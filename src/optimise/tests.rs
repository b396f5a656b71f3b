// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;

/// 0.5 x^T A x - b^T x, minimised at A^{-1} b.
struct Quadratic {
    a: Array2<f64>,
    b: Array1<f64>,
}

impl Objective for Quadratic {
    fn cost(&self, x: ArrayView1<f64>) -> f64 {
        0.5 * x.dot(&self.a.dot(&x)) - self.b.dot(&x)
    }

    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        self.a.dot(&x) - &self.b
    }

    fn hessian(&self, _: ArrayView1<f64>) -> Array2<f64> {
        self.a.clone()
    }
}

struct Rosenbrock;

impl Objective for Rosenbrock {
    fn cost(&self, x: ArrayView1<f64>) -> f64 {
        (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2)
    }

    fn gradient(&self, x: ArrayView1<f64>) -> Array1<f64> {
        array![
            -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0].powi(2)),
            200.0 * (x[1] - x[0].powi(2)),
        ]
    }

    fn hessian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        array![
            [2.0 - 400.0 * x[1] + 1200.0 * x[0].powi(2), -400.0 * x[0]],
            [-400.0 * x[0], 200.0],
        ]
    }
}

#[test]
fn test_quadratic_solves_linear_system() {
    let objective = Quadratic {
        a: array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]],
        b: array![1.0, 2.0, 3.0],
    };
    let result = minimise_newton_cg(&objective, Array1::zeros(3).view(), 1e-10, 50);
    assert!(result.converged(), "{}", result.message());
    let residual = objective.a.dot(&result.x) - &objective.b;
    assert_abs_diff_eq!(residual, Array1::zeros(3), epsilon = 1e-8);
}

#[test]
fn test_rosenbrock() {
    let result = minimise_newton_cg(&Rosenbrock, array![-1.2, 1.0].view(), 1e-10, 200);
    assert!(result.converged(), "{}", result.message());
    assert_abs_diff_eq!(result.x, array![1.0, 1.0], epsilon = 1e-6);
    assert!(result.cost < 1e-12);
}

#[test]
fn test_already_at_minimum() {
    let objective = Quadratic {
        a: Array2::eye(2),
        b: array![0.0, 0.0],
    };
    let result = minimise_newton_cg(&objective, array![0.0, 0.0].view(), 1e-8, 10);
    assert!(result.converged());
    assert_eq!(result.num_iterations, 1);
    assert_eq!(result.x, array![0.0, 0.0]);
}

#[test]
fn test_max_iterations_is_not_fatal() {
    let result = minimise_newton_cg(&Rosenbrock, array![-1.2, 1.0].view(), 1e-12, 2);
    assert_eq!(result.termination, Termination::MaxIterations);
    assert_eq!(result.num_iterations, 2);
    assert_eq!(
        result.message(),
        "Maximum number of iterations has been exceeded."
    );
    // Some progress should still have been made.
    assert!(result.cost < Rosenbrock.cost(array![-1.2, 1.0].view()));
}

#[test]
fn test_non_finite_start() {
    let result = minimise_newton_cg(&Rosenbrock, array![f64::NAN, 1.0].view(), 1e-8, 10);
    assert_eq!(result.termination, Termination::NonFiniteCost);
    assert_eq!(result.num_iterations, 0);
}
