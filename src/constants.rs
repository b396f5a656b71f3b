// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision.
 */

pub use std::f64::consts::PI;

/// The default weight of the phase regularisation term in the per-polarisation
/// gain cost function.
pub const DEFAULT_LAMBDA_VAL: f64 = 100.0;

/// The default solution-step tolerance of the optimiser for gain calibration
/// and single-frequency abscal.
pub const DEFAULT_XTOL: f64 = 1e-6;

/// The default solution-step tolerance of the optimiser for delay-weighted
/// abscal.
pub const DEFAULT_DW_XTOL: f64 = 1e-10;

/// The default maximum number of Newton iterations.
pub const DEFAULT_MAXITER: usize = 100;

/// The default cap on the number of worker threads used when calibrating
/// frequency channels in parallel.
pub const DEFAULT_MAX_PROCESSES: usize = 40;

/// The default factor by which the delay axis is oversampled when building
/// delay weights. Larger values reduce Fourier aliasing.
pub const DEFAULT_OVERSAMPLE_FACTOR: usize = 128;

/// The number of abscal parameters per frequency and feed polarisation: the
/// overall amplitude, the x-phase gradient and the y-phase gradient.
pub const NUM_ABSCAL_PARAMS: usize = 3;
