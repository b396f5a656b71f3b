// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all calibration-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalibrateError {
    #[error("Couldn't build a thread pool for calibration: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Params(#[from] crate::params::ParamsError),

    #[error(transparent)]
    Context(#[from] crate::context::ContextError),

    #[error(transparent)]
    DelayWeight(#[from] crate::delay_weights::DelayWeightError),

    #[error("Delay-weighted abscal needs delay weights, but none were set and no delay-spectrum variance was supplied")]
    MissingDelayWeights,

    #[error("Delay weights have shape {got:?}, but {expected:?} was expected")]
    DelayWeightShape {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}
