// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all dwcal-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DwcalError {
    #[error("{0}")]
    Context(#[from] crate::context::ContextError),

    #[error("{0}")]
    Params(#[from] crate::params::ParamsError),

    #[error("{0}")]
    DelayWeight(#[from] crate::delay_weights::DelayWeightError),

    #[error("{0}")]
    Calibrate(#[from] crate::calibrate::CalibrateError),

    #[error("{0}")]
    ApplyAbscal(#[from] crate::apply::AbscalApplyError),
}
